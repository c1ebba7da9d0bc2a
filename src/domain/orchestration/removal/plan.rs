use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use crate::domain::collaborators::stores::ComponentMeta;
use crate::domain::resource_type::ResourceType;
use crate::domain::utils::id::{ResourceLink, SchedulerAddress};
use crate::error::{Error, Result};

/// Resources of one type (or of one external scheduler) removed by a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalBatch {
    pub name: String,
    pub resource_type: String,
    pub member_links: BTreeSet<ResourceLink>,
    /// Batch that has to complete before this one starts.
    pub prev_batch: Option<String>,
    pub next_batch: Option<String>,
    pub external_scheduler: Option<SchedulerAddress>,
}

impl RemovalBatch {
    fn new(name: String, resource_type: String) -> Self {
        Self { name, resource_type, member_links: BTreeSet::new(), prev_batch: None, next_batch: None, external_scheduler: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalPlan {
    /// Batches chained in removal priority order.
    pub chain: Vec<RemovalBatch>,
    /// Externally scheduled units, removed in parallel with the chain.
    pub external: Vec<RemovalBatch>,
}

impl RemovalPlan {
    pub fn batches(&self) -> impl Iterator<Item = &RemovalBatch> {
        self.chain.iter().chain(self.external.iter())
    }

    pub fn batch_count(&self) -> usize {
        self.chain.len() + self.external.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch_count() == 0
    }
}

/// Named after the scheduler address itself, so two schedulers never share a batch name.
fn external_batch_name(scheduler: &SchedulerAddress) -> String {
    format!("remove-external-{}", scheduler)
}

/// Groups the members of a composite into removal batches.
///
/// Members owned by an external scheduler form one batch per scheduler. All other members are
/// grouped by resource type, and the type batches are chained following `REMOVAL_ORDER`.
/// A member whose type has no place in that order fails the whole plan.
pub fn build_removal_plan(components: &[(ResourceLink, ComponentMeta)]) -> Result<RemovalPlan> {
    let mut by_type: BTreeMap<ResourceType, BTreeSet<ResourceLink>> = BTreeMap::new();
    let mut by_scheduler: BTreeMap<SchedulerAddress, RemovalBatch> = BTreeMap::new();
    let mut unknown: BTreeSet<String> = BTreeSet::new();

    for (link, meta) in components {
        if let Some(scheduler) = &meta.external_scheduler {
            by_scheduler
                .entry(scheduler.clone())
                .or_insert_with(|| {
                    let mut batch = RemovalBatch::new(external_batch_name(scheduler), meta.resource_type.clone());
                    batch.external_scheduler = Some(scheduler.clone());
                    batch
                })
                .member_links
                .insert(link.clone());
            continue;
        }

        match ResourceType::from_str(&meta.resource_type) {
            Ok(resource_type) => {
                by_type.entry(resource_type).or_default().insert(link.clone());
            }
            Err(_) => {
                unknown.insert(meta.resource_type.clone());
            }
        }
    }

    if !unknown.is_empty() {
        return Err(Error::UnknownRemovalOrder(unknown.into_iter().collect()));
    }

    let mut typed: Vec<(ResourceType, BTreeSet<ResourceLink>)> = by_type.into_iter().collect();
    typed.sort_by_key(|(resource_type, _)| resource_type.removal_priority());
    let mut chain: Vec<RemovalBatch> = typed
        .into_iter()
        .map(|(resource_type, members)| {
            let mut batch = RemovalBatch::new(format!("remove-{}", resource_type), resource_type.name().to_string());
            batch.member_links = members;
            batch
        })
        .collect();

    let names: Vec<String> = chain.iter().map(|batch| batch.name.clone()).collect();
    for (i, batch) in chain.iter_mut().enumerate() {
        batch.prev_batch = i.checked_sub(1).map(|prev| names[prev].clone());
        batch.next_batch = names.get(i + 1).cloned();
    }

    Ok(RemovalPlan { chain, external: by_scheduler.into_values().collect() })
}
