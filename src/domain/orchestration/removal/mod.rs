use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::domain::orchestration::callback::TaskCallback;
use crate::domain::orchestration::context::OrchestrationContext;
use crate::domain::orchestration::removal::plan::RemovalBatch;
use crate::domain::orchestration::stage::{StageTransition, SubStage, TaskStage};
use crate::domain::utils::id::{CompositeLink, ContextId, ResourceLink, TaskAddress};

mod actor;
mod handler;
pub mod messages;
pub mod plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RemovalStage {
    Created,
    InstancesRemoving,
    CompositeRemoving,
    Completed,
    Error,
}

impl SubStage for RemovalStage {
    fn ordinal(&self) -> usize {
        *self as usize
    }
}

#[derive(Debug, Clone)]
pub struct RemovalTaskState {
    pub address: TaskAddress,
    pub composite_links: Vec<CompositeLink>,
    pub tenant_links: Vec<String>,
    pub context_id: ContextId,

    pub batches: BTreeMap<TaskAddress, RemovalBatch>,
    pub remaining_count: i64,
    pub counted: HashSet<TaskAddress>,
    pub removed_links: Vec<ResourceLink>,
    pub failures: Vec<String>,

    pub stage: TaskStage,
    pub sub_stage: RemovalStage,
    pub failure: Option<String>,
}

impl RemovalTaskState {
    pub fn transition(&self) -> StageTransition<RemovalStage> {
        StageTransition { stage: self.stage, sub_stage: self.sub_stage }
    }
}

/// Terminal result of a grouped removal.
#[derive(Debug, Clone, PartialEq)]
pub enum RemovalOutcome {
    Completed { removed_links: Vec<ResourceLink> },
    Failed { failure: String, removed_links: Vec<ResourceLink> },
}

impl RemovalOutcome {
    pub fn from_state(state: &RemovalTaskState) -> Self {
        match state.stage {
            TaskStage::Finished => RemovalOutcome::Completed { removed_links: state.removed_links.clone() },
            _ => RemovalOutcome::Failed {
                failure: state.failure.clone().unwrap_or_else(|| "Composite removal failed.".to_string()),
                removed_links: state.removed_links.clone(),
            },
        }
    }
}

/// Removes the members of one or more composites batch by batch, then the composite records.
pub struct CompositeRemovalTask {
    pub state: RemovalTaskState,
    callback: Arc<dyn TaskCallback>,
    context: OrchestrationContext,
    reported: bool,
}

impl CompositeRemovalTask {
    pub fn new(
        address: TaskAddress,
        composite_links: Vec<CompositeLink>,
        tenant_links: Vec<String>,
        context_id: ContextId,
        callback: Arc<dyn TaskCallback>,
        context: OrchestrationContext,
    ) -> Self {
        let state = RemovalTaskState {
            address,
            composite_links,
            tenant_links,
            context_id,
            batches: BTreeMap::new(),
            remaining_count: 0,
            counted: HashSet::new(),
            removed_links: Vec::new(),
            failures: Vec::new(),
            stage: TaskStage::Created,
            sub_stage: RemovalStage::Created,
            failure: None,
        };
        Self { state, callback, context, reported: false }
    }
}
