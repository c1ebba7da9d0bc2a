use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rand::Rng;

use crate::domain::collaborators::provisioner::ProvisionerError;
use crate::domain::collaborators::stores::{ComponentMeta, CompositeComponentRegistry, DescriptionStore, ResourceNamer};
use crate::domain::composition::component::CompositeDescription;
use crate::domain::utils::id::{CompositeLink, ContextId, DescriptionLink, ResourceLink};
use crate::error::{Error, Result};

pub const COMPOSITE_COMPONENTS_PATH: &str = "/resources/composite-components";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Description store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryDescriptionStore {
    descriptions: Mutex<HashMap<DescriptionLink, CompositeDescription>>,
}

impl InMemoryDescriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, description: CompositeDescription) {
        lock(&self.descriptions).insert(description.link.clone(), description);
    }
}

#[async_trait]
impl DescriptionStore for InMemoryDescriptionStore {
    async fn composite_description(&self, link: &DescriptionLink, expanded: bool) -> Result<CompositeDescription> {
        let mut description = lock(&self.descriptions).get(link).cloned().ok_or_else(|| Error::Collaborator(format!("Composite description {} not found.", link)))?;
        if !expanded {
            description.components.clear();
        }
        Ok(description)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRecord {
    pub name: String,
    pub description_link: DescriptionLink,
    pub tenant_links: Vec<String>,
    pub members: BTreeSet<ResourceLink>,
}

/// Composite records and member metadata kept in memory. Provisioners attach members by context id.
#[derive(Debug, Default)]
pub struct InMemoryCompositeRegistry {
    composites: Mutex<BTreeMap<CompositeLink, CompositeRecord>>,
    meta: Mutex<HashMap<ResourceLink, ComponentMeta>>,
    removal_errors: Mutex<HashMap<CompositeLink, ProvisionerError>>,
}

impl InMemoryCompositeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn composite_link_for(context_id: &ContextId) -> CompositeLink {
        CompositeLink::new(format!("{}/{}", COMPOSITE_COMPONENTS_PATH, context_id))
    }

    /// Adds `link` to the composite of `context_id`, creating an unnamed record if needed.
    pub fn attach(&self, context_id: &ContextId, link: ResourceLink, meta: ComponentMeta) {
        let composite = Self::composite_link_for(context_id);
        lock(&self.composites)
            .entry(composite)
            .or_insert_with(|| CompositeRecord { name: String::new(), description_link: DescriptionLink::default(), tenant_links: Vec::new(), members: BTreeSet::new() })
            .members
            .insert(link.clone());
        lock(&self.meta).insert(link, meta);
    }

    pub fn detach(&self, links: &[ResourceLink]) {
        let mut composites = lock(&self.composites);
        for record in composites.values_mut() {
            for link in links {
                record.members.remove(link);
            }
        }
        let mut meta = lock(&self.meta);
        for link in links {
            meta.remove(link);
        }
    }

    pub fn composite(&self, link: &CompositeLink) -> Option<CompositeRecord> {
        lock(&self.composites).get(link).cloned()
    }

    /// Makes the next deletion of `link` fail with `error`.
    pub fn fail_removal_of(&self, link: CompositeLink, error: ProvisionerError) {
        lock(&self.removal_errors).insert(link, error);
    }
}

#[async_trait]
impl CompositeComponentRegistry for InMemoryCompositeRegistry {
    async fn create_composite(&self, name: &str, description_link: &DescriptionLink, tenant_links: &[String], context_id: &ContextId) -> Result<CompositeLink> {
        let link = Self::composite_link_for(context_id);
        let mut composites = lock(&self.composites);
        let record = composites.entry(link.clone()).or_insert_with(|| CompositeRecord {
            name: String::new(),
            description_link: description_link.clone(),
            tenant_links: Vec::new(),
            members: BTreeSet::new(),
        });
        record.name = name.to_string();
        record.description_link = description_link.clone();
        record.tenant_links = tenant_links.to_vec();
        Ok(link)
    }

    async fn component_links(&self, composite: &CompositeLink) -> Result<Vec<ResourceLink>> {
        lock(&self.composites)
            .get(composite)
            .map(|record| record.members.iter().cloned().collect())
            .ok_or_else(|| Error::Collaborator(format!("Composite component {} not found.", composite)))
    }

    async fn component_meta(&self, link: &ResourceLink) -> Result<ComponentMeta> {
        lock(&self.meta).get(link).cloned().ok_or_else(|| Error::Collaborator(format!("Resource {} not found.", link)))
    }

    async fn remove_composite(&self, composite: &CompositeLink) -> std::result::Result<(), ProvisionerError> {
        if let Some(error) = lock(&self.removal_errors).remove(composite) {
            return Err(error);
        }
        lock(&self.composites).remove(composite);
        Ok(())
    }
}

/// Appends `-mcm` and a random number to the base name.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSuffixNamer;

impl ResourceNamer for RandomSuffixNamer {
    fn composite_name(&self, base: &str) -> String {
        let suffix: u32 = rand::rng().random_range(100..1_000_000);
        format!("{}-mcm{}", base, suffix)
    }
}
