use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::resource_type::ResourceType;
use crate::domain::utils::id::{ContextId, DescriptionLink, ResourceLink, SchedulerAddress};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionerError {
    #[error("{0}")]
    Failed(String),

    /// The operation was cancelled by the remote side. Removal treats it as not-an-error.
    #[error("operation cancelled")]
    Cancelled,
}

/// What a provisioner gets asked to allocate or provision.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub component_name: String,
    pub resource_type: ResourceType,
    pub description_link: DescriptionLink,
    pub tenant_links: Vec<String>,
    pub context_id: ContextId,
    /// Links returned by the allocation step. Empty while allocating.
    pub resource_links: Vec<ResourceLink>,
    pub resource_count: usize,
    pub custom_properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct RemovalRequest {
    pub batch_name: String,
    pub resource_type: String,
    pub resource_links: Vec<ResourceLink>,
    pub tenant_links: Vec<String>,
    pub context_id: ContextId,
}

/// Per-resource-type adapter doing the actual work against the infrastructure.
#[async_trait]
pub trait ResourceProvisioner: Send + Sync {
    /// Reserves placement for the requested resources and returns their links.
    async fn allocate(&self, request: ProvisionRequest) -> std::result::Result<Vec<ResourceLink>, ProvisionerError>;

    /// Creates the previously allocated resources.
    async fn provision(&self, request: ProvisionRequest) -> std::result::Result<Vec<ResourceLink>, ProvisionerError>;

    async fn remove(&self, request: RemovalRequest) -> std::result::Result<(), ProvisionerError>;
}

/// A foreign orchestrator owning resources it scheduled itself.
#[async_trait]
pub trait ExternalScheduler: Send + Sync {
    async fn remove_unit(&self, request: RemovalRequest) -> std::result::Result<(), ProvisionerError>;
}

/// Lookup table from resource type to provisioner and from scheduler address to scheduler.
#[derive(Clone, Default)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<ResourceType, Arc<dyn ResourceProvisioner>>,
    schedulers: HashMap<SchedulerAddress, Arc<dyn ExternalScheduler>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_type: ResourceType, provisioner: Arc<dyn ResourceProvisioner>) -> &mut Self {
        self.provisioners.insert(resource_type, provisioner);
        self
    }

    /// Registers the same provisioner for every type in `types`.
    pub fn register_all(&mut self, types: &[ResourceType], provisioner: Arc<dyn ResourceProvisioner>) -> &mut Self {
        for resource_type in types {
            self.provisioners.insert(*resource_type, provisioner.clone());
        }
        self
    }

    pub fn register_scheduler(&mut self, address: SchedulerAddress, scheduler: Arc<dyn ExternalScheduler>) -> &mut Self {
        self.schedulers.insert(address, scheduler);
        self
    }

    pub fn provisioner_for(&self, resource_type: &ResourceType) -> Result<Arc<dyn ResourceProvisioner>> {
        self.provisioners.get(resource_type).cloned().ok_or_else(|| Error::UnsupportedResourceType(resource_type.to_string()))
    }

    pub fn scheduler_for(&self, address: &SchedulerAddress) -> Result<Arc<dyn ExternalScheduler>> {
        self.schedulers.get(address).cloned().ok_or_else(|| Error::Collaborator(format!("No external scheduler registered at [{}].", address)))
    }
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerRegistry")
            .field("provisioners", &self.provisioners.keys().collect::<Vec<_>>())
            .field("schedulers", &self.schedulers.keys().collect::<Vec<_>>())
            .finish()
    }
}
