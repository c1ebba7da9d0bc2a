use async_trait::async_trait;

use crate::domain::collaborators::provisioner::ProvisionerError;
use crate::domain::composition::component::CompositeDescription;
use crate::domain::utils::id::{CompositeLink, ContextId, DescriptionLink, ResourceLink, SchedulerAddress, TrackerLink};
use crate::error::Result;

/// Source of composite descriptions.
#[async_trait]
pub trait DescriptionStore: Send + Sync {
    /// With `expanded` set, the components are included and their bindings already evaluated.
    async fn composite_description(&self, link: &DescriptionLink, expanded: bool) -> Result<CompositeDescription>;
}

/// What the removal protocol needs to know about a member of a composite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMeta {
    pub resource_type: String,
    /// Set when the resource was scheduled by a foreign orchestrator.
    pub external_scheduler: Option<SchedulerAddress>,
}

/// Store of composite component records and their members.
#[async_trait]
pub trait CompositeComponentRegistry: Send + Sync {
    async fn create_composite(&self, name: &str, description_link: &DescriptionLink, tenant_links: &[String], context_id: &ContextId) -> Result<CompositeLink>;

    async fn component_links(&self, composite: &CompositeLink) -> Result<Vec<ResourceLink>>;

    async fn component_meta(&self, link: &ResourceLink) -> Result<ComponentMeta>;

    async fn remove_composite(&self, composite: &CompositeLink) -> std::result::Result<(), ProvisionerError>;
}

/// Generates unique names for the resources of one request.
pub trait ResourceNamer: Send + Sync {
    fn composite_name(&self, base: &str) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComponentProgress {
    pub name: String,
    pub resource_type: String,
    pub level: u32,
}

/// Snapshot handed to the request tracker once the dependency graph is known.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestProgress {
    pub request_id: String,
    pub tracker_link: TrackerLink,
    pub components: Vec<ComponentProgress>,
}

/// Optional observer of request progress. Failures never affect the composition.
#[async_trait]
pub trait RequestTracker: Send + Sync {
    async fn update_components(&self, progress: RequestProgress) -> Result<()>;
}
