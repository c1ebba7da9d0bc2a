use std::sync::Arc;
use std::time::Duration;

use crate::domain::collaborators::provisioner::ProvisionerRegistry;
use crate::domain::collaborators::stores::{CompositeComponentRegistry, DescriptionStore, RequestTracker, ResourceNamer};
use crate::domain::composition::component::DependencyResolver;
use crate::domain::orchestration::directory::TaskDirectory;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeTaskSettings {
    /// How long a node task may wait for its dependencies before it fails. `None` waits forever.
    pub dependency_timeout: Option<Duration>,
}

/// Collaborators shared by every task of one orchestrator instance.
#[derive(Clone)]
pub struct OrchestrationContext {
    pub descriptions: Arc<dyn DescriptionStore>,
    pub resolver: Arc<dyn DependencyResolver>,
    pub composites: Arc<dyn CompositeComponentRegistry>,
    pub provisioners: ProvisionerRegistry,
    pub namer: Arc<dyn ResourceNamer>,
    pub tracker: Option<Arc<dyn RequestTracker>>,
    pub directory: TaskDirectory,
    pub settings: NodeTaskSettings,
}

impl OrchestrationContext {
    pub fn new(
        descriptions: Arc<dyn DescriptionStore>,
        resolver: Arc<dyn DependencyResolver>,
        composites: Arc<dyn CompositeComponentRegistry>,
        provisioners: ProvisionerRegistry,
        namer: Arc<dyn ResourceNamer>,
    ) -> Self {
        Self { descriptions, resolver, composites, provisioners, namer, tracker: None, directory: TaskDirectory::new(), settings: NodeTaskSettings::default() }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn RequestTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_settings(mut self, settings: NodeTaskSettings) -> Self {
        self.settings = settings;
        self
    }
}
