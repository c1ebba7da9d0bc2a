use std::sync::Arc;

use crate::domain::collaborators::provisioner::ProvisionerRegistry;
use crate::domain::composition::component::DeclaredDependencyResolver;
use crate::domain::orchestration::context::OrchestrationContext;
use crate::domain::resource_type::{REMOVAL_ORDER, ResourceType};
use crate::domain::simulator::in_memory::{InMemoryCompositeRegistry, InMemoryDescriptionStore, RandomSuffixNamer};
use crate::domain::simulator::provisioner_simulator::{SimulatedExternalScheduler, SimulatedProvisioner, SimulatorSettings};
use crate::domain::utils::id::SchedulerAddress;

pub mod in_memory;
pub mod provisioner_simulator;

pub const SIMULATED_SCHEDULER_ADDRESS: &str = "/external/simulated-scheduler";

/// In-memory stand-ins for every collaborator, wired together.
#[derive(Debug, Clone)]
pub struct SimulatedInfrastructure {
    pub descriptions: Arc<InMemoryDescriptionStore>,
    pub composites: Arc<InMemoryCompositeRegistry>,
    pub provisioner: Arc<SimulatedProvisioner>,
    pub scheduler: Arc<SimulatedExternalScheduler>,
}

impl SimulatedInfrastructure {
    pub fn new(settings: SimulatorSettings) -> Self {
        let composites = Arc::new(InMemoryCompositeRegistry::new());
        Self {
            descriptions: Arc::new(InMemoryDescriptionStore::new()),
            provisioner: Arc::new(SimulatedProvisioner::new(settings).with_registry(composites.clone())),
            scheduler: Arc::new(SimulatedExternalScheduler::new().with_registry(composites.clone())),
            composites,
        }
    }

    pub fn scheduler_address() -> SchedulerAddress {
        SchedulerAddress::new(SIMULATED_SCHEDULER_ADDRESS)
    }

    /// Context using the simulated provisioner for every provisionable type.
    pub fn context(&self) -> OrchestrationContext {
        let types: Vec<ResourceType> = REMOVAL_ORDER.iter().copied().filter(ResourceType::is_provisionable).collect();
        let mut provisioners = ProvisionerRegistry::new();
        provisioners.register_all(&types, self.provisioner.clone()).register_scheduler(Self::scheduler_address(), self.scheduler.clone());

        OrchestrationContext::new(self.descriptions.clone(), Arc::new(DeclaredDependencyResolver), self.composites.clone(), provisioners, Arc::new(RandomSuffixNamer))
    }
}
