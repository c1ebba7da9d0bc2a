#![allow(dead_code)]

use composition_orchestrator::domain::composition::component::{ComponentDescription, CompositeDescription};
use composition_orchestrator::domain::orchestration::context::{NodeTaskSettings, OrchestrationContext};
use composition_orchestrator::domain::orchestration::coordinator::CompositionRequest;
use composition_orchestrator::domain::orchestration::service::CompositionService;
use composition_orchestrator::domain::resource_type::ResourceType;
use composition_orchestrator::domain::simulator::SimulatedInfrastructure;
use composition_orchestrator::domain::simulator::provisioner_simulator::{ProvisionerCall, SimulatorSettings};
use composition_orchestrator::domain::utils::id::DescriptionLink;

pub struct Harness {
    pub infrastructure: SimulatedInfrastructure,
    pub service: CompositionService,
    pub description: CompositeDescription,
}

impl Harness {
    pub fn new(settings: SimulatorSettings, description: CompositeDescription) -> Self {
        Self::with_context(settings, description, |context| context)
    }

    pub fn with_node_settings(settings: SimulatorSettings, description: CompositeDescription, node_settings: NodeTaskSettings) -> Self {
        Self::with_context(settings, description, move |context| context.with_settings(node_settings))
    }

    pub fn with_context<F>(settings: SimulatorSettings, description: CompositeDescription, configure: F) -> Self
    where
        F: FnOnce(OrchestrationContext) -> OrchestrationContext,
    {
        let infrastructure = SimulatedInfrastructure::new(settings);
        infrastructure.descriptions.insert(description.clone());
        let service = CompositionService::new(configure(infrastructure.context()));
        Self { infrastructure, service, description }
    }

    pub fn request(&self) -> CompositionRequest {
        let mut request = CompositionRequest::new(self.description.link.clone());
        request.tenant_links = vec!["/tenants/test".to_string()];
        request
    }

    pub fn calls(&self) -> Vec<ProvisionerCall> {
        self.infrastructure.provisioner.calls()
    }

    pub fn allocated(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProvisionerCall::Allocate { component } => Some(component),
                _ => None,
            })
            .collect()
    }

    pub fn provisioned(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProvisionerCall::Provision { component, .. } => Some(component),
                _ => None,
            })
            .collect()
    }

    /// Resource types of the removal calls, in call order.
    pub fn removed_types(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProvisionerCall::Remove { resource_type, .. } => Some(resource_type),
                _ => None,
            })
            .collect()
    }

    pub fn removed_link_count(&self) -> usize {
        self.calls()
            .into_iter()
            .map(|call| match call {
                ProvisionerCall::Remove { links, .. } => links.len(),
                _ => 0,
            })
            .sum()
    }
}

pub fn component(name: &str, resource_type: ResourceType) -> ComponentDescription {
    ComponentDescription::new(name, resource_type)
}

pub fn composite(name: &str, components: Vec<ComponentDescription>) -> CompositeDescription {
    CompositeDescription {
        link: DescriptionLink::new(format!("/resources/composite-descriptions/{}", name)),
        name: name.to_string(),
        tenant_links: vec!["/tenants/test".to_string()],
        components,
        ..Default::default()
    }
}

/// network <- db <- web, with the db volume on the side.
pub fn web_stack() -> CompositeDescription {
    let mut db = component("db", ResourceType::Container);
    db.networks = vec!["backend".to_string()];
    db.volumes = vec!["db-data:/var/lib/db".to_string()];
    let mut web = component("web", ResourceType::Container);
    web.links = vec!["db:database".to_string()];
    web.networks = vec!["backend".to_string()];

    composite(
        "web-stack",
        vec![web, db, component("backend", ResourceType::Network), component("db-data", ResourceType::Volume)],
    )
}

pub fn position(items: &[String], name: &str) -> usize {
    items.iter().position(|item| item == name).unwrap_or_else(|| panic!("{} not found in {:?}", name, items))
}
