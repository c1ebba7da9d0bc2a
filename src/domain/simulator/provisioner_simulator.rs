use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::collaborators::provisioner::{ExternalScheduler, ProvisionRequest, ProvisionerError, RemovalRequest, ResourceProvisioner};
use crate::domain::collaborators::stores::ComponentMeta;
use crate::domain::simulator::in_memory::InMemoryCompositeRegistry;
use crate::domain::utils::id::ResourceLink;

/// Knobs of the simulated infrastructure.
#[derive(Debug, Clone, Default)]
pub struct SimulatorSettings {
    /// Latency of every simulated call.
    pub delay: Duration,
    /// Component names whose allocation fails.
    pub fail_allocation: HashSet<String>,
    /// Component names whose provisioning fails.
    pub fail_provisioning: HashSet<String>,
    /// Resource types whose removal fails.
    pub fail_removal: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionerCall {
    Allocate { component: String },
    Provision { component: String, links: Vec<ResourceLink> },
    Remove { batch: String, resource_type: String, links: Vec<ResourceLink> },
}

/// Provisioner standing in for the real adapters. Records every call in arrival order.
#[derive(Debug)]
pub struct SimulatedProvisioner {
    settings: SimulatorSettings,
    composites: Option<Arc<InMemoryCompositeRegistry>>,
    calls: Mutex<Vec<ProvisionerCall>>,
    sequence: AtomicUsize,
}

impl SimulatedProvisioner {
    pub fn new(settings: SimulatorSettings) -> Self {
        Self { settings, composites: None, calls: Mutex::new(Vec::new()), sequence: AtomicUsize::new(0) }
    }

    /// Allocated resources get attached to (and removed ones detached from) the composite of their context.
    pub fn with_registry(mut self, composites: Arc<InMemoryCompositeRegistry>) -> Self {
        self.composites = Some(composites);
        self
    }

    pub fn calls(&self) -> Vec<ProvisionerCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, call: ProvisionerCall) {
        log::debug!("Simulated provisioner call: {:?}", call);
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    async fn wait(&self) {
        if !self.settings.delay.is_zero() {
            tokio::time::sleep(self.settings.delay).await;
        }
    }
}

#[async_trait]
impl ResourceProvisioner for SimulatedProvisioner {
    async fn allocate(&self, request: ProvisionRequest) -> Result<Vec<ResourceLink>, ProvisionerError> {
        self.wait().await;
        self.record(ProvisionerCall::Allocate { component: request.component_name.clone() });

        if self.settings.fail_allocation.contains(&request.component_name) {
            return Err(ProvisionerError::Failed(format!("simulated allocation failure of {}", request.component_name)));
        }

        let links: Vec<ResourceLink> = (0..request.resource_count.max(1))
            .map(|_| {
                let n = self.sequence.fetch_add(1, Ordering::SeqCst);
                ResourceLink::new(format!("/resources/{}/{}-{}", request.resource_type, request.component_name, n))
            })
            .collect();

        if let Some(composites) = &self.composites {
            for link in &links {
                let meta = ComponentMeta { resource_type: request.resource_type.to_string(), external_scheduler: None };
                composites.attach(&request.context_id, link.clone(), meta);
            }
        }
        Ok(links)
    }

    async fn provision(&self, request: ProvisionRequest) -> Result<Vec<ResourceLink>, ProvisionerError> {
        self.wait().await;
        self.record(ProvisionerCall::Provision { component: request.component_name.clone(), links: request.resource_links.clone() });

        if self.settings.fail_provisioning.contains(&request.component_name) {
            return Err(ProvisionerError::Failed(format!("simulated provisioning failure of {}", request.component_name)));
        }
        Ok(request.resource_links)
    }

    async fn remove(&self, request: RemovalRequest) -> Result<(), ProvisionerError> {
        self.wait().await;
        self.record(ProvisionerCall::Remove { batch: request.batch_name.clone(), resource_type: request.resource_type.clone(), links: request.resource_links.clone() });

        if self.settings.fail_removal.contains(&request.resource_type) {
            return Err(ProvisionerError::Failed(format!("simulated removal failure of {}", request.batch_name)));
        }
        if let Some(composites) = &self.composites {
            composites.detach(&request.resource_links);
        }
        Ok(())
    }
}

/// Foreign orchestrator that accepts every removal and remembers it.
#[derive(Debug, Default)]
pub struct SimulatedExternalScheduler {
    composites: Option<Arc<InMemoryCompositeRegistry>>,
    removed: Mutex<Vec<ResourceLink>>,
}

impl SimulatedExternalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(mut self, composites: Arc<InMemoryCompositeRegistry>) -> Self {
        self.composites = Some(composites);
        self
    }

    pub fn removed(&self) -> Vec<ResourceLink> {
        match self.removed.lock() {
            Ok(removed) => removed.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ExternalScheduler for SimulatedExternalScheduler {
    async fn remove_unit(&self, request: RemovalRequest) -> Result<(), ProvisionerError> {
        log::debug!("Simulated external scheduler removes {:?}.", request.resource_links);
        match self.removed.lock() {
            Ok(mut removed) => removed.extend(request.resource_links.iter().cloned()),
            Err(poisoned) => poisoned.into_inner().extend(request.resource_links.iter().cloned()),
        }
        if let Some(composites) = &self.composites {
            composites.detach(&request.resource_links);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::resource_type::ResourceType;
    use crate::domain::utils::id::{CompositeLink, ContextId, DescriptionLink};

    fn request(name: &str, count: usize) -> ProvisionRequest {
        ProvisionRequest {
            component_name: name.to_string(),
            resource_type: ResourceType::Container,
            description_link: DescriptionLink::new("/d"),
            tenant_links: vec![],
            context_id: ContextId::new("ctx"),
            resource_links: vec![],
            resource_count: count,
            custom_properties: BTreeMap::new(),
        }
    }

    #[actix_rt::test]
    async fn test_allocation_attaches_links_to_the_context_composite() {
        let registry = Arc::new(InMemoryCompositeRegistry::new());
        let provisioner = SimulatedProvisioner::new(SimulatorSettings::default()).with_registry(registry.clone());

        let links = provisioner.allocate(request("web", 2)).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_ne!(links[0], links[1]);

        let composite = registry.composite(&CompositeLink::new("/resources/composite-components/ctx")).unwrap();
        assert_eq!(composite.members.len(), 2);
        assert_eq!(provisioner.calls(), vec![ProvisionerCall::Allocate { component: "web".into() }]);
    }

    #[actix_rt::test]
    async fn test_configured_failures() {
        let mut settings = SimulatorSettings::default();
        settings.fail_allocation.insert("db".to_string());
        let provisioner = SimulatedProvisioner::new(settings);

        assert!(matches!(provisioner.allocate(request("db", 1)).await, Err(ProvisionerError::Failed(_))));
        assert!(provisioner.allocate(request("web", 1)).await.is_ok());
    }
}
