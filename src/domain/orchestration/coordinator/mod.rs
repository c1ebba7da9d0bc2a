use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::domain::composition::graph::ResourceNode;
use crate::error::{Error, Result};
use crate::domain::orchestration::callback::TaskCallback;
use crate::domain::orchestration::context::OrchestrationContext;
use crate::domain::orchestration::stage::{StageTransition, SubStage, TaskStage};
use crate::domain::utils::id::{CompositeLink, ContextId, DescriptionLink, ResourceLink, TaskAddress, TrackerLink};

mod actor;
mod handler;
pub mod messages;

/// Sub-stages of a composition request, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CompositionStage {
    Created,
    ContextPrepared,
    ResourcesNamed,
    ComponentCreated,
    DependencyGraph,
    Distributing,
    Allocating,
    ErrorAllocating,
    Allocated,
    DistributeTasks,
    Provisioning,
    ErrorProvisioning,
    Completed,
    Error,
    Failed,
}

impl SubStage for CompositionStage {
    fn ordinal(&self) -> usize {
        *self as usize
    }

    fn is_transient(&self) -> bool {
        matches!(self, CompositionStage::Distributing | CompositionStage::DistributeTasks)
    }
}

/// A request to provision one composite description.
#[derive(Debug, Clone, Default)]
pub struct CompositionRequest {
    pub description_link: DescriptionLink,
    pub tenant_links: Vec<String>,
    pub custom_properties: BTreeMap<String, String>,
    pub tracker_link: Option<TrackerLink>,
}

impl CompositionRequest {
    pub fn new(description_link: DescriptionLink) -> Self {
        Self { description_link, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Removed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CompositionTaskState {
    pub address: TaskAddress,
    pub request: CompositionRequest,

    pub context_id: Option<ContextId>,
    pub description_name: Option<String>,
    pub composite_name: Option<String>,
    pub composite_link: Option<CompositeLink>,
    /// Request properties merged over the description's.
    pub custom_properties: BTreeMap<String, String>,
    pub tenant_links: Vec<String>,

    pub resource_nodes: BTreeMap<TaskAddress, ResourceNode>,
    /// Nodes that still have to report in the current phase.
    pub remaining_count: i64,
    pub error_count: u32,
    /// Senders already counted in the current phase.
    pub counted: HashSet<TaskAddress>,
    /// Links reported per resource node name.
    pub resource_links: BTreeMap<String, Vec<ResourceLink>>,
    pub failures: Vec<String>,
    pub cleanup: Option<CleanupOutcome>,

    pub stage: TaskStage,
    pub sub_stage: CompositionStage,
    pub failure: Option<String>,
}

impl CompositionTaskState {
    pub fn new(address: TaskAddress, request: CompositionRequest) -> Self {
        Self {
            address,
            custom_properties: request.custom_properties.clone(),
            tenant_links: request.tenant_links.clone(),
            request,
            context_id: None,
            description_name: None,
            composite_name: None,
            composite_link: None,
            resource_nodes: BTreeMap::new(),
            remaining_count: 0,
            error_count: 0,
            counted: HashSet::new(),
            resource_links: BTreeMap::new(),
            failures: Vec::new(),
            cleanup: None,
            stage: TaskStage::Created,
            sub_stage: CompositionStage::Created,
            failure: None,
        }
    }

    pub fn transition(&self) -> StageTransition<CompositionStage> {
        StageTransition { stage: self.stage, sub_stage: self.sub_stage }
    }

    /// Keys the resolved nodes by their sub task address and resets the phase counters.
    ///
    /// Fails with `DuplicateName` if two nodes land on the same address.
    pub fn assign_addresses(&mut self, nodes: Vec<ResourceNode>) -> Result<()> {
        let request_id = self.address.self_id().to_string();
        let mut resource_nodes: BTreeMap<TaskAddress, ResourceNode> = BTreeMap::new();
        for node in nodes {
            let address = TaskAddress::sub_task(&request_id, &node.name);
            if let Some(previous) = resource_nodes.get(&address) {
                return Err(Error::DuplicateName {
                    name: node.name.clone(),
                    first: previous.description_link.to_string(),
                    second: node.description_link.to_string(),
                });
            }
            resource_nodes.insert(address, node);
        }

        self.remaining_count = resource_nodes.len() as i64;
        self.resource_nodes = resource_nodes;
        self.counted.clear();
        Ok(())
    }

    pub fn all_resource_links(&self) -> Vec<ResourceLink> {
        self.resource_links.values().flatten().cloned().collect()
    }

    pub fn failure_summary(&self) -> String {
        if let Some(failure) = &self.failure {
            return failure.clone();
        }
        if !self.failures.is_empty() {
            return self.failures.join("; ");
        }
        "Composition failed.".to_string()
    }
}

/// Terminal result of a composition request.
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionOutcome {
    Completed {
        composite_link: CompositeLink,
        resource_links: Vec<ResourceLink>,
    },
    Failed {
        failure: String,
        composite_link: Option<CompositeLink>,
        resource_links: Vec<ResourceLink>,
        /// `None` when nothing had to be cleaned up.
        cleanup: Option<CleanupOutcome>,
    },
}

impl CompositionOutcome {
    pub fn from_state(state: &CompositionTaskState) -> Self {
        match (&state.stage, &state.composite_link) {
            (TaskStage::Finished, Some(composite_link)) => {
                CompositionOutcome::Completed { composite_link: composite_link.clone(), resource_links: state.all_resource_links() }
            }
            _ => CompositionOutcome::Failed {
                failure: state.failure_summary(),
                composite_link: state.composite_link.clone(),
                resource_links: state.all_resource_links(),
                cleanup: state.cleanup.clone(),
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CompositionOutcome::Completed { .. })
    }
}

/// Coordinates the node tasks of one composition request.
pub struct CompositionTask {
    pub state: CompositionTaskState,
    callback: Arc<dyn TaskCallback>,
    context: OrchestrationContext,
    cleanup_started: bool,
    reported: bool,
}

impl CompositionTask {
    pub fn new(address: TaskAddress, request: CompositionRequest, callback: Arc<dyn TaskCallback>, context: OrchestrationContext) -> Self {
        Self { state: CompositionTaskState::new(address, request), callback, context, cleanup_started: false, reported: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_stages_precede_their_error_stages() {
        assert!(CompositionStage::Allocating.ordinal() < CompositionStage::ErrorAllocating.ordinal());
        assert!(CompositionStage::ErrorAllocating.ordinal() < CompositionStage::Allocated.ordinal());
        assert!(CompositionStage::Provisioning.ordinal() < CompositionStage::ErrorProvisioning.ordinal());
        assert!(CompositionStage::Error.ordinal() < CompositionStage::Failed.ordinal());
    }

    fn node(name: &str) -> ResourceNode {
        ResourceNode {
            name: name.to_string(),
            description_link: DescriptionLink::new(format!("/resources/component-descriptions/{}", name)),
            resource_type: "container".to_string(),
            level: 1,
            depends_on: Default::default(),
            dependents: Default::default(),
        }
    }

    #[test]
    fn test_similar_names_get_their_own_address() {
        let mut state = CompositionTaskState::new(TaskAddress::composition_task("c0"), CompositionRequest::new(DescriptionLink::new("/d")));
        state.assign_addresses(vec![node("web app"), node("web_app"), node("web-app")]).unwrap();

        assert_eq!(state.resource_nodes.len(), 3);
        assert_eq!(state.remaining_count, 3);
    }

    #[test]
    fn test_address_collision_is_rejected() {
        let mut state = CompositionTaskState::new(TaskAddress::composition_task("c0"), CompositionRequest::new(DescriptionLink::new("/d")));
        let err = state.assign_addresses(vec![node("web"), node("web")]).unwrap_err();

        assert!(matches!(err, Error::DuplicateName { ref name, .. } if name == "web"));
        assert!(state.resource_nodes.is_empty());
        assert_eq!(state.remaining_count, 0);
    }

    #[test]
    fn test_outcome_without_composite_is_failure() {
        let mut state = CompositionTaskState::new(TaskAddress::composition_task("c1"), CompositionRequest::new(DescriptionLink::new("/d")));
        state.stage = TaskStage::Failed;
        state.failures.push("web: boom".into());

        match CompositionOutcome::from_state(&state) {
            CompositionOutcome::Failed { failure, composite_link, cleanup, .. } => {
                assert_eq!(failure, "web: boom");
                assert!(composite_link.is_none());
                assert!(cleanup.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_completed_outcome_lists_links() {
        let mut state = CompositionTaskState::new(TaskAddress::composition_task("c2"), CompositionRequest::new(DescriptionLink::new("/d")));
        state.stage = TaskStage::Finished;
        state.composite_link = Some(CompositeLink::new("/resources/composite-components/c2"));
        state.resource_links.insert("db".into(), vec![ResourceLink::new("/resources/container/db-1")]);
        state.resource_links.insert("web".into(), vec![ResourceLink::new("/resources/container/web-1")]);

        let outcome = CompositionOutcome::from_state(&state);
        assert!(outcome.is_completed());
        if let CompositionOutcome::Completed { resource_links, .. } = outcome {
            assert_eq!(resource_links.len(), 2);
        }
    }
}
