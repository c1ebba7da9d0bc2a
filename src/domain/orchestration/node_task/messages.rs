use std::collections::BTreeSet;
use std::sync::Arc;

use actix::prelude::Message;

use crate::domain::orchestration::callback::TaskCallback;
use crate::domain::orchestration::node_task::{NodeStage, NodeTaskState};
use crate::domain::orchestration::stage::StageTransition;
use crate::domain::utils::id::{ResourceLink, TaskAddress};
use crate::error::Error;

/// Patch applied to a node task. Used for self transitions, dependency notifications
/// and the PREPARE_EXECUTE / EXECUTE commands of the coordinator.
#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), Error>")]
pub struct NodeTaskPatch {
    pub transition: StageTransition<NodeStage>,
    /// Set when the patch notifies that the given dependency progressed.
    pub completed_dependency: Option<TaskAddress>,
    /// Replaces the pending dependencies (PREPARE_EXECUTE only).
    pub depends_on: Option<BTreeSet<TaskAddress>>,
    /// Replaces the callback (PREPARE_EXECUTE only).
    pub callback: Option<Arc<dyn TaskCallback>>,
    pub resource_links: Vec<ResourceLink>,
    pub failure: Option<String>,
}

impl NodeTaskPatch {
    pub fn transition(transition: StageTransition<NodeStage>) -> Self {
        Self { transition, completed_dependency: None, depends_on: None, callback: None, resource_links: Vec::new(), failure: None }
    }

    pub fn started(sub_stage: NodeStage) -> Self {
        Self::transition(StageTransition::started(sub_stage))
    }

    pub fn error(failure: impl Into<String>) -> Self {
        let mut patch = Self::started(NodeStage::Error);
        patch.failure = Some(failure.into());
        patch
    }

    pub fn dependency_notification(from: TaskAddress, sub_stage: NodeStage) -> Self {
        let mut patch = Self::started(sub_stage);
        if sub_stage == NodeStage::Error {
            patch.failure = Some(format!("Dependency [{}] failed.", from));
        }
        patch.completed_dependency = Some(from);
        patch
    }

    pub fn prepare_execute(depends_on: BTreeSet<TaskAddress>, callback: Arc<dyn TaskCallback>) -> Self {
        let mut patch = Self::started(NodeStage::PrepareExecute);
        patch.depends_on = Some(depends_on);
        patch.callback = Some(callback);
        patch
    }

    pub fn execute() -> Self {
        Self::started(NodeStage::Execute)
    }

    pub fn with_resource_links(mut self, links: Vec<ResourceLink>) -> Self {
        self.resource_links = links;
        self
    }
}

/// Returns a copy of the current node task state.
#[derive(Message)]
#[rtype(result = "NodeTaskState")]
pub struct GetNodeTaskState;
