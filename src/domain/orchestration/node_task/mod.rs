use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::orchestration::callback::TaskCallback;
use crate::domain::orchestration::context::OrchestrationContext;
use crate::domain::orchestration::stage::{StageTransition, SubStage, TaskStage};
use crate::domain::utils::id::{ContextId, DescriptionLink, ResourceLink, SchedulerAddress, TaskAddress};

mod actor;
mod handler;
pub mod messages;

/// Sub-stages of a node task, in transition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeStage {
    Created,
    Allocating,
    Allocated,
    Notify,
    PrepareExecute,
    Execute,
    Executing,
    Completed,
    Error,
}

impl SubStage for NodeStage {
    fn ordinal(&self) -> usize {
        *self as usize
    }

    fn is_transient(&self) -> bool {
        matches!(self, NodeStage::Allocating | NodeStage::Executing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskOperation {
    /// Allocate, then provision the resources of one resource node.
    Provision,
    /// Remove one batch of resources during grouped removal.
    Remove,
}

/// State record of one node task.
#[derive(Debug, Clone)]
pub struct NodeTaskState {
    pub address: TaskAddress,
    pub name: String,
    pub resource_type: String,
    pub description_link: DescriptionLink,
    pub operation: TaskOperation,
    /// When unset the task finishes right after the allocation step.
    pub allocation_request: bool,
    pub external_scheduler: Option<SchedulerAddress>,

    /// Tasks that still have to notify this task before it may proceed.
    pub depends_on: BTreeSet<TaskAddress>,
    pub dependents: BTreeSet<TaskAddress>,

    pub context_id: ContextId,
    pub tenant_links: Vec<String>,
    pub custom_properties: BTreeMap<String, String>,
    pub resource_links: Vec<ResourceLink>,
    pub resource_count: usize,

    pub error_count: u32,
    pub post_allocation: bool,
    pub stage: TaskStage,
    pub sub_stage: NodeStage,
    pub failure: Option<String>,
}

impl NodeTaskState {
    pub fn new(address: TaskAddress, name: impl Into<String>, resource_type: impl Into<String>, description_link: DescriptionLink, context_id: ContextId) -> Self {
        Self {
            address,
            name: name.into(),
            resource_type: resource_type.into(),
            description_link,
            operation: TaskOperation::Provision,
            allocation_request: true,
            external_scheduler: None,
            depends_on: BTreeSet::new(),
            dependents: BTreeSet::new(),
            context_id,
            tenant_links: Vec::new(),
            custom_properties: BTreeMap::new(),
            resource_links: Vec::new(),
            resource_count: 1,
            error_count: 0,
            post_allocation: false,
            stage: TaskStage::Created,
            sub_stage: NodeStage::Created,
            failure: None,
        }
    }

    pub fn has_dependencies(&self) -> bool {
        !self.depends_on.is_empty()
    }

    pub fn transition(&self) -> StageTransition<NodeStage> {
        StageTransition { stage: self.stage, sub_stage: self.sub_stage }
    }
}

/// Drives the life cycle of one resource node (or one removal batch).
pub struct NodeTask {
    pub state: NodeTaskState,
    callback: Arc<dyn TaskCallback>,
    context: OrchestrationContext,
    /// Sub-stage the dependency timeout is currently armed for.
    timeout_armed_for: Option<NodeStage>,
    reported: bool,
}

impl NodeTask {
    pub fn new(state: NodeTaskState, callback: Arc<dyn TaskCallback>, context: OrchestrationContext) -> Self {
        Self { state, callback, context, timeout_armed_for: None, reported: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_matches_declaration() {
        assert!(NodeStage::Created.ordinal() < NodeStage::Allocating.ordinal());
        assert!(NodeStage::Notify.ordinal() < NodeStage::PrepareExecute.ordinal());
        assert!(NodeStage::Execute.ordinal() < NodeStage::Executing.ordinal());
        assert_eq!(NodeStage::Error.ordinal(), 8);
    }

    #[test]
    fn test_regression_detection() {
        let current = StageTransition::started(NodeStage::Executing);
        assert!(current.is_regression_to(&StageTransition::started(NodeStage::Execute)));
        assert!(!current.is_regression_to(&StageTransition::started(NodeStage::Completed)));
        assert!(!current.is_regression_to(&StageTransition::failed(NodeStage::Created)));
    }
}
