use std::sync::Arc;

use actix::prelude::{Actor, Addr};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::domain::orchestration::callback::{CallbackResponse, OneshotCallback};
use crate::domain::orchestration::context::OrchestrationContext;
use crate::domain::orchestration::coordinator::messages::GetCompositionState;
use crate::domain::orchestration::coordinator::{CompositionOutcome, CompositionRequest, CompositionTask};
use crate::domain::orchestration::removal::messages::GetRemovalState;
use crate::domain::orchestration::removal::{CompositeRemovalTask, RemovalOutcome};
use crate::domain::utils::id::{CompositeLink, ContextId, TaskAddress};
use crate::error::{Error, Result};

/// Entry point for submitting compositions and removals. Must be used inside a running actix system.
#[derive(Clone)]
pub struct CompositionService {
    context: OrchestrationContext,
}

impl CompositionService {
    pub fn new(context: OrchestrationContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &OrchestrationContext {
        &self.context
    }

    /// Starts a composition task. The receiver yields its terminal callback response.
    pub fn submit(&self, request: CompositionRequest) -> (Addr<CompositionTask>, oneshot::Receiver<CallbackResponse>) {
        let address = TaskAddress::composition_task(&Uuid::new_v4().to_string());
        let (callback, receiver) = OneshotCallback::new(address.clone());
        log::info!("Submitting composition {} for {}.", address, request.description_link);

        let task = CompositionTask::new(address, request, Arc::new(callback), self.context.clone());
        (task.start(), receiver)
    }

    /// Runs a composition request to its terminal stage.
    pub async fn compose(&self, request: CompositionRequest) -> Result<CompositionOutcome> {
        let (task, receiver) = self.submit(request);
        receiver.await.map_err(|_| Error::Collaborator("Composition task stopped without reporting.".to_string()))?;
        let state = task.send(GetCompositionState).await.map_err(|e| Error::Collaborator(e.to_string()))?;
        Ok(CompositionOutcome::from_state(&state))
    }

    pub fn submit_removal(&self, composites: Vec<CompositeLink>, tenant_links: Vec<String>) -> (Addr<CompositeRemovalTask>, oneshot::Receiver<CallbackResponse>) {
        let id = Uuid::new_v4().to_string();
        let address = TaskAddress::removal_task(&id);
        let (callback, receiver) = OneshotCallback::new(address.clone());
        log::info!("Submitting removal {} for {:?}.", address, composites);

        let task = CompositeRemovalTask::new(address, composites, tenant_links, ContextId::new(id), Arc::new(callback), self.context.clone());
        (task.start(), receiver)
    }

    /// Removes the given composites and all their members.
    pub async fn remove(&self, composites: Vec<CompositeLink>, tenant_links: Vec<String>) -> Result<RemovalOutcome> {
        let (task, receiver) = self.submit_removal(composites, tenant_links);
        receiver.await.map_err(|_| Error::Collaborator("Removal task stopped without reporting.".to_string()))?;
        let state = task.send(GetRemovalState).await.map_err(|e| Error::Collaborator(e.to_string()))?;
        Ok(RemovalOutcome::from_state(&state))
    }
}
