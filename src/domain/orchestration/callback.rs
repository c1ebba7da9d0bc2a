use std::fmt;
use std::sync::Mutex;

use actix::prelude::{Message, Recipient};
use tokio::sync::oneshot;

use crate::domain::orchestration::stage::{StageTransition, SubStage};
use crate::domain::utils::id::{ResourceLink, TaskAddress};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Finished,
    Failed(String),
}

/// Body a task sends to whoever asked it to report back.
#[derive(Debug, Clone)]
pub struct CallbackResponse {
    /// Address of the reporting task.
    pub referer: TaskAddress,
    /// Resource node name (or batch name) of the reporting task.
    pub referer_name: String,
    pub outcome: CallbackOutcome,
    pub resource_links: Vec<ResourceLink>,
}

impl CallbackResponse {
    pub fn finished(referer: TaskAddress, referer_name: impl Into<String>, resource_links: Vec<ResourceLink>) -> Self {
        Self { referer, referer_name: referer_name.into(), outcome: CallbackOutcome::Finished, resource_links }
    }

    pub fn failed(referer: TaskAddress, referer_name: impl Into<String>, failure: impl Into<String>) -> Self {
        Self { referer, referer_name: referer_name.into(), outcome: CallbackOutcome::Failed(failure.into()), resource_links: Vec::new() }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CallbackOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.outcome {
            CallbackOutcome::Failed(reason) => Some(reason),
            CallbackOutcome::Finished => None,
        }
    }
}

/// A callback response mapped onto a stage of the receiving task.
pub struct StagePatch<S: SubStage> {
    pub transition: StageTransition<S>,
    pub response: CallbackResponse,
}

impl<S: SubStage> Message for StagePatch<S> {
    type Result = ();
}

/// Where and how a task reports its completion.
pub trait TaskCallback: Send + Sync + fmt::Debug {
    fn target_address(&self) -> &TaskAddress;
    fn notify(&self, response: CallbackResponse);
}

/// Callback into another task: success and failure land on the given stages of the target.
pub struct CompletionCallback<S: SubStage> {
    pub target_address: TaskAddress,
    pub target: Recipient<StagePatch<S>>,
    pub on_success: StageTransition<S>,
    pub on_failure: StageTransition<S>,
}

impl<S: SubStage> CompletionCallback<S> {
    pub fn new(target_address: TaskAddress, target: Recipient<StagePatch<S>>, on_success: StageTransition<S>, on_failure: StageTransition<S>) -> Self {
        Self { target_address, target, on_success, on_failure }
    }
}

impl<S: SubStage> fmt::Debug for CompletionCallback<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionCallback")
            .field("target_address", &self.target_address)
            .field("on_success", &self.on_success)
            .field("on_failure", &self.on_failure)
            .finish()
    }
}

impl<S: SubStage> TaskCallback for CompletionCallback<S> {
    fn target_address(&self) -> &TaskAddress {
        &self.target_address
    }

    fn notify(&self, response: CallbackResponse) {
        let transition = match response.outcome {
            CallbackOutcome::Finished => self.on_success,
            CallbackOutcome::Failed(_) => self.on_failure,
        };
        if !self.target.connected() {
            log::warn!("Parent task {} is gone, report from {} dropped.", self.target_address, response.referer);
            return;
        }
        // Reports must not be lost to a full mailbox.
        self.target.do_send(StagePatch { transition, response });
    }
}

/// Hands the terminal response of a top-level task to an awaiting caller.
pub struct OneshotCallback {
    address: TaskAddress,
    sender: Mutex<Option<oneshot::Sender<CallbackResponse>>>,
}

impl OneshotCallback {
    pub fn new(address: TaskAddress) -> (Self, oneshot::Receiver<CallbackResponse>) {
        let (tx, rx) = oneshot::channel();
        (Self { address, sender: Mutex::new(Some(tx)) }, rx)
    }
}

impl fmt::Debug for OneshotCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneshotCallback").field("address", &self.address).finish()
    }
}

impl TaskCallback for OneshotCallback {
    fn target_address(&self) -> &TaskAddress {
        &self.address
    }

    fn notify(&self, response: CallbackResponse) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => {
                if tx.send(response).is_err() {
                    log::debug!("Caller of {} is no longer waiting for the outcome.", self.address);
                }
            }
            None => log::warn!("Duplicate completion for {} dropped.", self.address),
        }
    }
}
