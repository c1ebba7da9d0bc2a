use actix::prelude::Message;

use crate::domain::orchestration::coordinator::{CompositionStage, CompositionTaskState};
use crate::domain::orchestration::stage::StageTransition;

/// Self-addressed transition of a composition task.
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct CompositionPatch(pub StageTransition<CompositionStage>);

#[derive(Message)]
#[rtype(result = "CompositionTaskState")]
pub struct GetCompositionState;
