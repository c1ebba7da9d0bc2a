use actix::prelude::Message;

use crate::domain::orchestration::removal::{RemovalStage, RemovalTaskState};
use crate::domain::orchestration::stage::StageTransition;

#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct RemovalPatch(pub StageTransition<RemovalStage>);

#[derive(Message)]
#[rtype(result = "RemovalTaskState")]
pub struct GetRemovalState;
