use actix::prelude::{Actor, AsyncContext, Context};

use crate::domain::orchestration::removal::messages::RemovalPatch;
use crate::domain::orchestration::removal::{CompositeRemovalTask, RemovalStage};
use crate::domain::orchestration::stage::StageTransition;

impl Actor for CompositeRemovalTask {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("Composite removal {} started for {:?}.", self.state.address, self.state.composite_links);
        ctx.notify(RemovalPatch(StageTransition::started(RemovalStage::Created)));
    }
}
