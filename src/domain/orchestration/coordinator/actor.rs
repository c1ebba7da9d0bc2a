use actix::prelude::{Actor, AsyncContext, Context};

use crate::domain::orchestration::coordinator::messages::CompositionPatch;
use crate::domain::orchestration::coordinator::{CompositionStage, CompositionTask};
use crate::domain::orchestration::stage::StageTransition;

impl Actor for CompositionTask {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::info!("Composition {} started for {}.", self.state.address, self.state.request.description_link);
        ctx.notify(CompositionPatch(StageTransition::started(CompositionStage::Created)));
    }
}
