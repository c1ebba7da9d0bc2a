use actix::prelude::{Actor, AsyncContext, Context};

use crate::domain::orchestration::node_task::messages::NodeTaskPatch;
use crate::domain::orchestration::node_task::{NodeStage, NodeTask};

impl Actor for NodeTask {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        log::debug!("Node task {} ({}) started.", self.state.address, self.state.name);
        ctx.notify(NodeTaskPatch::started(NodeStage::Created));
    }
}
