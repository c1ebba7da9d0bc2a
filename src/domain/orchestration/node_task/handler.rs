use std::str::FromStr;

use actix::prelude::{ActorFutureExt, AsyncContext, Context, Handler, MessageResult, WrapFuture};
use futures::future::{BoxFuture, join_all};

use crate::domain::collaborators::provisioner::{ProvisionRequest, ProvisionerError, RemovalRequest};
use crate::domain::orchestration::callback::CallbackResponse;
use crate::domain::orchestration::directory::first_delivery_failure;
use crate::domain::orchestration::node_task::messages::{GetNodeTaskState, NodeTaskPatch};
use crate::domain::orchestration::node_task::{NodeStage, NodeTask, TaskOperation};
use crate::domain::orchestration::stage::{StageTransition, SubStage, TaskStage, log_transition};
use crate::domain::resource_type::ResourceType;
use crate::domain::utils::id::ResourceLink;
use crate::error::{Error, Result};

const KIND: &str = "node";

type ProvisionerFuture = BoxFuture<'static, std::result::Result<Vec<ResourceLink>, ProvisionerError>>;

impl Handler<NodeTaskPatch> for NodeTask {
    type Result = Result<()>;

    fn handle(&mut self, patch: NodeTaskPatch, ctx: &mut Self::Context) -> Self::Result {
        if self.state.stage.is_terminal() {
            log::debug!("Task {} is already {}, patch to {} ignored.", self.state.address, self.state.transition(), patch.transition);
            return Ok(());
        }

        let current = self.state.transition();
        if patch.transition.sub_stage == NodeStage::Execute && current.sub_stage.ordinal() > NodeStage::Execute.ordinal() {
            log::debug!("Task {} is already {}, stale EXECUTE ignored.", self.state.address, current);
            return Ok(());
        }
        if current.is_regression_to(&patch.transition) {
            log::warn!("Task {} can't move back from {} to {}, patch ignored.", self.state.address, current, patch.transition);
            return Ok(());
        }

        if let Some(dependency) = &patch.completed_dependency {
            if !self.state.depends_on.remove(dependency) {
                log::warn!("Task {} notified by [{}] which is not among its pending dependencies.", self.state.address, dependency);
                return Ok(());
            }
            log::debug!("Task {} released by [{}], {} dependencies pending.", self.state.address, dependency, self.state.depends_on.len());
        }

        self.merge(patch, ctx);
        Ok(())
    }
}

impl Handler<GetNodeTaskState> for NodeTask {
    type Result = MessageResult<GetNodeTaskState>;

    fn handle(&mut self, _msg: GetNodeTaskState, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.state.clone())
    }
}

impl NodeTask {
    fn merge(&mut self, patch: NodeTaskPatch, ctx: &mut Context<Self>) {
        for link in patch.resource_links {
            if !self.state.resource_links.contains(&link) {
                self.state.resource_links.push(link);
            }
        }

        if patch.transition.sub_stage == NodeStage::PrepareExecute {
            if let Some(depends_on) = patch.depends_on {
                self.state.depends_on = depends_on;
            }
            if let Some(callback) = patch.callback {
                self.callback = callback;
            }
            self.state.post_allocation = true;
        }

        if let Some(failure) = patch.failure {
            self.state.failure.get_or_insert(failure);
        }

        let next = if patch.transition == StageTransition::started(NodeStage::Error) && self.state.has_dependencies() {
            // The error surfaces once the remaining dependencies resolve.
            self.state.error_count += 1;
            let waiting_in = if self.state.post_allocation { NodeStage::Execute } else { NodeStage::Created };
            log::warn!(
                "Task {} failed with {} pending dependencies, error deferred (error count {}).",
                self.state.address,
                self.state.depends_on.len(),
                self.state.error_count
            );
            StageTransition::started(waiting_in)
        } else {
            patch.transition
        };

        self.proceed(next, ctx);
    }

    fn proceed(&mut self, next: StageTransition<NodeStage>, ctx: &mut Context<Self>) {
        log_transition(self.state.address.as_str(), KIND, &self.state.transition(), &next);
        self.state.stage = next.stage;
        self.state.sub_stage = next.sub_stage;

        match next.stage {
            TaskStage::Started => self.handle_started_stage(ctx),
            TaskStage::Finished | TaskStage::Failed => self.report_completion(),
            TaskStage::Created => {}
        }
    }

    /// Sets a transient sub-stage without a round trip through the mailbox.
    fn enter_transient(&mut self, sub_stage: NodeStage) {
        let next = StageTransition::started(sub_stage);
        log_transition(self.state.address.as_str(), KIND, &self.state.transition(), &next);
        self.state.sub_stage = sub_stage;
    }

    fn handle_started_stage(&mut self, ctx: &mut Context<Self>) {
        match self.state.sub_stage {
            NodeStage::Created => self.check_dependencies(ctx),
            NodeStage::Allocating => {}
            NodeStage::Allocated => {
                let next = if self.state.allocation_request {
                    StageTransition::started(NodeStage::Notify)
                } else {
                    StageTransition::finished(NodeStage::Completed)
                };
                self.notify_dependent_tasks(NodeStage::Created, next, ctx);
            }
            NodeStage::Notify => self.notify_caller(),
            NodeStage::PrepareExecute => {}
            NodeStage::Execute => self.check_dependencies(ctx),
            NodeStage::Executing => {}
            NodeStage::Completed => self.notify_dependent_tasks(NodeStage::Execute, StageTransition::finished(NodeStage::Completed), ctx),
            NodeStage::Error => {
                if !self.state.has_dependencies() {
                    self.notify_dependent_tasks(NodeStage::Error, StageTransition::failed(NodeStage::Error), ctx);
                }
            }
        }
    }

    fn check_dependencies(&mut self, ctx: &mut Context<Self>) {
        if self.state.has_dependencies() {
            log::debug!("Task {} waits for {} dependencies in {:?}.", self.state.address, self.state.depends_on.len(), self.state.sub_stage);
            self.arm_dependency_timeout(ctx);
            return;
        }

        if self.state.error_count > 0 {
            ctx.notify(NodeTaskPatch::started(NodeStage::Error));
            return;
        }

        if self.state.sub_stage.ordinal() < NodeStage::Allocating.ordinal() {
            self.allocate(ctx);
        } else {
            self.execute(ctx);
        }
    }

    fn arm_dependency_timeout(&mut self, ctx: &mut Context<Self>) {
        let Some(timeout) = self.context.settings.dependency_timeout else {
            return;
        };
        let waiting_in = self.state.sub_stage;
        if self.timeout_armed_for == Some(waiting_in) {
            return;
        }
        self.timeout_armed_for = Some(waiting_in);
        ctx.run_later(timeout, move |act, ctx| act.on_dependency_timeout(waiting_in, ctx));
    }

    fn on_dependency_timeout(&mut self, waiting_in: NodeStage, ctx: &mut Context<Self>) {
        if self.state.stage != TaskStage::Started || self.state.sub_stage != waiting_in || !self.state.has_dependencies() {
            return;
        }

        let pending: Vec<String> = self.state.depends_on.iter().map(|a| a.to_string()).collect();
        log::error!("Task {} timed out in {:?} waiting for {:?}.", self.state.address, waiting_in, pending);

        self.state.error_count += 1;
        self.state.depends_on.clear();
        ctx.notify(NodeTaskPatch::error(format!("Timed out waiting for dependencies [{}].", pending.join(", "))));
    }

    /// Allocation step. For removal batches this is the removal itself.
    fn allocate(&mut self, ctx: &mut Context<Self>) {
        let prepared = match self.state.operation {
            TaskOperation::Provision => self.allocation_future(),
            TaskOperation::Remove => self.removal_future(),
        };
        let future = match prepared {
            Ok(future) => future,
            Err(e) => {
                log::error!("Task {} can't allocate: {}", self.state.address, e);
                ctx.notify(NodeTaskPatch::error(e.to_string()));
                return;
            }
        };

        self.enter_transient(NodeStage::Allocating);
        ctx.spawn(future.into_actor(self).map(|result, act: &mut NodeTask, ctx: &mut Context<NodeTask>| match result {
            Ok(links) => ctx.notify(NodeTaskPatch::started(NodeStage::Allocated).with_resource_links(links)),
            Err(e) => {
                let error = Error::ProvisionerFailure { component: act.state.name.clone(), reason: e.to_string() };
                log::error!("Task {}: {}", act.state.address, error);
                ctx.notify(NodeTaskPatch::error(error.to_string()));
            }
        }));
    }

    fn execute(&mut self, ctx: &mut Context<Self>) {
        let prepared = self
            .provisionable_type()
            .and_then(|resource_type| Ok((self.context.provisioners.provisioner_for(&resource_type)?, self.provision_request(resource_type))));
        let (provisioner, request) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                log::error!("Task {} can't execute: {}", self.state.address, e);
                ctx.notify(NodeTaskPatch::error(e.to_string()));
                return;
            }
        };

        self.enter_transient(NodeStage::Executing);
        let future = async move { provisioner.provision(request).await };
        ctx.spawn(future.into_actor(self).map(|result, act: &mut NodeTask, ctx: &mut Context<NodeTask>| match result {
            Ok(links) => ctx.notify(NodeTaskPatch::started(NodeStage::Completed).with_resource_links(links)),
            Err(e) => {
                let error = Error::ProvisionerFailure { component: act.state.name.clone(), reason: e.to_string() };
                log::error!("Task {}: {}", act.state.address, error);
                ctx.notify(NodeTaskPatch::error(error.to_string()));
            }
        }));
    }

    fn provisionable_type(&self) -> Result<ResourceType> {
        let resource_type = ResourceType::from_str(&self.state.resource_type)?;
        if !resource_type.is_provisionable() {
            return Err(Error::UnsupportedResourceType(resource_type.to_string()));
        }
        Ok(resource_type)
    }

    fn provision_request(&self, resource_type: ResourceType) -> ProvisionRequest {
        let resource_count = if self.state.resource_links.is_empty() { self.state.resource_count } else { self.state.resource_links.len() };
        ProvisionRequest {
            component_name: self.state.name.clone(),
            resource_type,
            description_link: self.state.description_link.clone(),
            tenant_links: self.state.tenant_links.clone(),
            context_id: self.state.context_id.clone(),
            resource_links: self.state.resource_links.clone(),
            resource_count,
            custom_properties: self.state.custom_properties.clone(),
        }
    }

    fn allocation_future(&self) -> Result<ProvisionerFuture> {
        let resource_type = self.provisionable_type()?;
        let provisioner = self.context.provisioners.provisioner_for(&resource_type)?;
        let request = self.provision_request(resource_type);
        Ok(Box::pin(async move { provisioner.allocate(request).await }))
    }

    fn removal_future(&self) -> Result<ProvisionerFuture> {
        let request = RemovalRequest {
            batch_name: self.state.name.clone(),
            resource_type: self.state.resource_type.clone(),
            resource_links: self.state.resource_links.clone(),
            tenant_links: self.state.tenant_links.clone(),
            context_id: self.state.context_id.clone(),
        };
        let removed = request.resource_links.clone();

        match &self.state.external_scheduler {
            Some(address) => {
                let scheduler = self.context.provisioners.scheduler_for(address)?;
                Ok(Box::pin(async move { scheduler.remove_unit(request).await.map(|_| removed) }))
            }
            None => {
                let resource_type = ResourceType::from_str(&self.state.resource_type)?;
                let provisioner = self.context.provisioners.provisioner_for(&resource_type)?;
                Ok(Box::pin(async move { provisioner.remove(request).await.map(|_| removed) }))
            }
        }
    }

    /// Sends `sub_stage` to every dependent and waits for all acknowledgments before moving to `next`.
    /// The first delivery failure fails this task, later ones are only logged.
    fn notify_dependent_tasks(&mut self, sub_stage: NodeStage, next: StageTransition<NodeStage>, ctx: &mut Context<Self>) {
        if self.state.dependents.is_empty() {
            ctx.notify(NodeTaskPatch::transition(next));
            return;
        }

        let from = self.state.address.clone();
        let deliveries: Vec<_> = self
            .state
            .dependents
            .iter()
            .map(|dependent| self.context.directory.deliver(dependent, NodeTaskPatch::dependency_notification(from.clone(), sub_stage)))
            .collect();

        ctx.spawn(join_all(deliveries).into_actor(self).map(move |results, act: &mut NodeTask, ctx: &mut Context<NodeTask>| {
            match first_delivery_failure(&act.state.address, results) {
                Some(e) => {
                    log::error!("Task {}: {}", act.state.address, e);
                    act.fail_task(e.to_string(), ctx);
                }
                None => ctx.notify(NodeTaskPatch::transition(next)),
            }
        }));
    }

    fn fail_task(&mut self, failure: String, ctx: &mut Context<Self>) {
        let mut patch = NodeTaskPatch::transition(StageTransition::failed(self.state.sub_stage));
        patch.failure = Some(failure);
        ctx.notify(patch);
    }

    /// Reports the allocated links to the caller while the task waits for PREPARE_EXECUTE.
    fn notify_caller(&mut self) {
        let response = if self.state.resource_links.is_empty() {
            CallbackResponse::failed(self.state.address.clone(), self.state.name.clone(), "No resource links found for allocated resources.")
        } else {
            CallbackResponse::finished(self.state.address.clone(), self.state.name.clone(), self.state.resource_links.clone())
        };
        self.callback.notify(response);
    }

    fn report_completion(&mut self) {
        if self.reported {
            return;
        }
        self.reported = true;

        let response = match self.state.stage {
            TaskStage::Finished if self.state.resource_links.is_empty() => {
                CallbackResponse::failed(self.state.address.clone(), self.state.name.clone(), "No resource links found for allocated resources.")
            }
            TaskStage::Finished => CallbackResponse::finished(self.state.address.clone(), self.state.name.clone(), self.state.resource_links.clone()),
            _ => {
                let failure = self.state.failure.clone().unwrap_or_else(|| format!("Task {} failed.", self.state.name));
                CallbackResponse::failed(self.state.address.clone(), self.state.name.clone(), failure)
            }
        };

        log::info!("Task {} ({}) reached {}.", self.state.address, self.state.name, self.state.transition());
        self.callback.notify(response);
    }
}
