use std::sync::Arc;

use actix::prelude::{ActorFutureExt, AsyncContext, Context, Handler, MessageResult, WrapFuture};
use futures::future::join_all;

use crate::domain::collaborators::provisioner::ProvisionerError;
use crate::domain::orchestration::callback::{CallbackResponse, CompletionCallback, StagePatch, TaskCallback};
use crate::domain::orchestration::node_task::{NodeTask, NodeTaskState, TaskOperation};
use crate::domain::orchestration::removal::messages::{GetRemovalState, RemovalPatch};
use crate::domain::orchestration::removal::plan::{RemovalPlan, build_removal_plan};
use crate::domain::orchestration::removal::{CompositeRemovalTask, RemovalStage};
use crate::domain::orchestration::stage::{StageTransition, TaskStage, log_transition};
use crate::domain::utils::id::{DescriptionLink, TaskAddress};
use crate::error::Error;

const KIND: &str = "removal";

impl Handler<RemovalPatch> for CompositeRemovalTask {
    type Result = ();

    fn handle(&mut self, patch: RemovalPatch, ctx: &mut Self::Context) {
        if self.state.stage.is_terminal() {
            log::debug!("Removal {} is already {}, patch to {} ignored.", self.state.address, self.state.transition(), patch.0);
            return;
        }
        self.proceed(patch.0, ctx);
    }
}

/// Reports of the batch tasks.
impl Handler<StagePatch<RemovalStage>> for CompositeRemovalTask {
    type Result = ();

    fn handle(&mut self, patch: StagePatch<RemovalStage>, ctx: &mut Self::Context) {
        if self.state.stage.is_terminal() || self.state.sub_stage != RemovalStage::InstancesRemoving {
            log::warn!("Removal {} in {}: report from [{}] dropped.", self.state.address, self.state.transition(), patch.response.referer);
            return;
        }

        let response = patch.response;
        let Some(batch_name) = self.state.batches.get(&response.referer).map(|batch| batch.name.clone()) else {
            log::warn!("Removal {}: report from unknown task [{}] dropped.", self.state.address, response.referer);
            return;
        };
        if !self.state.counted.insert(response.referer.clone()) {
            log::warn!("Removal {}: [{}] already reported, duplicate dropped.", self.state.address, batch_name);
            return;
        }

        self.state.remaining_count -= 1;
        match response.failure() {
            Some(failure) => self.state.failures.push(format!("{}: {}", batch_name, failure)),
            None => self.state.removed_links.extend(response.resource_links.iter().cloned()),
        }
        log::info!("Removal {}: batch [{}] reported, {} batches remaining.", self.state.address, batch_name, self.state.remaining_count);

        self.proceed(patch.transition, ctx);
    }
}

impl Handler<GetRemovalState> for CompositeRemovalTask {
    type Result = MessageResult<GetRemovalState>;

    fn handle(&mut self, _msg: GetRemovalState, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.state.clone())
    }
}

impl CompositeRemovalTask {
    fn proceed(&mut self, next: StageTransition<RemovalStage>, ctx: &mut Context<Self>) {
        let current = self.state.transition();
        if current.is_regression_to(&next) {
            log::warn!("Removal {} can't move back from {} to {}.", self.state.address, current, next);
            return;
        }

        log_transition(self.state.address.as_str(), KIND, &current, &next);
        self.state.stage = next.stage;
        self.state.sub_stage = next.sub_stage;

        match next.stage {
            TaskStage::Started => self.handle_started_stage(ctx),
            TaskStage::Finished | TaskStage::Failed => self.complete(),
            TaskStage::Created => {}
        }
    }

    fn proceed_to(&self, sub_stage: RemovalStage, ctx: &mut Context<Self>) {
        ctx.notify(RemovalPatch(StageTransition::started(sub_stage)));
    }

    fn fail_with(&mut self, failure: String, ctx: &mut Context<Self>) {
        log::error!("Removal {}: {}", self.state.address, failure);
        self.state.failure.get_or_insert(failure);
        self.proceed_to(RemovalStage::Error, ctx);
    }

    fn handle_started_stage(&mut self, ctx: &mut Context<Self>) {
        match self.state.sub_stage {
            RemovalStage::Created => self.query_composite_components(ctx),
            RemovalStage::InstancesRemoving => {
                if self.state.remaining_count > 0 {
                    return;
                }
                if self.state.failures.is_empty() {
                    self.proceed_to(RemovalStage::CompositeRemoving, ctx);
                } else {
                    let failure = format!("Failed to remove composite members: {}", self.state.failures.join("; "));
                    self.fail_with(failure, ctx);
                }
            }
            RemovalStage::CompositeRemoving => self.remove_composites(ctx),
            RemovalStage::Completed => ctx.notify(RemovalPatch(StageTransition::finished(RemovalStage::Completed))),
            RemovalStage::Error => ctx.notify(RemovalPatch(StageTransition::failed(RemovalStage::Error))),
        }
    }

    fn query_composite_components(&mut self, ctx: &mut Context<Self>) {
        let registry = self.context.composites.clone();
        let composites = self.state.composite_links.clone();

        let future = async move {
            let mut components = Vec::new();
            for composite in &composites {
                for link in registry.component_links(composite).await? {
                    let meta = registry.component_meta(&link).await?;
                    components.push((link, meta));
                }
            }
            Ok::<_, Error>(components)
        };

        ctx.spawn(future.into_actor(self).map(|result, act: &mut CompositeRemovalTask, ctx: &mut Context<CompositeRemovalTask>| {
            let components = match result {
                Ok(components) => components,
                Err(e) => {
                    act.fail_with(format!("Failure retrieving composite members: {}", e), ctx);
                    return;
                }
            };
            if components.is_empty() {
                log::info!("Removal {}: composites have no members.", act.state.address);
                act.proceed_to(RemovalStage::CompositeRemoving, ctx);
                return;
            }
            match build_removal_plan(&components) {
                Ok(plan) => act.start_batches(plan, ctx),
                Err(e) => act.fail_with(e.to_string(), ctx),
            }
        }));
    }

    fn start_batches(&mut self, plan: RemovalPlan, ctx: &mut Context<Self>) {
        let request_id = self.state.address.self_id().to_string();
        let address_of = |name: &str| TaskAddress::sub_task(&request_id, name);
        let callback: Arc<dyn TaskCallback> = Arc::new(CompletionCallback::new(
            self.state.address.clone(),
            ctx.address().recipient(),
            StageTransition::started(RemovalStage::InstancesRemoving),
            StageTransition::started(RemovalStage::InstancesRemoving),
        ));

        let mut pending = Vec::with_capacity(plan.batch_count());
        for batch in plan.batches() {
            let address = address_of(&batch.name);
            let description_link = DescriptionLink::new(format!("/resources/removal-batches/{}", batch.name));
            let mut state = NodeTaskState::new(address.clone(), batch.name.clone(), batch.resource_type.clone(), description_link, self.state.context_id.clone());
            state.operation = TaskOperation::Remove;
            state.allocation_request = false;
            state.external_scheduler = batch.external_scheduler.clone();
            state.tenant_links = self.state.tenant_links.clone();
            state.resource_links = batch.member_links.iter().cloned().collect();
            state.resource_count = batch.member_links.len();
            state.depends_on.extend(batch.prev_batch.as_deref().map(address_of));
            state.dependents.extend(batch.next_batch.as_deref().map(address_of));

            let task_context = Context::<NodeTask>::new();
            self.context.directory.register(address.clone(), task_context.address());
            pending.push((task_context, NodeTask::new(state, callback.clone(), self.context.clone())));
            self.state.batches.insert(address, batch.clone());
        }
        self.state.remaining_count = self.state.batches.len() as i64;
        log::info!("Removal {}: {} removal batches ({} chained).", self.state.address, plan.batch_count(), plan.chain.len());

        for (task_context, task) in pending {
            task_context.run(task);
        }

        let next = StageTransition::started(RemovalStage::InstancesRemoving);
        log_transition(self.state.address.as_str(), KIND, &self.state.transition(), &next);
        self.state.sub_stage = RemovalStage::InstancesRemoving;
    }

    /// Deletes the composite records in parallel. Cancelled deletions don't count as failures.
    fn remove_composites(&mut self, ctx: &mut Context<Self>) {
        let deletions: Vec<_> = self
            .state
            .composite_links
            .iter()
            .map(|composite| {
                let registry = self.context.composites.clone();
                let composite = composite.clone();
                async move {
                    let result = registry.remove_composite(&composite).await;
                    (composite, result)
                }
            })
            .collect();

        ctx.spawn(join_all(deletions).into_actor(self).map(|results, act: &mut CompositeRemovalTask, ctx: &mut Context<CompositeRemovalTask>| {
            let failures: Vec<String> = results
                .into_iter()
                .filter_map(|(composite, result)| match result {
                    Ok(()) => None,
                    Err(ProvisionerError::Cancelled) => {
                        log::info!("Removal {}: deletion of {} was cancelled, ignored.", act.state.address, composite);
                        None
                    }
                    Err(e) => Some(format!("{}: {}", composite, e)),
                })
                .collect();

            if failures.is_empty() {
                act.proceed_to(RemovalStage::Completed, ctx);
            } else {
                act.fail_with(format!("Failed to remove composite components: {}", failures.join("; ")), ctx);
            }
        }));
    }

    fn complete(&mut self) {
        if self.reported {
            return;
        }
        self.reported = true;

        for address in self.state.batches.keys() {
            self.context.directory.unregister(address);
        }

        let name = "composite-removal";
        let response = if self.state.stage == TaskStage::Finished {
            CallbackResponse::finished(self.state.address.clone(), name, self.state.removed_links.clone())
        } else {
            let failure = self.state.failure.clone().unwrap_or_else(|| "Composite removal failed.".to_string());
            CallbackResponse::failed(self.state.address.clone(), name, failure)
        };

        log::info!("Removal {} reached {}.", self.state.address, self.state.transition());
        self.callback.notify(response);
    }
}
