use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use actix::prelude::{Actor, ActorFutureExt, AsyncContext, Context, Handler, MessageResult, WrapFuture};
use futures::future::join_all;

use crate::domain::collaborators::stores::{ComponentProgress, RequestProgress};
use crate::domain::composition::component::CONTEXT_ID_PROPERTY;
use crate::domain::composition::graph::build_graph;
use crate::domain::orchestration::callback::{CallbackOutcome, CallbackResponse, CompletionCallback, StagePatch, TaskCallback};
use crate::domain::orchestration::coordinator::messages::{CompositionPatch, GetCompositionState};
use crate::domain::orchestration::coordinator::{CleanupOutcome, CompositionStage, CompositionTask};
use crate::domain::orchestration::directory::first_delivery_failure;
use crate::domain::orchestration::node_task::messages::NodeTaskPatch;
use crate::domain::orchestration::node_task::{NodeTask, NodeTaskState};
use crate::domain::orchestration::removal::CompositeRemovalTask;
use crate::domain::orchestration::stage::{StageTransition, TaskStage, log_transition};
use crate::domain::utils::id::{ContextId, ResourceLink, TaskAddress};

const KIND: &str = "composition";

impl Handler<CompositionPatch> for CompositionTask {
    type Result = ();

    fn handle(&mut self, patch: CompositionPatch, ctx: &mut Self::Context) {
        if self.state.stage.is_terminal() {
            log::debug!("Composition {} is already {}, patch to {} ignored.", self.state.address, self.state.transition(), patch.0);
            return;
        }
        self.proceed(patch.0, ctx);
    }
}

/// Reports of node tasks and of the cleanup removal task.
impl Handler<StagePatch<CompositionStage>> for CompositionTask {
    type Result = ();

    fn handle(&mut self, patch: StagePatch<CompositionStage>, ctx: &mut Self::Context) {
        if self.state.stage.is_terminal() {
            log::debug!("Composition {} is already {}, report from [{}] ignored.", self.state.address, self.state.transition(), patch.response.referer);
            return;
        }

        let StagePatch { transition, response } = patch;
        match transition.sub_stage {
            CompositionStage::Allocating | CompositionStage::ErrorAllocating | CompositionStage::Provisioning | CompositionStage::ErrorProvisioning => {
                self.count_node_report(transition, response, ctx)
            }
            _ => {
                if transition.stage == TaskStage::Failed {
                    self.state.cleanup = Some(match response.outcome {
                        CallbackOutcome::Finished => CleanupOutcome::Removed,
                        CallbackOutcome::Failed(reason) => CleanupOutcome::Failed(reason),
                    });
                }
                self.proceed(transition, ctx);
            }
        }
    }
}

impl Handler<GetCompositionState> for CompositionTask {
    type Result = MessageResult<GetCompositionState>;

    fn handle(&mut self, _msg: GetCompositionState, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.state.clone())
    }
}

impl CompositionTask {
    fn proceed(&mut self, next: StageTransition<CompositionStage>, ctx: &mut Context<Self>) {
        let current = self.state.transition();
        if current.is_regression_to(&next) {
            log::warn!("Composition {} can't move back from {} to {}.", self.state.address, current, next);
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

    fn proceed_to(&self, sub_stage: CompositionStage, ctx: &mut Context<Self>) {
        ctx.notify(CompositionPatch(StageTransition::started(sub_stage)));
    }

    fn fail_with(&mut self, failure: String, ctx: &mut Context<Self>) {
        log::error!("Composition {}: {}", self.state.address, failure);
        self.state.failure.get_or_insert(failure);
        self.proceed_to(CompositionStage::Error, ctx);
    }

    /// Moves to a sub-stage whose work already happened in the current handler.
    fn enter_in_place(&mut self, sub_stage: CompositionStage) {
        let next = StageTransition::started(sub_stage);
        log_transition(self.state.address.as_str(), KIND, &self.state.transition(), &next);
        self.state.sub_stage = sub_stage;
    }

    fn handle_started_stage(&mut self, ctx: &mut Context<Self>) {
        match self.state.sub_stage {
            CompositionStage::Created => self.prepare_context(ctx),
            CompositionStage::ContextPrepared => self.name_resources(ctx),
            CompositionStage::ResourcesNamed => self.create_composite_component(ctx),
            CompositionStage::ComponentCreated => self.calculate_dependency_graph(ctx),
            CompositionStage::DependencyGraph => self.distribute_tasks(ctx),
            CompositionStage::Distributing => {}
            CompositionStage::Allocating => self.counting(true, ctx),
            CompositionStage::ErrorAllocating => self.transition_to_error_if_no_remaining(ctx),
            CompositionStage::Allocated => self.patch_sub_tasks(ctx),
            CompositionStage::DistributeTasks => {}
            CompositionStage::Provisioning => self.counting(false, ctx),
            CompositionStage::ErrorProvisioning => self.transition_to_error_if_no_remaining(ctx),
            CompositionStage::Completed => ctx.notify(CompositionPatch(StageTransition::finished(CompositionStage::Completed))),
            CompositionStage::Error => self.clean_resources(ctx),
            CompositionStage::Failed => ctx.notify(CompositionPatch(StageTransition::failed(CompositionStage::Failed))),
        }
    }

    /// **Phase 1: Context**
    /// Fetches the composite description, merges its properties and fixes the context id.
    fn prepare_context(&mut self, ctx: &mut Context<Self>) {
        let store = self.context.descriptions.clone();
        let link = self.state.request.description_link.clone();

        ctx.spawn(async move { store.composite_description(&link, false).await }.into_actor(self).map(
            |result, act: &mut CompositionTask, ctx: &mut Context<CompositionTask>| match result {
                Ok(description) => {
                    for (key, value) in description.custom_properties {
                        act.state.custom_properties.entry(key).or_insert(value);
                    }
                    if act.state.tenant_links.is_empty() {
                        act.state.tenant_links = description.tenant_links;
                    }

                    let context_id = act.state.custom_properties.get(CONTEXT_ID_PROPERTY).cloned().unwrap_or_else(|| act.state.address.self_id().to_string());
                    act.state.custom_properties.insert(CONTEXT_ID_PROPERTY.to_string(), context_id.clone());
                    act.state.context_id = Some(ContextId::new(context_id));
                    act.state.description_name = Some(description.name);
                    act.proceed_to(CompositionStage::ContextPrepared, ctx);
                }
                Err(e) => act.fail_with(format!("Failure retrieving composite description: {}", e), ctx),
            },
        ));
    }

    fn name_resources(&mut self, ctx: &mut Context<Self>) {
        let base = self.state.description_name.clone().unwrap_or_else(|| "composite".to_string());
        let name = self.context.namer.composite_name(&base);
        log::debug!("Composition {} named its composite [{}].", self.state.address, name);
        self.state.composite_name = Some(name);
        self.proceed_to(CompositionStage::ResourcesNamed, ctx);
    }

    fn create_composite_component(&mut self, ctx: &mut Context<Self>) {
        let (Some(name), Some(context_id)) = (self.state.composite_name.clone(), self.state.context_id.clone()) else {
            self.fail_with("Composition context was not prepared.".to_string(), ctx);
            return;
        };
        let registry = self.context.composites.clone();
        let link = self.state.request.description_link.clone();
        let tenant_links = self.state.tenant_links.clone();

        ctx.spawn(async move { registry.create_composite(&name, &link, &tenant_links, &context_id).await }.into_actor(self).map(
            |result, act: &mut CompositionTask, ctx: &mut Context<CompositionTask>| match result {
                Ok(composite_link) => {
                    log::info!("Composition {} created composite {}.", act.state.address, composite_link);
                    act.state.composite_link = Some(composite_link);
                    act.proceed_to(CompositionStage::ComponentCreated, ctx);
                }
                Err(e) => act.fail_with(format!("Failure creating composite component: {}", e), ctx),
            },
        ));
    }

    /// **Phase 2: Dependency graph**
    fn calculate_dependency_graph(&mut self, ctx: &mut Context<Self>) {
        let store = self.context.descriptions.clone();
        let resolver = self.context.resolver.clone();
        let link = self.state.request.description_link.clone();

        let future = async move {
            let description = store.composite_description(&link, true).await?;
            build_graph(&description.components, resolver.as_ref())
        };

        ctx.spawn(future.into_actor(self).map(|result, act: &mut CompositionTask, ctx: &mut Context<CompositionTask>| match result {
            Ok(nodes) => match act.state.assign_addresses(nodes) {
                Ok(()) => {
                    log::info!("Composition {} resolved {} resource nodes.", act.state.address, act.state.resource_nodes.len());
                    act.proceed_to(CompositionStage::DependencyGraph, ctx);
                }
                Err(e) => act.fail_with(e.to_string(), ctx),
            },
            Err(e) => act.fail_with(e.to_string(), ctx),
        }));
    }

    fn addresses_by_name(&self) -> HashMap<String, TaskAddress> {
        self.state.resource_nodes.iter().map(|(address, node)| (node.name.clone(), address.clone())).collect()
    }

    fn to_addresses(names: &BTreeSet<String>, addresses: &HashMap<String, TaskAddress>) -> BTreeSet<TaskAddress> {
        names.iter().filter_map(|name| addresses.get(name).cloned()).collect()
    }

    /// **Phase 3: Allocation**
    /// Spawns one node task per resource node. All tasks are registered before any of them runs.
    fn distribute_tasks(&mut self, ctx: &mut Context<Self>) {
        self.track_progress(ctx);

        let Some(context_id) = self.state.context_id.clone() else {
            self.fail_with("Composition context was not prepared.".to_string(), ctx);
            return;
        };
        let addresses = self.addresses_by_name();
        let callback: Arc<dyn TaskCallback> = Arc::new(CompletionCallback::new(
            self.state.address.clone(),
            ctx.address().recipient(),
            StageTransition::started(CompositionStage::Allocating),
            StageTransition::started(CompositionStage::ErrorAllocating),
        ));

        let mut pending = Vec::with_capacity(self.state.resource_nodes.len());
        for (address, node) in &self.state.resource_nodes {
            let mut state = NodeTaskState::new(address.clone(), node.name.clone(), node.resource_type.clone(), node.description_link.clone(), context_id.clone());
            state.depends_on = Self::to_addresses(&node.depends_on, &addresses);
            state.dependents = Self::to_addresses(&node.dependents, &addresses);
            state.tenant_links = self.state.tenant_links.clone();
            state.custom_properties = self.state.custom_properties.clone();

            let task_context = Context::<NodeTask>::new();
            self.context.directory.register(address.clone(), task_context.address());
            pending.push((task_context, NodeTask::new(state, callback.clone(), self.context.clone())));
        }

        for (task_context, task) in pending {
            task_context.run(task);
        }
        self.enter_in_place(CompositionStage::Distributing);
    }

    fn track_progress(&mut self, ctx: &mut Context<Self>) {
        let (Some(tracker), Some(tracker_link)) = (self.context.tracker.clone(), self.state.request.tracker_link.clone()) else {
            return;
        };
        let progress = RequestProgress {
            request_id: self.state.address.self_id().to_string(),
            tracker_link,
            components: self
                .state
                .resource_nodes
                .values()
                .map(|node| ComponentProgress { name: node.name.clone(), resource_type: node.resource_type.clone(), level: node.level })
                .collect(),
        };

        ctx.spawn(async move { tracker.update_components(progress).await }.into_actor(self).map(
            |result, act: &mut CompositionTask, _ctx: &mut Context<CompositionTask>| {
                if let Err(e) = result {
                    log::warn!("Composition {}: updating the request tracker failed: {}", act.state.address, e);
                }
            },
        ));
    }

    /// Shared by ALLOCATING and PROVISIONING.
    fn count_node_report(&mut self, transition: StageTransition<CompositionStage>, response: CallbackResponse, ctx: &mut Context<Self>) {
        let reports_allocation = matches!(transition.sub_stage, CompositionStage::Allocating | CompositionStage::ErrorAllocating);
        let accepting = if reports_allocation {
            matches!(self.state.sub_stage, CompositionStage::Distributing | CompositionStage::Allocating)
        } else {
            matches!(self.state.sub_stage, CompositionStage::DistributeTasks | CompositionStage::Provisioning)
        };
        if !accepting {
            log::warn!(
                "Composition {}: report {:?} from [{}] arrived in {:?}, dropped.",
                self.state.address,
                transition.sub_stage,
                response.referer,
                self.state.sub_stage
            );
            return;
        }

        let Some(node_name) = self.state.resource_nodes.get(&response.referer).map(|node| node.name.clone()) else {
            log::warn!("Composition {}: report from unknown task [{}] dropped.", self.state.address, response.referer);
            return;
        };
        if self.state.remaining_count <= 0 {
            log::warn!("Composition {}: no remaining count left, report from [{}] dropped.", self.state.address, response.referer);
            return;
        }
        if !self.state.counted.insert(response.referer.clone()) {
            log::warn!("Composition {}: [{}] already reported in this phase, duplicate dropped.", self.state.address, response.referer);
            return;
        }

        self.state.remaining_count -= 1;
        if let Some(failure) = response.failure() {
            self.state.error_count += 1;
            self.state.failures.push(format!("{}: {}", node_name, failure));
        }
        if !response.resource_links.is_empty() {
            self.state.resource_links.insert(node_name.clone(), response.resource_links.clone());
        }
        log::info!(
            "Composition {}: [{}] reported {}, remaining count {}.",
            self.state.address,
            node_name,
            if response.is_failure() { "failure" } else { "success" },
            self.state.remaining_count
        );

        let counting = if reports_allocation { CompositionStage::Allocating } else { CompositionStage::Provisioning };
        let next = if response.is_failure() && self.state.remaining_count <= 0 { transition.sub_stage } else { counting };
        self.proceed(StageTransition::started(next), ctx);
    }

    fn counting(&mut self, allocation: bool, ctx: &mut Context<Self>) {
        if self.state.remaining_count > 0 {
            return;
        }
        if self.state.error_count > 0 {
            self.transition_to_error_if_no_remaining(ctx);
            return;
        }

        if allocation {
            self.state.remaining_count = self.state.resource_nodes.len() as i64;
            self.state.counted.clear();
            self.proceed_to(CompositionStage::Allocated, ctx);
        } else {
            self.proceed_to(CompositionStage::Completed, ctx);
        }
    }

    fn transition_to_error_if_no_remaining(&mut self, ctx: &mut Context<Self>) {
        if self.state.remaining_count > 0 {
            return;
        }
        let failure = format!(
            "{} of {} resource nodes failed: {}",
            self.state.error_count,
            self.state.resource_nodes.len(),
            self.state.failures.join("; ")
        );
        self.fail_with(failure, ctx);
    }

    /// **Phase 4: Provisioning**
    /// PREPARE_EXECUTE goes to every node first. EXECUTE is only sent once all of them acknowledged.
    fn patch_sub_tasks(&mut self, ctx: &mut Context<Self>) {
        let addresses = self.addresses_by_name();
        let callback: Arc<dyn TaskCallback> = Arc::new(CompletionCallback::new(
            self.state.address.clone(),
            ctx.address().recipient(),
            StageTransition::started(CompositionStage::Provisioning),
            StageTransition::started(CompositionStage::ErrorProvisioning),
        ));

        let deliveries: Vec<_> = self
            .state
            .resource_nodes
            .iter()
            .map(|(address, node)| {
                let patch = NodeTaskPatch::prepare_execute(Self::to_addresses(&node.depends_on, &addresses), callback.clone());
                self.context.directory.deliver(address, patch)
            })
            .collect();

        ctx.spawn(join_all(deliveries).into_actor(self).map(|results, act: &mut CompositionTask, ctx: &mut Context<CompositionTask>| {
            match first_delivery_failure(&act.state.address, results) {
                Some(e) => act.fail_with(e.to_string(), ctx),
                None => act.execute_sub_tasks(ctx),
            }
        }));
    }

    fn execute_sub_tasks(&mut self, ctx: &mut Context<Self>) {
        self.enter_in_place(CompositionStage::DistributeTasks);

        let deliveries: Vec<_> = self.state.resource_nodes.keys().map(|address| self.context.directory.deliver(address, NodeTaskPatch::execute())).collect();
        ctx.spawn(join_all(deliveries).into_actor(self).map(|results, act: &mut CompositionTask, ctx: &mut Context<CompositionTask>| {
            if let Some(e) = first_delivery_failure(&act.state.address, results) {
                act.fail_with(e.to_string(), ctx);
            }
        }));
    }

    /// **Phase 5: Rollback**
    /// Removes everything the composite collected so far. At most one rollback per request.
    fn clean_resources(&mut self, ctx: &mut Context<Self>) {
        if self.cleanup_started {
            return;
        }
        self.cleanup_started = true;

        let Some(composite_link) = self.state.composite_link.clone() else {
            log::info!("Composition {}: no composite component was created, nothing to clean.", self.state.address);
            ctx.notify(CompositionPatch(StageTransition::failed(CompositionStage::Failed)));
            return;
        };

        log::warn!("Composition {} failed, removing composite {}.", self.state.address, composite_link);
        let callback: Arc<dyn TaskCallback> = Arc::new(CompletionCallback::new(
            self.state.address.clone(),
            ctx.address().recipient(),
            StageTransition::failed(CompositionStage::Failed),
            StageTransition::failed(CompositionStage::Failed),
        ));
        let address = TaskAddress::removal_task(&format!("{}-cleanup", self.state.address.self_id()));
        let context_id = self.state.context_id.clone().unwrap_or_else(|| ContextId::new(self.state.address.self_id()));

        CompositeRemovalTask::new(address, vec![composite_link], self.state.tenant_links.clone(), context_id, callback, self.context.clone()).start();
    }

    fn complete(&mut self) {
        if self.reported {
            return;
        }
        self.reported = true;

        for address in self.state.resource_nodes.keys() {
            self.context.directory.unregister(address);
        }

        let name = self.state.composite_name.clone().unwrap_or_default();
        let response = if self.state.stage == TaskStage::Finished {
            let mut links: Vec<ResourceLink> = self.state.composite_link.iter().map(|link| ResourceLink::new(link.as_str())).collect();
            links.extend(self.state.all_resource_links());
            CallbackResponse::finished(self.state.address.clone(), name, links)
        } else {
            CallbackResponse::failed(self.state.address.clone(), name, self.state.failure_summary())
        };

        log::info!("Composition {} reached {}.", self.state.address, self.state.transition());
        self.callback.notify(response);
    }
}
