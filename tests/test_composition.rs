mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use common::{Harness, component, composite, position, web_stack};
use composition_orchestrator::domain::collaborators::stores::{RequestProgress, RequestTracker};
use composition_orchestrator::domain::composition::component::CONTEXT_ID_PROPERTY;
use composition_orchestrator::domain::orchestration::callback::{CallbackResponse, StagePatch};
use composition_orchestrator::domain::orchestration::context::NodeTaskSettings;
use composition_orchestrator::domain::orchestration::coordinator::messages::GetCompositionState;
use composition_orchestrator::domain::orchestration::coordinator::{CleanupOutcome, CompositionOutcome, CompositionStage};
use composition_orchestrator::domain::orchestration::stage::{StageTransition, TaskStage};
use composition_orchestrator::domain::resource_type::ResourceType;
use composition_orchestrator::domain::simulator::provisioner_simulator::SimulatorSettings;
use composition_orchestrator::domain::utils::id::{CompositeLink, TaskAddress, TrackerLink};

fn failing_allocation_of(names: &[&str]) -> SimulatorSettings {
    SimulatorSettings { fail_allocation: names.iter().map(|n| n.to_string()).collect::<HashSet<_>>(), ..Default::default() }
}

#[actix_rt::test]
async fn test_web_stack_is_provisioned_in_dependency_order() {
    let harness = Harness::new(SimulatorSettings::default(), web_stack());

    let outcome = harness.service.compose(harness.request()).await.unwrap();

    let CompositionOutcome::Completed { composite_link, resource_links } = outcome else {
        panic!("composition failed: {:?}", outcome);
    };
    assert_eq!(resource_links.len(), 4);

    let allocated = harness.allocated();
    assert_eq!(allocated.len(), 4);
    assert!(position(&allocated, "backend") < position(&allocated, "db"));
    assert!(position(&allocated, "db-data") < position(&allocated, "db"));
    assert!(position(&allocated, "db") < position(&allocated, "web"));

    let provisioned = harness.provisioned();
    assert_eq!(provisioned.len(), 4);
    assert!(position(&provisioned, "backend") < position(&provisioned, "db"));
    assert!(position(&provisioned, "db") < position(&provisioned, "web"));

    let record = harness.infrastructure.composites.composite(&composite_link).unwrap();
    assert_eq!(record.members.len(), 4);
    assert!(record.name.starts_with("web-stack-mcm"));
    assert!(harness.service.context().directory.is_empty());
}

#[actix_rt::test]
async fn test_context_id_from_request_property_names_the_composite() {
    let harness = Harness::new(SimulatorSettings::default(), composite("single", vec![component("app", ResourceType::Container)]));
    let mut request = harness.request();
    request.custom_properties.insert(CONTEXT_ID_PROPERTY.to_string(), "ctx-42".to_string());

    let outcome = harness.service.compose(request).await.unwrap();

    match outcome {
        CompositionOutcome::Completed { composite_link, .. } => {
            assert_eq!(composite_link, CompositeLink::new("/resources/composite-components/ctx-42"));
        }
        other => panic!("composition failed: {:?}", other),
    }
}

#[actix_rt::test]
async fn test_single_allocation_failure_counts_once_and_rolls_back() {
    let components = (1..=5).map(|i| component(&format!("node-{}", i), ResourceType::Container)).collect();
    let harness = Harness::new(failing_allocation_of(&["node-3"]), composite("five", components));

    let (task, receiver) = harness.service.submit(harness.request());
    let response = receiver.await.unwrap();
    assert!(response.is_failure());

    let state = task.send(GetCompositionState).await.unwrap();
    assert_eq!(state.stage, TaskStage::Failed);
    assert_eq!(state.sub_stage, CompositionStage::Failed);
    assert_eq!(state.error_count, 1);
    assert_eq!(state.remaining_count, 0);
    assert_eq!(state.cleanup, Some(CleanupOutcome::Removed));

    // The four allocated containers were removed together with the composite.
    assert_eq!(harness.removed_types(), vec!["container".to_string()]);
    assert_eq!(harness.removed_link_count(), 4);
    assert!(harness.provisioned().is_empty());
    let composite_link = state.composite_link.unwrap();
    assert!(harness.infrastructure.composites.composite(&composite_link).is_none());
}

#[actix_rt::test]
async fn test_components_with_similar_names_are_all_provisioned() {
    let components = vec![component("web app", ResourceType::Container), component("web_app", ResourceType::Container)];
    let harness = Harness::new(SimulatorSettings::default(), composite("similar", components));

    let outcome = harness.service.compose(harness.request()).await.unwrap();

    let CompositionOutcome::Completed { resource_links, .. } = outcome else {
        panic!("composition failed: {:?}", outcome);
    };
    assert_eq!(resource_links.len(), 2);
    let mut allocated = harness.allocated();
    allocated.sort();
    assert_eq!(allocated, vec!["web app".to_string(), "web_app".to_string()]);
    assert_eq!(harness.provisioned().len(), 2);
}

#[actix_rt::test]
async fn test_node_reports_are_counted_once_per_phase() {
    let components = ["a", "b", "c"].iter().map(|name| component(name, ResourceType::Container)).collect();
    let settings = SimulatorSettings { delay: Duration::from_millis(300), ..Default::default() };
    let harness = Harness::new(settings, composite("counted", components));

    let (task, receiver) = harness.service.submit(harness.request());
    let mut state = task.send(GetCompositionState).await.unwrap();
    while state.sub_stage != CompositionStage::Distributing {
        assert!(!state.stage.is_terminal(), "composition ended early in {:?}", state.sub_stage);
        tokio::time::sleep(Duration::from_millis(5)).await;
        state = task.send(GetCompositionState).await.unwrap();
    }
    assert_eq!(state.remaining_count, 3);

    let request_id = state.address.self_id().to_string();
    let report = |name: &str, sub_stage: CompositionStage, failure: Option<&str>| {
        let referer = TaskAddress::sub_task(&request_id, name);
        let response = match failure {
            Some(failure) => CallbackResponse::failed(referer, name, failure),
            None => CallbackResponse::finished(referer, name, Vec::new()),
        };
        StagePatch { transition: StageTransition::started(sub_stage), response }
    };

    // A provisioning report during allocation belongs to another phase.
    task.send(report("a", CompositionStage::Provisioning, None)).await.unwrap();
    task.send(report("a", CompositionStage::Allocating, None)).await.unwrap();
    task.send(report("a", CompositionStage::Allocating, None)).await.unwrap();
    task.send(report("b", CompositionStage::ErrorAllocating, Some("boom"))).await.unwrap();
    task.send(report("b", CompositionStage::ErrorAllocating, Some("boom"))).await.unwrap();

    let state = task.send(GetCompositionState).await.unwrap();
    assert_eq!(state.remaining_count, 1);
    assert_eq!(state.error_count, 1);
    assert_eq!(state.counted.len(), 2);

    // The real reports of a and b are duplicates now, only c still counts.
    assert!(receiver.await.unwrap().is_failure());
    let state = task.send(GetCompositionState).await.unwrap();
    assert_eq!(state.stage, TaskStage::Failed);
    assert_eq!(state.remaining_count, 0);
    assert_eq!(state.error_count, 1);
    assert!(state.failure_summary().contains("b: boom"), "{}", state.failure_summary());
}

#[actix_rt::test]
async fn test_failed_dependency_fails_its_dependents() {
    let harness = Harness::new(failing_allocation_of(&["backend"]), web_stack());

    let outcome = harness.service.compose(harness.request()).await.unwrap();

    let CompositionOutcome::Failed { failure, cleanup, .. } = outcome else {
        panic!("composition should fail");
    };
    assert!(failure.contains("Provisioning of [backend] failed"), "{}", failure);
    assert!(failure.contains("Dependency ["), "{}", failure);
    assert_eq!(cleanup, Some(CleanupOutcome::Removed));

    let allocated = harness.allocated();
    assert!(!allocated.contains(&"db".to_string()));
    assert!(!allocated.contains(&"web".to_string()));
}

#[actix_rt::test]
async fn test_provisioning_failure_stops_dependents_and_cleans_up() {
    let a = component("a", ResourceType::Container);
    let b = component("b", ResourceType::Container).depending_on(["a"]);
    let settings = SimulatorSettings { fail_provisioning: ["a".to_string()].into_iter().collect(), ..Default::default() };
    let harness = Harness::new(settings, composite("pair", vec![a, b]));

    let (task, receiver) = harness.service.submit(harness.request());
    assert!(receiver.await.unwrap().is_failure());
    let state = task.send(GetCompositionState).await.unwrap();

    assert_eq!(state.error_count, 2);
    assert_eq!(harness.allocated().len(), 2);
    assert_eq!(harness.provisioned(), vec!["a".to_string()]);
    assert_eq!(harness.removed_link_count(), 2);
    assert_eq!(state.cleanup, Some(CleanupOutcome::Removed));
    assert!(state.failure_summary().contains("Provisioning of [a] failed"));
}

#[actix_rt::test]
async fn test_unsupported_resource_type_fails_the_node() {
    let harness = Harness::new(SimulatorSettings::default(), composite("lb", vec![component("front", ResourceType::LoadBalancer)]));

    let outcome = harness.service.compose(harness.request()).await.unwrap();

    match outcome {
        CompositionOutcome::Failed { failure, cleanup, resource_links, .. } => {
            assert!(failure.contains("Unsupported resource type [load-balancer]"), "{}", failure);
            assert!(resource_links.is_empty());
            assert_eq!(cleanup, Some(CleanupOutcome::Removed));
        }
        other => panic!("composition should fail: {:?}", other),
    }
    assert!(harness.calls().is_empty());
}

#[actix_rt::test]
async fn test_cycle_fails_before_any_node_task_exists() {
    let a = component("a", ResourceType::Container).depending_on(["b"]);
    let b = component("b", ResourceType::Container).depending_on(["a"]);
    let harness = Harness::new(SimulatorSettings::default(), composite("cycle", vec![a, b]));

    let (task, receiver) = harness.service.submit(harness.request());
    assert!(receiver.await.unwrap().is_failure());
    let state = task.send(GetCompositionState).await.unwrap();

    assert!(state.resource_nodes.is_empty());
    assert!(state.failure_summary().contains("Cyclic dependency"), "{}", state.failure_summary());
    assert!(harness.calls().is_empty());
    assert!(harness.service.context().directory.is_empty());
}

#[actix_rt::test]
async fn test_unresolved_dependency_fails_the_request() {
    let a = component("a", ResourceType::Container).depending_on(["missing"]);
    let harness = Harness::new(SimulatorSettings::default(), composite("dangling", vec![a]));

    let outcome = harness.service.compose(harness.request()).await.unwrap();

    match outcome {
        CompositionOutcome::Failed { failure, .. } => assert!(failure.contains("[missing]"), "{}", failure),
        other => panic!("composition should fail: {:?}", other),
    }
}

#[actix_rt::test]
async fn test_dependency_timeout_fails_the_waiting_node() {
    let a = component("a", ResourceType::Container);
    let b = component("b", ResourceType::Container).depending_on(["a"]);
    let settings = SimulatorSettings { delay: Duration::from_millis(300), ..Default::default() };
    let node_settings = NodeTaskSettings { dependency_timeout: Some(Duration::from_millis(50)) };
    let harness = Harness::with_node_settings(settings, composite("slow", vec![a, b]), node_settings);

    let outcome = harness.service.compose(harness.request()).await.unwrap();

    match outcome {
        CompositionOutcome::Failed { failure, cleanup, .. } => {
            assert!(failure.contains("Timed out waiting for dependencies"), "{}", failure);
            assert_eq!(cleanup, Some(CleanupOutcome::Removed));
        }
        other => panic!("composition should fail: {:?}", other),
    }
    assert_eq!(harness.allocated(), vec!["a".to_string()]);
}

#[actix_rt::test]
async fn test_missing_description_fails_without_cleanup() {
    let harness = Harness::new(SimulatorSettings::default(), composite("known", vec![component("a", ResourceType::Container)]));
    let mut request = harness.request();
    request.description_link = composition_orchestrator::domain::utils::id::DescriptionLink::new("/resources/composite-descriptions/unknown");

    let outcome = harness.service.compose(request).await.unwrap();

    match outcome {
        CompositionOutcome::Failed { failure, composite_link, cleanup, .. } => {
            assert!(failure.contains("Failure retrieving composite description"), "{}", failure);
            assert!(composite_link.is_none());
            assert!(cleanup.is_none());
        }
        other => panic!("composition should fail: {:?}", other),
    }
}

#[derive(Default)]
struct RecordingTracker {
    updates: Mutex<Vec<RequestProgress>>,
}

#[async_trait]
impl RequestTracker for RecordingTracker {
    async fn update_components(&self, progress: RequestProgress) -> composition_orchestrator::error::Result<()> {
        self.updates.lock().unwrap().push(progress);
        Ok(())
    }
}

#[actix_rt::test]
async fn test_tracker_receives_components_with_levels() {
    let tracker = Arc::new(RecordingTracker::default());
    let recorder = tracker.clone();
    let harness = Harness::with_context(SimulatorSettings::default(), web_stack(), move |context| context.with_tracker(recorder));
    let mut request = harness.request();
    request.tracker_link = Some(TrackerLink::new("/request-status/web-stack"));

    assert!(harness.service.compose(request).await.unwrap().is_completed());

    let updates = tracker.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].tracker_link, TrackerLink::new("/request-status/web-stack"));
    let level_of = |name: &str| updates[0].components.iter().find(|c| c.name == name).map(|c| c.level);
    assert_eq!(level_of("backend"), Some(1));
    assert_eq!(level_of("db-data"), Some(1));
    assert_eq!(level_of("db"), Some(2));
    assert_eq!(level_of("web"), Some(3));
}
