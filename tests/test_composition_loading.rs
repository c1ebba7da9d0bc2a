use composition_orchestrator::domain::orchestration::coordinator::CompositionOutcome;
use composition_orchestrator::domain::orchestration::service::CompositionService;
use composition_orchestrator::domain::simulator::SimulatedInfrastructure;
use composition_orchestrator::error::Error;
use composition_orchestrator::load_composition;
use composition_orchestrator::loader::parser::parse_composition_str;

fn demo_path() -> String {
    format!("{}/demos/wordpress.json", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn test_demo_file_loads() {
    let scenario = load_composition(&demo_path()).expect("demo composition should load");

    assert_eq!(scenario.description.name, "wordpress");
    assert_eq!(scenario.description.components.len(), 5);
    assert_eq!(scenario.request.description_link, scenario.description.link);
    assert_eq!(scenario.simulator.delay.as_millis(), 20);

    let mysql = scenario.description.components.iter().find(|c| c.name == "mysql").unwrap();
    assert_eq!(mysql.volumes, vec!["wp-data:/var/lib/mysql".to_string()]);
    assert!(mysql.bindings.contains_key("MYSQL_ROOT_PASSWORD"));
}

#[test]
fn test_missing_components_is_a_deserialization_error() {
    let result = parse_composition_str(r#"{ "composite": { "name": "empty" } }"#);
    assert!(matches!(result, Err(Error::DeserializationError(_))));
}

#[actix_rt::test]
async fn test_demo_composition_runs_end_to_end() {
    let scenario = load_composition(&demo_path()).unwrap();
    let infrastructure = SimulatedInfrastructure::new(scenario.simulator.clone());
    infrastructure.descriptions.insert(scenario.description.clone());
    let service = CompositionService::new(infrastructure.context());

    let outcome = service.compose(scenario.request.clone()).await.unwrap();

    match outcome {
        CompositionOutcome::Completed { resource_links, .. } => assert_eq!(resource_links.len(), 5),
        other => panic!("demo composition failed: {:?}", other),
    }
}
