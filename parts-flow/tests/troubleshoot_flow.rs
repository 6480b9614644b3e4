use parts_flow::{
    ApplianceType, FlowEngine, FlowError, FlowState, FlowStore, InMemoryFlowSessionStorage,
    InMemoryFlowStore, Intent, Progress, SessionKey, TroubleshootRunner, extract,
};
use std::sync::Arc;

const CUSTOM_FLOW: &str = r#"
flows:
  - flow_id: dishwasher_noisy
    appliance_type: dishwasher
    symptom_key: noisy
    steps:
      - step_number: 1
        question: Does the noise happen while the dishwasher drains?
        options:
          - { label: "Yes", value: "yes" }
          - { label: "No", value: "no" }
        transitions:
          "yes":
            terminal:
              causes:
                - cause: Worn drain pump
                  confidence: 0.7
                  parts: [ps11756150]
          "no":
            terminal:
              causes:
                - cause: Spray arm hitting a dish
                  confidence: 0.5
"#;

fn runner_with(store: InMemoryFlowStore) -> TroubleshootRunner {
    TroubleshootRunner::new(
        Arc::new(FlowEngine::new(Arc::new(store))),
        Arc::new(InMemoryFlowSessionStorage::new()),
    )
}

#[tokio::test]
async fn ice_maker_water_supply_terminal() {
    let runner = runner_with(InMemoryFlowStore::builtin().unwrap());
    let key = SessionKey::generate();

    let step = runner
        .start(&key, ApplianceType::Refrigerator, "not_making_ice")
        .await
        .unwrap();
    assert_eq!(step.step_number, 1);
    assert_eq!(step.question, "Is water reaching the ice maker?");

    let Progress::Complete(outcome) = runner
        .answer(&key, &step.flow_id, 1, "no")
        .await
        .unwrap()
    else {
        panic!("expected the water filter recommendation");
    };
    assert_eq!(outcome.total_steps, 1);
    assert_eq!(outcome.causes.len(), 1);
    assert_eq!(outcome.causes[0].parts, vec!["PS11701542".to_string()]);
}

#[tokio::test]
async fn invalid_answer_is_recoverable_and_repeatable() {
    let runner = runner_with(InMemoryFlowStore::builtin().unwrap());
    let key = SessionKey::generate();
    let step = runner
        .start(&key, ApplianceType::Dishwasher, "not_draining")
        .await
        .unwrap();

    for _ in 0..2 {
        let err = runner
            .answer(&key, &step.flow_id, step.step_number, "purple")
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, FlowError::InvalidAnswer { .. }));
    }
    assert_eq!(runner.current(&key).await.unwrap(), Some(step));
}

#[tokio::test]
async fn exit_is_idempotent() {
    let runner = runner_with(InMemoryFlowStore::builtin().unwrap());
    let key = SessionKey::generate();

    assert!(!runner.exit(&key).await.unwrap());
    runner
        .start(&key, ApplianceType::Refrigerator, "leaking")
        .await
        .unwrap();
    assert!(runner.exit(&key).await.unwrap());
    assert!(!runner.exit(&key).await.unwrap());
    assert_eq!(runner.state(&key).await.unwrap(), FlowState::AwaitingStart);
}

#[tokio::test]
async fn flows_load_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("noisy.yaml"), CUSTOM_FLOW).unwrap();
    std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

    let store = InMemoryFlowStore::from_dir(dir.path()).unwrap();
    assert_eq!(store.len(), 1);
    assert!(store.find(ApplianceType::Dishwasher, "noisy").is_some());

    let extraction = extract("my dishwasher is really noisy");
    assert_eq!(extraction.intent, Intent::Troubleshoot);
    let symptom = extraction.entities.symptom.unwrap();

    let runner = runner_with(store);
    let key = SessionKey::generate();
    let step = runner
        .start(&key, ApplianceType::Dishwasher, symptom.key())
        .await
        .unwrap();
    let Progress::Complete(outcome) = runner
        .answer(&key, &step.flow_id, step.step_number, "Yes")
        .await
        .unwrap()
    else {
        panic!("single step flow should complete");
    };
    assert_eq!(outcome.parts(), vec!["PS11756150".to_string()]);
}

#[tokio::test]
async fn overlay_replaces_builtin_flow() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("generic.yml"),
        CUSTOM_FLOW
            .replace("dishwasher_noisy", "dishwasher_generic_local")
            .replace("symptom_key: noisy", "symptom_key: generic"),
    )
    .unwrap();

    let mut store = InMemoryFlowStore::builtin().unwrap();
    let builtin_count = store.len();
    assert_eq!(store.overlay_dir(dir.path()).unwrap(), 1);
    assert_eq!(store.len(), builtin_count);
    assert_eq!(
        store
            .find(ApplianceType::Dishwasher, "generic")
            .unwrap()
            .id(),
        "dishwasher_generic_local"
    );
}

#[test]
fn malformed_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("broken.json"),
        r#"{"flow_id": "x", "appliance_type": "dishwasher", "symptom_key": "x", "steps": []}"#,
    )
    .unwrap();

    assert!(matches!(
        InMemoryFlowStore::from_dir(dir.path()),
        Err(FlowError::InvalidDefinition { .. })
    ));
}
