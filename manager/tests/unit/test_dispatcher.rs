//! Command dispatcher tests

use std::sync::Arc;

use tokio::sync::broadcast::error::TryRecvError;

use runtime_manager::cache::events::StatusEvent;
use runtime_manager::cache::status::StatusStore;
use runtime_manager::deploy::dispatcher::{CommandDispatcher, DispatchOutcome};
use runtime_manager::errors::RuntimeError;
use runtime_manager::models::command::{CommandEnvelope, ContainerCommand, PullPolicy};
use runtime_manager::models::project::Project;
use runtime_manager::models::status::{
    ContainerState, ContainerStatus, ContainerType, StatusFilter, StatusKey, LABEL_PROJECT_ID,
    LABEL_RUNTIME, LABEL_TYPE,
};
use runtime_manager::workers::reconciler::reconcile_once;

use crate::support::{service_spec, FakeBackend, MemoryProjectStore};

const DEV_SERVICES: &str = r#"
services:
  postgres:
    container_name: postgres
    image: postgres:16
    ports:
      - "5432:5432"
"#;

struct Fixture {
    backend: Arc<FakeBackend>,
    store: Arc<StatusStore>,
    dispatcher: CommandDispatcher,
}

fn fixture(backend: FakeBackend, projects: MemoryProjectStore) -> Fixture {
    let backend = Arc::new(backend);
    let store = Arc::new(StatusStore::default());
    backend.observe(store.clone());
    let dispatcher =
        CommandDispatcher::new(backend.clone(), store.clone(), Arc::new(projects), "dev");
    Fixture {
        backend,
        store,
        dispatcher,
    }
}

#[tokio::test]
async fn test_stop_unknown_container_creates_in_transit_record() {
    let f = fixture(FakeBackend::engine(), MemoryProjectStore::new());
    let envelope = CommandEnvelope::new("demo", ContainerType::Service, "postgres", ContainerCommand::Stop);

    let outcome = f.dispatcher.dispatch(envelope).await.unwrap();

    let calls = f.backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action, "stop");
    // the record was published before the backend saw the call
    assert_eq!(calls[0].in_transit, Some(true));

    let status = f.store.get(&StatusKey::new("demo", "dev", "postgres")).unwrap();
    assert_eq!(status.container_type, ContainerType::Service);
    assert!(status.in_transit);
    assert_eq!(status.state, None);
    assert_eq!(outcome, DispatchOutcome::Applied(status));
}

#[tokio::test]
async fn test_dispatch_publishes_exactly_once() {
    let f = fixture(FakeBackend::engine(), MemoryProjectStore::new());
    let mut rx = f.store.subscribe();

    f.dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Run))
        .await
        .unwrap();

    match rx.try_recv() {
        Ok(StatusEvent::Changed(status)) => assert!(status.in_transit),
        other => panic!("expected a change event, got {:?}", other),
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_existing_record_keeps_its_type() {
    let f = fixture(FakeBackend::engine(), MemoryProjectStore::new());
    let mut existing = ContainerStatus::new("demo", "dev", "demo", ContainerType::Project);
    existing.state = Some(ContainerState::Running);
    f.store.put(existing);

    f.dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Pause))
        .await
        .unwrap();

    let status = f.store.get(&StatusKey::new("demo", "dev", "demo")).unwrap();
    assert_eq!(status.container_type, ContainerType::Project);
    assert_eq!(status.state, Some(ContainerState::Running));
    assert!(status.in_transit);
}

#[tokio::test]
async fn test_invalid_combination_is_not_modified() {
    let f = fixture(FakeBackend::engine(), MemoryProjectStore::new());

    let outcome = f
        .dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Builder, "demo-build", ContainerCommand::Run))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::NotModified);
    assert!(f.backend.calls().is_empty());
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn test_deploy_without_template_is_a_no_op() {
    let f = fixture(FakeBackend::engine(), MemoryProjectStore::new());
    let envelope = CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Deploy)
        .with_pull_policy(PullPolicy::Never);

    let outcome = f.dispatcher.dispatch(envelope).await.unwrap();

    assert_eq!(outcome, DispatchOutcome::Skipped);
    assert!(f.backend.calls().is_empty());
}

#[tokio::test]
async fn test_deploy_service_from_dev_template() {
    let projects = MemoryProjectStore::new().with_template("demo", DEV_SERVICES);
    let f = fixture(FakeBackend::engine(), projects);
    let envelope = CommandEnvelope::new("demo", ContainerType::Service, "postgres", ContainerCommand::Deploy)
        .with_pull_policy(PullPolicy::Always);

    let outcome = f.dispatcher.dispatch(envelope).await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Applied(_)));

    let deployed = f.backend.deployed();
    assert_eq!(deployed.len(), 1);
    let (spec, labels, pull_policy) = &deployed[0];
    assert_eq!(spec.image, "postgres:16");
    assert_eq!(*pull_policy, PullPolicy::Always);
    assert_eq!(labels.get(LABEL_TYPE).map(String::as_str), Some("service"));
    assert_eq!(labels.get(LABEL_RUNTIME).map(String::as_str), Some("camel-main"));
    assert_eq!(labels.get(LABEL_PROJECT_ID).map(String::as_str), Some("demo"));
}

#[tokio::test]
async fn test_deploy_service_missing_from_template_is_a_no_op() {
    let projects = MemoryProjectStore::new().with_template("demo", DEV_SERVICES);
    let f = fixture(FakeBackend::engine(), projects);

    let outcome = f
        .dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Service, "kafka", ContainerCommand::Deploy))
        .await
        .unwrap();

    assert_eq!(outcome, DispatchOutcome::Skipped);
    assert!(f.backend.deployed().is_empty());
}

#[tokio::test]
async fn test_deploy_project_labels_carry_runtime() {
    let projects = MemoryProjectStore::new()
        .with_service("demo", service_spec("demo", "registry/demo:1"))
        .with_project(Project {
            project_id: "demo".to_string(),
            name: "Demo".to_string(),
            runtime: "quarkus".to_string(),
            last_commit: None,
        });
    let f = fixture(FakeBackend::engine(), projects);

    f.dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Deploy))
        .await
        .unwrap();

    let deployed = f.backend.deployed();
    assert_eq!(deployed[0].1.get(LABEL_RUNTIME).map(String::as_str), Some("quarkus"));
    assert_eq!(deployed[0].1.get(LABEL_TYPE).map(String::as_str), Some("project"));
}

#[tokio::test]
async fn test_backend_failure_is_composed_and_leaves_transit() {
    let backend = FakeBackend::engine();
    backend.fail_with("connection refused");
    let f = fixture(backend, MemoryProjectStore::new());

    let err = f
        .dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Stop))
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::CommandError { .. }));
    assert_eq!(
        err.to_string(),
        "Error while executing command stop on demo: connection refused"
    );
    let status = f.store.get(&StatusKey::new("demo", "dev", "demo")).unwrap();
    assert!(status.in_transit);
}

#[tokio::test]
async fn test_delete_removes_record_after_backend_success() {
    let f = fixture(FakeBackend::engine(), MemoryProjectStore::new());
    let mut rx = f.store.subscribe();

    f.dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Delete))
        .await
        .unwrap();

    assert!(f.store.get(&StatusKey::new("demo", "dev", "demo")).is_none());
    assert!(matches!(rx.try_recv(), Ok(StatusEvent::Changed(_))));
    assert!(matches!(rx.try_recv(), Ok(StatusEvent::Removed(_))));
}

#[tokio::test]
async fn test_failed_delete_keeps_record() {
    let backend = FakeBackend::engine();
    backend.fail_with("device busy");
    let f = fixture(backend, MemoryProjectStore::new());

    let result = f
        .dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Delete))
        .await;

    assert!(result.is_err());
    assert!(f.store.get(&StatusKey::new("demo", "dev", "demo")).is_some());
}

#[tokio::test]
async fn test_cluster_deploy_is_left_to_deployments() {
    let projects = MemoryProjectStore::new().with_service("demo", service_spec("demo", "registry/demo:1"));
    let f = fixture(FakeBackend::cluster(), projects);

    let outcome = f
        .dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo", ContainerCommand::Deploy))
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Applied(_)));
    assert!(f.backend.calls().is_empty());

    f.dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Project, "demo-7d9f", ContainerCommand::Delete))
        .await
        .unwrap();
    let calls = f.backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].action, "delete");
    assert_eq!(calls[0].name, "demo-7d9f");
}

#[tokio::test]
async fn test_deployed_container_takes_the_target_name() {
    let projects =
        MemoryProjectStore::new().with_service("billing", service_spec("app", "registry/billing:1"));
    let f = fixture(FakeBackend::engine(), projects);

    f.dispatcher
        .dispatch(CommandEnvelope::new("billing", ContainerType::Project, "billing", ContainerCommand::Deploy))
        .await
        .unwrap();

    let deployed = f.backend.deployed();
    assert_eq!(deployed.len(), 1);
    assert_eq!(deployed[0].0.container_name, "billing");
    assert_eq!(deployed[0].0.image, "registry/billing:1");

    // the backend now reports the container under the name it was created with
    let mut running = ContainerStatus::new("billing", "dev", "billing", ContainerType::Project);
    running.state = Some(ContainerState::Running);
    f.backend.set_observed(vec![running]);
    reconcile_once("dev", f.backend.as_ref(), &f.store).await.unwrap();

    let records = f.store.list(&StatusFilter::default());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].container_name, "billing");
    assert!(!records[0].in_transit);
    assert_eq!(records[0].state, Some(ContainerState::Running));
}

#[tokio::test]
async fn test_service_template_key_differs_from_container_name() {
    let template = "services:\n  db:\n    container_name: postgres-dev\n    image: postgres:16\n";
    let projects = MemoryProjectStore::new().with_template("demo", template);
    let f = fixture(FakeBackend::engine(), projects);

    let outcome = f
        .dispatcher
        .dispatch(CommandEnvelope::new("demo", ContainerType::Service, "db", ContainerCommand::Deploy))
        .await
        .unwrap();

    assert!(matches!(outcome, DispatchOutcome::Applied(_)));
    assert_eq!(f.backend.deployed()[0].0.container_name, "db");
}
