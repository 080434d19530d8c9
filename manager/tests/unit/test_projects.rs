//! File-backed project store tests

use runtime_manager::errors::RuntimeError;
use runtime_manager::filesys::dir::Dir;
use runtime_manager::storage::projects::{
    FileProjectStore, ProjectStore, DEV_SERVICES_FILE, PROJECT_COMPOSE_FILE, PROJECT_FILE,
};

const PROJECT_COMPOSE: &str = r#"
services:
  sidecar:
    image: busybox
  orders:
    container_name: orders
    image: registry/orders:1.2.0
    ports:
      - "8080:8080"
"#;

async fn store() -> (Dir, FileProjectStore) {
    let dir = Dir::create_temp_dir("projects").await.unwrap();
    (dir.clone(), FileProjectStore::new(dir))
}

#[tokio::test]
async fn test_reads_dev_service_template() {
    let (dir, store) = store().await;
    dir.subdir("orders")
        .file(DEV_SERVICES_FILE)
        .write_string("services: {}\n")
        .await
        .unwrap();

    assert_eq!(
        store.dev_service_template("orders").await.unwrap().as_deref(),
        Some("services: {}\n")
    );
    assert!(store.dev_service_template("billing").await.unwrap().is_none());
    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_project_service_prefers_matching_name() {
    let (dir, store) = store().await;
    dir.subdir("orders")
        .file(PROJECT_COMPOSE_FILE)
        .write_string(PROJECT_COMPOSE)
        .await
        .unwrap();

    let spec = store.project_compose_service("orders").await.unwrap().unwrap();
    assert_eq!(spec.container_name, "orders");
    assert_eq!(spec.image, "registry/orders:1.2.0");

    dir.subdir("billing")
        .file(PROJECT_COMPOSE_FILE)
        .write_string("services:\n  app:\n    image: registry/billing:1\n")
        .await
        .unwrap();
    let spec = store.project_compose_service("billing").await.unwrap().unwrap();
    assert_eq!(spec.container_name, "app");
    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_project_metadata() {
    let (dir, store) = store().await;
    dir.subdir("orders")
        .file(PROJECT_FILE)
        .write_string(r#"{"projectId":"ignored","name":"Orders","runtime":"quarkus"}"#)
        .await
        .unwrap();
    dir.subdir("billing").create().await.unwrap();

    let orders = store.project("orders").await.unwrap().unwrap();
    assert_eq!(orders.project_id, "orders");
    assert_eq!(orders.runtime, "quarkus");

    let billing = store.project("billing").await.unwrap().unwrap();
    assert_eq!(billing.runtime, "camel-main");

    assert!(store.project("missing").await.unwrap().is_none());

    let mut ids = store.project_ids().await.unwrap();
    ids.sort();
    assert_eq!(ids, vec!["billing".to_string(), "orders".to_string()]);
    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_rejects_escaping_project_ids() {
    let (dir, store) = store().await;
    assert!(matches!(
        store.dev_service_template("../etc").await,
        Err(RuntimeError::ValidationError(_))
    ));
    dir.delete().await.unwrap();
}
