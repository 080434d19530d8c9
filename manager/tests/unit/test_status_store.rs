//! Status store and event bus tests

use tokio::sync::broadcast::error::TryRecvError;

use runtime_manager::cache::events::{EventBus, StatusEvent};
use runtime_manager::cache::status::StatusStore;
use runtime_manager::models::status::{
    ContainerState, ContainerStatus, ContainerType, StatusFilter, StatusKey,
};

fn status(project_id: &str, env: &str, name: &str) -> ContainerStatus {
    ContainerStatus::new(project_id, env, name, ContainerType::Project)
}

#[test]
fn test_list_is_sorted_by_project_then_name() {
    let store = StatusStore::default();
    store.put(status("zeta", "dev", "a"));
    store.put(status("alpha", "dev", "web"));
    store.put(status("alpha", "dev", "db"));

    let names: Vec<(String, String)> = store
        .list(&StatusFilter::default())
        .into_iter()
        .map(|s| (s.project_id, s.container_name))
        .collect();
    assert_eq!(
        names,
        vec![
            ("alpha".to_string(), "db".to_string()),
            ("alpha".to_string(), "web".to_string()),
            ("zeta".to_string(), "a".to_string()),
        ]
    );
}

#[test]
fn test_list_filters_by_env_and_project() {
    let store = StatusStore::default();
    store.put(status("demo", "dev", "demo"));
    store.put(status("demo", "test", "demo"));
    store.put(status("other", "dev", "other"));

    let dev = store.list(&StatusFilter {
        env: Some("dev".to_string()),
        ..StatusFilter::default()
    });
    assert_eq!(dev.len(), 2);

    let demo_dev = store.list(&StatusFilter {
        project_id: Some("demo".to_string()),
        env: Some("dev".to_string()),
        ..StatusFilter::default()
    });
    assert_eq!(demo_dev.len(), 1);
    assert_eq!(demo_dev[0].env, "dev");

    assert!(store
        .list(&StatusFilter {
            env: Some("prod".to_string()),
            ..StatusFilter::default()
        })
        .is_empty());
}

#[test]
fn test_same_key_different_env_are_separate_records() {
    let store = StatusStore::default();
    store.put(status("demo", "dev", "demo"));
    store.put(status("demo", "test", "demo"));
    assert_eq!(store.len(), 2);
    assert!(store.get(&StatusKey::new("demo", "test", "demo")).is_some());
}

#[test]
fn test_publish_reaches_every_subscriber() {
    let store = StatusStore::default();
    let mut first = store.subscribe();
    let mut second = store.subscribe();

    store.publish(status("demo", "dev", "demo"));

    for rx in [&mut first, &mut second] {
        match rx.try_recv() {
            Ok(StatusEvent::Changed(s)) => assert_eq!(s.container_name, "demo"),
            other => panic!("expected a change event, got {:?}", other),
        }
    }
}

#[test]
fn test_publish_if_changed_skips_equal_records() {
    let store = StatusStore::default();
    let mut rx = store.subscribe();
    let mut record = status("demo", "dev", "demo");

    assert!(store.publish_if_changed(record.clone()));
    assert!(!store.publish_if_changed(record.clone()));

    record.state = Some(ContainerState::Running);
    assert!(store.publish_if_changed(record));

    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_ok());
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_remove_emits_removed_once() {
    let store = StatusStore::default();
    store.put(status("demo", "dev", "demo"));
    let mut rx = store.subscribe();
    let key = StatusKey::new("demo", "dev", "demo");

    assert!(store.remove(&key).is_some());
    assert!(store.remove(&key).is_none());

    match rx.try_recv() {
        Ok(StatusEvent::Removed(s)) => assert_eq!(s.key(), key),
        other => panic!("expected a removal event, got {:?}", other),
    }
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_slow_subscriber_lags_without_blocking_publisher() {
    let store = StatusStore::new(EventBus::new(2));
    let mut rx = store.subscribe();

    for i in 0..5 {
        store.publish(status("demo", "dev", &format!("c{}", i)));
    }

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Lagged(_))));
    assert!(rx.try_recv().is_ok());
    assert_eq!(store.len(), 5);
}
