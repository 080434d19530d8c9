//! Log session tests

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::timeout;

use runtime_manager::models::status::ContainerType;
use runtime_manager::sessions::manager::LogSessionManager;
use runtime_manager::sessions::registry::SessionKey;
use runtime_manager::sessions::sink::LogSink;

use crate::support::{eventually, FakeBackend};

const WAIT: Duration = Duration::from_secs(2);

fn manager(backend: Arc<FakeBackend>) -> LogSessionManager {
    LogSessionManager::new(backend, Handle::current())
}

#[tokio::test]
async fn test_lines_are_normalized() {
    let backend = Arc::new(FakeBackend::engine());
    backend.script_logs("engine-app", &["hello\n", "world\r\n"]);
    backend.script_logs("cluster-app", &["hello"]);
    let sessions = manager(backend.clone());

    let (sink, mut rx) = LogSink::channel(16);
    sessions.stream_log(ContainerType::Project, "engine-app", "alice", sink);
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap().as_deref(), Some("hello"));
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap().as_deref(), Some("world"));

    let (sink, mut rx) = LogSink::channel(16);
    sessions.stream_log(ContainerType::Project, "cluster-app", "alice", sink);
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap().as_deref(), Some("hello"));
}

#[tokio::test]
async fn test_second_session_closes_the_first() {
    let backend = Arc::new(FakeBackend::engine());
    backend.script_logs("demo", &["hello\n"]);
    let sessions = manager(backend.clone());

    let (first, mut first_rx) = LogSink::channel(16);
    let first_handle = first.handle();
    sessions.stream_log(ContainerType::Project, "demo", "alice", first);
    assert_eq!(timeout(WAIT, first_rx.recv()).await.unwrap().as_deref(), Some("hello"));

    let (second, mut second_rx) = LogSink::channel(16);
    let second_id = second.id();
    sessions.stream_log(ContainerType::Project, "demo", "alice", second);

    // closed before the second session forwarded anything
    assert!(first_handle.is_closed());
    assert_eq!(timeout(WAIT, second_rx.recv()).await.unwrap().as_deref(), Some("hello"));

    // the first receiver ends
    assert_eq!(timeout(WAIT, first_rx.recv()).await.unwrap(), None);

    let key = SessionKey::new(ContainerType::Project, "alice", "demo");
    assert_eq!(sessions.registry().active(&key), Some(second_id));
    assert_eq!(sessions.active_sessions(), 1);
}

#[tokio::test]
async fn test_other_viewers_are_independent() {
    let backend = Arc::new(FakeBackend::engine());
    backend.script_logs("demo", &["hello\n"]);
    let sessions = manager(backend.clone());

    let (alice, mut alice_rx) = LogSink::channel(16);
    let alice_handle = alice.handle();
    sessions.stream_log(ContainerType::Project, "demo", "alice", alice);
    let (bob, mut bob_rx) = LogSink::channel(16);
    sessions.stream_log(ContainerType::Project, "demo", "bob", bob);

    assert_eq!(timeout(WAIT, alice_rx.recv()).await.unwrap().as_deref(), Some("hello"));
    assert_eq!(timeout(WAIT, bob_rx.recv()).await.unwrap().as_deref(), Some("hello"));
    assert!(!alice_handle.is_closed());
    assert_eq!(sessions.active_sessions(), 2);
}

#[tokio::test]
async fn test_viewer_disconnect_releases_everything() {
    let backend = Arc::new(FakeBackend::engine());
    backend.script_logs("demo", &["hello\n"]);
    let sessions = manager(backend.clone());

    let (sink, mut rx) = LogSink::channel(16);
    let task = sessions.stream_log(ContainerType::Project, "demo", "alice", sink);
    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap().as_deref(), Some("hello"));
    assert_eq!(backend.open_logs(), 1);

    drop(rx);
    timeout(WAIT, task).await.unwrap().unwrap();

    assert_eq!(backend.open_logs(), 0);
    assert!(sessions.registry().is_empty());
}

#[tokio::test]
async fn test_backend_failure_ends_session_quietly() {
    let backend = Arc::new(FakeBackend::engine());
    backend.fail_logs_with("no such container");
    let sessions = manager(backend.clone());

    let (sink, mut rx) = LogSink::channel(16);
    sessions.stream_log(ContainerType::Service, "missing", "alice", sink);

    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);
    assert!(eventually(|| sessions.registry().is_empty()).await);
}

#[tokio::test]
async fn test_shutdown_closes_open_sessions() {
    let backend = Arc::new(FakeBackend::engine());
    backend.script_logs("demo", &[]);
    let sessions = manager(backend.clone());

    let (sink, mut rx) = LogSink::channel(16);
    sessions.stream_log(ContainerType::Project, "demo", "alice", sink);
    sessions.shutdown();

    assert_eq!(timeout(WAIT, rx.recv()).await.unwrap(), None);
    assert!(eventually(|| backend.open_logs() == 0).await);
}

#[tokio::test]
async fn test_multi_line_chunk_is_forwarded_line_by_line() {
    let backend = Arc::new(FakeBackend::engine());
    backend.script_logs("demo", &["first\nsecond\r\n", "third\n"]);
    let sessions = manager(backend.clone());

    let (sink, mut rx) = LogSink::channel(16);
    sessions.stream_log(ContainerType::Project, "demo", "alice", sink);

    for expected in ["first", "second", "third"] {
        assert_eq!(timeout(WAIT, rx.recv()).await.unwrap().as_deref(), Some(expected));
    }
}
