//! Shutdown flush tests
//!
//! `flush_all` walks every store the process has opened, so these tests get
//! their own binary. They tolerate each other's stores showing up in the
//! registry by asserting on file contents and per-path failures, never on
//! global write counts.

use mirrorfile::{flush_all, read_sync, Error, MemoryFileSystem, StoreOptions};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn seeded(path: &str) -> (Arc<MemoryFileSystem>, StoreOptions) {
    let fs = Arc::new(MemoryFileSystem::new());
    fs.insert(path, b"{}".to_vec());
    // An interval long enough that only flush_all can write.
    let options = StoreOptions::new()
        .with_filesystem(fs.clone())
        .with_flush_interval(Duration::from_secs(3600));
    (fs, options)
}

fn json_on_file(fs: &MemoryFileSystem, path: &str) -> Value {
    serde_json::from_slice(&fs.contents(path).unwrap()).unwrap()
}

#[test]
fn flush_all_writes_pending_debounced_state() {
    let (fs, options) = seeded("shutdown-pending.json");

    let store = read_sync("shutdown-pending.json", options).unwrap();
    store.set("session", json!("final")).unwrap();
    store.set("count", json!(3)).unwrap();
    assert!(store.is_dirty());

    // Another test's failing store may turn the aggregate into an error;
    // this store must be written either way.
    let _ = flush_all();

    assert_eq!(
        json_on_file(&fs, "shutdown-pending.json"),
        json!({"session": "final", "count": 3})
    );
    assert!(!store.is_dirty());
}

#[test]
fn flush_all_attempts_every_store_and_aggregates_failures() {
    let (healthy_fs, healthy_options) = seeded("shutdown-healthy.json");
    let (failing_fs, failing_options) = seeded("shutdown-failing.json");

    let healthy = read_sync("shutdown-healthy.json", healthy_options).unwrap();
    let failing = read_sync("shutdown-failing.json", failing_options).unwrap();
    healthy.set("kept", json!(true)).unwrap();

    // Break the failing store's writes before dirtying it, so no concurrent
    // flush can sneak the state out in between.
    failing_fs.fail_writes(true);
    failing.set("lost", json!(false)).unwrap();

    let err = flush_all().unwrap_err();
    let failures = match err {
        Error::FlushAll { failures } => failures,
        other => panic!("expected an aggregate flush error, got {other:?}"),
    };
    assert!(failures
        .iter()
        .any(|(path, _)| path == Path::new("shutdown-failing.json")));
    assert!(failures
        .iter()
        .all(|(path, _)| path != Path::new("shutdown-healthy.json")));

    // The healthy store was still flushed, the failing one keeps its state.
    assert_eq!(
        json_on_file(&healthy_fs, "shutdown-healthy.json"),
        json!({"kept": true})
    );
    assert!(failing.is_dirty());
    assert_eq!(failing.get("lost"), Some(json!(false)));
}
