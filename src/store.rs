//! Store - a live document mirrored to one file.
//!
//! The store holds the document, tracks dirtiness, and schedules flushes.
//! Mutations go through the accessor surface; persistence happens on the
//! store's own schedule (write-through or debounced), never inline with
//! reads.

use crate::codec::{Codec, CodecOptions, Format};
use crate::error::{Error, Result};
use crate::fs::FileSystem;
use crate::options::StoreOptions;
use crate::Document;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

/// Where this store's flushes run.
#[derive(Debug)]
pub(crate) enum Driver {
    /// Flushes run on the mutating thread (write-through) or a dedicated
    /// timer thread (debounced).
    Blocking,
    /// Flushes are dispatched onto this runtime's blocking pool.
    Tokio(Handle),
}

/// What a flush call needs on disk before it can skip the write.
#[derive(Debug, Clone, Copy)]
enum FlushTarget {
    /// Explicit flush: always write.
    Forced,
    /// Timer or drain flush: write only while the store is dirty.
    Dirty,
    /// Write-through flush: write unless this generation is already on disk.
    Reach(u64),
}

#[derive(Debug)]
struct State {
    document: Document,
    /// Set on every mutation; cleared only by a flush that captured the
    /// latest generation.
    dirty: bool,
    generation: u64,
    /// Highest generation a successful flush has written.
    flushed_generation: u64,
    /// One background flush per store; mutations landing during a flush
    /// re-mark dirty instead of dispatching a second one.
    flush_in_flight: bool,
}

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    codec: Arc<dyn Codec>,
    fs: Arc<dyn FileSystem>,
    options: StoreOptions,
    codec_options: CodecOptions,
    driver: Driver,
    state: Mutex<State>,
    /// Serializes disk writes so they land in generation order.
    flush_gate: Mutex<()>,
}

/// Handle to a live document mirrored to one file.
///
/// Handles are cheap clones over shared state and can be used from any
/// thread. There is no close operation; a store lives until process exit
/// and [`flush_all`](crate::flush_all) covers whatever is still dirty.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    pub(crate) fn new(
        path: PathBuf,
        document: Document,
        codec: Arc<dyn Codec>,
        fs: Arc<dyn FileSystem>,
        options: StoreOptions,
        driver: Driver,
    ) -> Self {
        let codec_options = options.codec_options();
        let inner = Arc::new(Inner {
            path,
            codec,
            fs,
            codec_options,
            driver,
            state: Mutex::new(State {
                document,
                dirty: false,
                generation: 0,
                flushed_generation: 0,
                flush_in_flight: false,
            }),
            flush_gate: Mutex::new(()),
            options,
        });

        let interval = inner.options.flush_interval();
        if !interval.is_zero() {
            match &inner.driver {
                Driver::Blocking => {
                    let weak = Arc::downgrade(&inner);
                    thread::spawn(move || run_blocking_timer(weak, interval));
                }
                Driver::Tokio(handle) => {
                    handle.spawn(run_interval_flush(Arc::downgrade(&inner), interval));
                }
            }
        }

        Self { inner }
    }

    /// The file this store mirrors to. After a fallback load this is the
    /// fallback path, not the requested one.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// The format this store serializes with.
    pub fn format(&self) -> Format {
        self.inner.codec.format()
    }

    /// Whether the store has mutations the file does not.
    pub fn is_dirty(&self) -> bool {
        self.inner.lock_state().dirty
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock_state().document.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock_state().document.contains_key(key)
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.inner.lock_state().document.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock_state().document.is_empty()
    }

    /// Top-level keys, in document order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock_state().document.keys().cloned().collect()
    }

    /// A copy of the whole document.
    pub fn snapshot(&self) -> Document {
        self.inner.lock_state().document.clone()
    }

    /// Set a key. On a write-through store this persists before returning
    /// (blocking driver) or dispatches a flush (tokio driver); on a
    /// debounced store it marks the store dirty for the next timer tick.
    pub fn set(&self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        self.mutate(move |document| {
            document.insert(key, value);
        })
    }

    /// Remove a key, returning its previous value. Flush policy applies as
    /// with [`Store::set`].
    pub fn remove(&self, key: &str) -> Result<Option<Value>> {
        let mut removed = None;
        self.mutate(|document| removed = document.remove(key))?;
        Ok(removed)
    }

    /// Apply a compound mutation under one flush trigger.
    pub fn update(&self, apply: impl FnOnce(&mut Document)) -> Result<()> {
        self.mutate(apply)
    }

    /// Write the current document now, regardless of the dirty flag.
    pub fn flush_sync(&self) -> Result<()> {
        self.inner.flush(FlushTarget::Forced)
    }

    /// Async form of [`Store::flush_sync`]; the write runs on the blocking
    /// pool so the caller's task never blocks on disk.
    pub async fn flush(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        match tokio::task::spawn_blocking(move || inner.flush(FlushTarget::Forced)).await {
            Ok(result) => result,
            Err(join_error) => Err(Error::Write {
                path: self.inner.path.clone(),
                source: io::Error::other(join_error),
            }),
        }
    }

    fn mutate(&self, apply: impl FnOnce(&mut Document)) -> Result<()> {
        let generation = {
            let mut state = self.inner.lock_state();
            apply(&mut state.document);
            state.generation += 1;
            state.dirty = true;
            state.generation
        };

        if !self.inner.options.is_write_through() {
            return Ok(());
        }

        match &self.inner.driver {
            Driver::Blocking => self.inner.flush(FlushTarget::Reach(generation)),
            Driver::Tokio(handle) => {
                if self.inner.claim_flush_slot() {
                    let inner = Arc::clone(&self.inner);
                    handle.spawn_blocking(move || drain_flush_queue(inner));
                }
                Ok(())
            }
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize the current document and replace the file.
    ///
    /// The target decides whether the write can be skipped: an explicit
    /// flush never skips, a policy flush skips when the store is clean or
    /// when the triggering generation is already covered by the watermark.
    /// The dirty flag is re-derived from the watermark after the write, so
    /// it clears only if this flush captured the latest generation.
    fn flush(&self, target: FlushTarget) -> Result<()> {
        let _gate = self
            .flush_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (generation, value) = {
            let state = self.lock_state();
            let covered = match target {
                FlushTarget::Forced => false,
                FlushTarget::Dirty => !state.dirty,
                FlushTarget::Reach(needed) => state.flushed_generation >= needed,
            };
            if covered {
                return Ok(());
            }
            (state.generation, Value::Object(state.document.clone()))
        };

        let bytes = self.codec.encode_sync(&value, &self.codec_options)?;
        self.fs
            .write_sync(&self.path, &bytes)
            .map_err(|source| Error::Write {
                path: self.path.clone(),
                source,
            })?;

        let mut state = self.lock_state();
        if generation > state.flushed_generation {
            state.flushed_generation = generation;
        }
        state.dirty = state.generation > state.flushed_generation;
        debug!(path = %self.path.display(), generation, "flushed document");
        Ok(())
    }

    fn claim_flush_slot(&self) -> bool {
        let mut state = self.lock_state();
        if state.flush_in_flight {
            false
        } else {
            state.flush_in_flight = true;
            true
        }
    }

    fn report_flush_error(&self, err: &Error) {
        error!(
            path = %self.path.display(),
            error = %err,
            "background flush failed; store stays dirty until the next trigger"
        );
        if let Some(handler) = &self.options.on_flush_error {
            handler(err);
        }
    }
}

/// Background flusher for tokio write-through stores. Runs flushes until the
/// store is clean, then releases the single-flight slot.
fn drain_flush_queue(inner: Arc<Inner>) {
    loop {
        if let Err(err) = inner.flush(FlushTarget::Dirty) {
            inner.report_flush_error(&err);
            inner.lock_state().flush_in_flight = false;
            return;
        }
        let mut state = inner.lock_state();
        if !state.dirty {
            state.flush_in_flight = false;
            return;
        }
        // a mutation landed mid-write; go around once more with the latest
        // state
    }
}

/// Timer loop for debounced stores on a tokio runtime.
async fn run_interval_flush(weak: Weak<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately; the debounce starts one period in
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else { return };
        if !inner.lock_state().dirty {
            continue;
        }
        let flush = tokio::task::spawn_blocking(move || {
            if let Err(err) = inner.flush(FlushTarget::Dirty) {
                inner.report_flush_error(&err);
            }
        });
        let _ = flush.await;
    }
}

/// Timer loop for debounced stores without a runtime.
fn run_blocking_timer(weak: Weak<Inner>, period: Duration) {
    loop {
        thread::sleep(period);
        let Some(inner) = weak.upgrade() else { return };
        if !inner.lock_state().dirty {
            continue;
        }
        if let Err(err) = inner.flush(FlushTarget::Dirty) {
            inner.report_flush_error(&err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::fs::MemoryFileSystem;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn blocking_store(options: StoreOptions) -> (Store, Arc<MemoryFileSystem>) {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = Store::new(
            PathBuf::from("state.json"),
            Document::new(),
            Arc::new(JsonCodec),
            fs.clone(),
            options,
            Driver::Blocking,
        );
        (store, fs)
    }

    fn tokio_store(options: StoreOptions) -> (Store, Arc<MemoryFileSystem>) {
        let fs = Arc::new(MemoryFileSystem::new());
        let store = Store::new(
            PathBuf::from("state.json"),
            Document::new(),
            Arc::new(JsonCodec),
            fs.clone(),
            options,
            Driver::Tokio(Handle::current()),
        );
        (store, fs)
    }

    fn on_file(fs: &MemoryFileSystem) -> Value {
        serde_json::from_slice(&fs.contents("state.json").unwrap()).unwrap()
    }

    async fn wait_for_writes(fs: &MemoryFileSystem, writes: u64) {
        for _ in 0..300 {
            if fs.write_count() >= writes {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {writes} write(s)");
    }

    #[test]
    fn accessor_surface() {
        let (store, _fs) = blocking_store(StoreOptions::default());

        assert!(store.is_empty());
        store.set("name", json!("mirror")).unwrap();
        store.set("count", json!(3)).unwrap();

        assert_eq!(store.get("name"), Some(json!("mirror")));
        assert!(store.contains_key("count"));
        assert_eq!(store.len(), 2);
        // Documents keep insertion order, the way the mirrored formats do.
        assert_eq!(store.keys(), vec!["name", "count"]);

        let removed = store.remove("count").unwrap();
        assert_eq!(removed, Some(json!(3)));
        assert_eq!(store.remove("count").unwrap(), None);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.get("name"), Some(&json!("mirror")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn write_through_persists_every_mutation() {
        let (store, fs) = blocking_store(StoreOptions::new().write_through());

        store.set("a", json!(1)).unwrap();
        assert_eq!(fs.write_count(), 1);
        assert_eq!(on_file(&fs), json!({"a": 1}));
        assert!(!store.is_dirty());

        store.set("b", json!(2)).unwrap();
        assert_eq!(fs.write_count(), 2);
        assert_eq!(on_file(&fs), json!({"a": 1, "b": 2}));

        store.remove("a").unwrap();
        assert_eq!(fs.write_count(), 3);
        assert_eq!(on_file(&fs), json!({"b": 2}));
    }

    #[test]
    fn update_is_one_flush() {
        let (store, fs) = blocking_store(StoreOptions::new().write_through());

        store
            .update(|document| {
                document.insert("a".into(), json!(1));
                document.insert("b".into(), json!(2));
            })
            .unwrap();

        assert_eq!(fs.write_count(), 1);
        assert_eq!(on_file(&fs), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn clean_store_skips_policy_flushes() {
        let (store, fs) = blocking_store(StoreOptions::new().write_through());

        store.set("a", json!(1)).unwrap();
        assert_eq!(fs.write_count(), 1);

        // Policy flush on a clean store is a no-op; an explicit flush is not.
        store.inner.flush(FlushTarget::Dirty).unwrap();
        assert_eq!(fs.write_count(), 1);
        store.flush_sync().unwrap();
        assert_eq!(fs.write_count(), 2);
    }

    #[test]
    fn flush_skips_when_target_generation_already_on_disk() {
        let (store, fs) =
            blocking_store(StoreOptions::new().with_flush_interval(Duration::from_secs(3600)));

        store.set("a", json!(1)).unwrap();
        store.set("b", json!(2)).unwrap();

        // A flush for the first mutation captures the latest state anyway.
        store.inner.flush(FlushTarget::Reach(1)).unwrap();
        assert_eq!(fs.write_count(), 1);
        assert_eq!(on_file(&fs), json!({"a": 1, "b": 2}));
        assert!(!store.is_dirty());

        // Both generations are on disk now, so their flushes have nothing
        // left to write.
        store.inner.flush(FlushTarget::Reach(1)).unwrap();
        store.inner.flush(FlushTarget::Reach(2)).unwrap();
        assert_eq!(fs.write_count(), 1);
    }

    #[test]
    fn debounced_mutations_only_mark_dirty() {
        let (store, fs) =
            blocking_store(StoreOptions::new().with_flush_interval(Duration::from_secs(3600)));

        store.set("a", json!(1)).unwrap();
        store.set("b", json!(2)).unwrap();

        assert!(store.is_dirty());
        assert_eq!(fs.write_count(), 0);

        store.flush_sync().unwrap();
        assert!(!store.is_dirty());
        assert_eq!(on_file(&fs), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn blocking_timer_coalesces_and_keeps_tracking() {
        let (store, fs) =
            blocking_store(StoreOptions::new().with_flush_interval(Duration::from_millis(100)));

        for i in 0..5 {
            store.set("n", json!(i)).unwrap();
        }
        assert_eq!(fs.write_count(), 0);

        thread::sleep(Duration::from_millis(350));
        assert_eq!(fs.write_count(), 1);
        assert_eq!(on_file(&fs), json!({"n": 4}));
        assert!(!store.is_dirty());

        // Dirty tracking still works after the first successful flush.
        store.set("n", json!(5)).unwrap();
        thread::sleep(Duration::from_millis(300));
        assert_eq!(fs.write_count(), 2);
        assert_eq!(on_file(&fs), json!({"n": 5}));
    }

    #[test]
    fn write_through_failure_returns_to_caller() {
        let (store, fs) = blocking_store(StoreOptions::new().write_through());
        fs.fail_writes(true);

        let result = store.set("a", json!(1));
        assert!(matches!(result, Err(Error::Write { .. })));
        assert!(store.is_dirty());
        assert_eq!(fs.write_count(), 0);

        // The mutation itself survived; the next successful flush carries it.
        fs.fail_writes(false);
        store.set("b", json!(2)).unwrap();
        assert_eq!(on_file(&fs), json!({"a": 1, "b": 2}));
        assert!(!store.is_dirty());
    }

    #[test]
    fn timer_failure_reports_and_retries_next_tick() {
        let failures = Arc::new(AtomicUsize::new(0));
        let seen = failures.clone();
        let (store, fs) = blocking_store(
            StoreOptions::new()
                .with_flush_interval(Duration::from_millis(50))
                .with_flush_error_handler(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        );
        fs.fail_writes(true);

        store.set("a", json!(1)).unwrap();
        thread::sleep(Duration::from_millis(200));

        assert!(failures.load(Ordering::SeqCst) >= 1);
        assert!(store.is_dirty());
        assert_eq!(fs.write_count(), 0);

        // Next tick picks the state up once writes work again.
        fs.fail_writes(false);
        thread::sleep(Duration::from_millis(200));
        assert!(!store.is_dirty());
        assert_eq!(on_file(&fs), json!({"a": 1}));
    }

    #[test]
    fn generation_watermark_keeps_dirty_across_raced_mutation() {
        let (store, _fs) = blocking_store(StoreOptions::default());
        store.set("a", json!(1)).unwrap();

        // Simulate a flush that captured generation 1 finishing after a
        // second mutation landed.
        let captured = store.inner.lock_state().generation;
        store.set("b", json!(2)).unwrap();

        let mut state = store.inner.lock_state();
        if captured > state.flushed_generation {
            state.flushed_generation = captured;
        }
        state.dirty = state.generation > state.flushed_generation;
        drop(state);

        assert!(store.is_dirty(), "newer mutation must keep the store dirty");
    }

    #[tokio::test]
    async fn tokio_write_through_dispatches_immediately() {
        let (store, fs) = tokio_store(StoreOptions::new().write_through());

        store.set("a", json!(1)).unwrap();
        wait_for_writes(&fs, 1).await;
        assert_eq!(on_file(&fs), json!({"a": 1}));
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn tokio_write_through_burst_converges_to_latest() {
        let (store, fs) = tokio_store(StoreOptions::new().write_through());

        for i in 0..10 {
            store.set("n", json!(i)).unwrap();
        }

        // The file does not exist until the dispatched flush lands.
        wait_for_writes(&fs, 1).await;
        for _ in 0..300 {
            if on_file(&fs) == json!({"n": 9}) && !store.is_dirty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(on_file(&fs), json!({"n": 9}));
        assert!(fs.write_count() <= 10);
    }

    #[tokio::test]
    async fn tokio_interval_flushes_dirty_state() {
        let (store, fs) =
            tokio_store(StoreOptions::new().with_flush_interval(Duration::from_millis(100)));

        for i in 0..5 {
            store.set("n", json!(i)).unwrap();
        }
        assert_eq!(fs.write_count(), 0);

        wait_for_writes(&fs, 1).await;
        assert_eq!(on_file(&fs), json!({"n": 4}));
    }

    #[tokio::test]
    async fn async_flush_writes_current_state() {
        let (store, fs) =
            tokio_store(StoreOptions::new().with_flush_interval(Duration::from_secs(3600)));

        store.set("a", json!(1)).unwrap();
        store.flush().await.unwrap();

        assert_eq!(fs.write_count(), 1);
        assert_eq!(on_file(&fs), json!({"a": 1}));
        assert!(!store.is_dirty());
    }
}
