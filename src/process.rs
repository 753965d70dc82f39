//! Process-wide store registry and the shutdown flush.
//!
//! Every loaded store is tracked here so [`flush_all`] can push pending
//! state to disk before the process exits. Debounced stores are the reason
//! this exists: their latest mutations may still be waiting on the timer.

use crate::error::{Error, Result};
use crate::store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, error};

static STORES: OnceLock<Mutex<HashMap<PathBuf, Store>>> = OnceLock::new();

fn stores() -> MutexGuard<'static, HashMap<PathBuf, Store>> {
    STORES
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Track a store for the shutdown flush. Re-opening a path replaces the
/// earlier entry; the last registered store owns the path.
pub(crate) fn register(store: &Store) {
    stores().insert(store.path().to_path_buf(), store.clone());
}

/// Paths of every store this process has loaded.
pub fn registered_paths() -> Vec<PathBuf> {
    stores().keys().cloned().collect()
}

/// Flush every registered store, synchronously and unconditionally.
///
/// Call this once at shutdown. Every store is attempted even when one
/// fails; the failures come back aggregated per path. A clean store still
/// writes, so the files on disk are current afterwards no matter what the
/// timers were doing.
pub fn flush_all() -> Result<()> {
    let all: Vec<Store> = stores().values().cloned().collect();
    debug!(stores = all.len(), "flushing every registered store");

    let mut failures = Vec::new();
    for store in all {
        if let Err(err) = store.flush_sync() {
            error!(path = %store.path().display(), error = %err, "final flush failed");
            failures.push((store.path().to_path_buf(), err));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::FlushAll { failures })
    }
}
