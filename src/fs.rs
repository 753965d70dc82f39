//! Filesystem access behind a capability trait.
//!
//! Stores never touch `std::fs` directly; they go through a [`FileSystem`]
//! so hosts can point a store at an in-memory filesystem, a fixture, or an
//! instrumented wrapper. [`OsFileSystem`] is the default.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Whole-file reads and writes, in blocking and async form.
///
/// Invariants:
/// - `read` of a missing file fails with [`io::ErrorKind::NotFound`]
/// - `write` replaces the whole file; partial content is never left behind
///   by a successful call
/// - implementations are shared across threads as `Arc<dyn FileSystem>`
#[async_trait]
pub trait FileSystem: fmt::Debug + Send + Sync {
    /// Read the entire file at `path`.
    fn read_sync(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Replace the entire file at `path`.
    fn write_sync(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Async read. Defaults to the blocking form.
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.read_sync(path)
    }

    /// Async write. Defaults to the blocking form.
    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.write_sync(path, bytes)
    }
}

/// The real filesystem: `std::fs` for blocking calls, `tokio::fs` for async.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFileSystem;

#[async_trait]
impl FileSystem for OsFileSystem {
    fn read_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_sync(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        std::fs::write(path, bytes)
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, bytes).await
    }
}

/// In-memory filesystem for tests and ephemeral embedding.
///
/// Counts successful writes and can be switched into a failing mode, which
/// makes flush behavior observable without touching a disk.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    writes: AtomicU64,
    failing: AtomicBool,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file.
    pub fn insert(&self, path: impl AsRef<Path>, bytes: Vec<u8>) {
        self.lock_files().insert(path.as_ref().to_path_buf(), bytes);
    }

    /// Current contents of a file, if present.
    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock_files().get(path.as_ref()).cloned()
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail until switched back.
    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn lock_files(&self) -> MutexGuard<'_, HashMap<PathBuf, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileSystem for MemoryFileSystem {
    fn read_sync(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lock_files().get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no entry for {}", path.display()),
            )
        })
    }

    fn write_sync(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "writes are switched off",
            ));
        }
        self.lock_files().insert(path.to_path_buf(), bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
