//! # Mirrorfile
//!
//! Mutable documents transparently mirrored to files.
//!
//! A [`Store`] wraps one top-level mapping (string keys, JSON values) and
//! keeps one file in sync with it. Reads and mutations work on the
//! in-memory document; the flush policy decides when the file catches up.
//!
//! ## Design Principles
//!
//! - **One file per store**: a store mirrors exactly one path
//! - **Whole-file flushes**: a flush serializes the full document and replaces the file
//! - **Memory is the source of truth**: the file is never re-read after load
//! - **Mutations stay cheap**: in write-through mode on a runtime, flushes run
//!   off the caller's task; in debounced mode they wait for the timer
//!
//! ## Core Concepts
//!
//! ### Codecs
//!
//! The file format follows the extension: `.yaml`/`.yml`, `.bson`, `.mp`
//! (MessagePack), `.etf` (Erlang terms, behind the `etf` feature) and `.gz`
//! (zlib over whatever the inner extension says). Anything else is JSON.
//! [`StoreOptions::with_codec`] overrides the whole table.
//!
//! ### Flush policies
//!
//! A store is either **debounced** (default, a timer writes dirty state
//! every [`DEFAULT_FLUSH_INTERVAL`]) or **write-through**
//! ([`StoreOptions::write_through`], every mutation triggers a flush).
//! [`Store::flush`] and [`Store::flush_sync`] force a write at any time.
//!
//! ### Shutdown
//!
//! Every loaded store is registered process-wide. Call [`flush_all`] before
//! exiting so debounced stores do not lose their last interval of changes.
//!
//! ## Quick Start
//!
//! ```rust
//! use mirrorfile::{read_sync, MemoryFileSystem, StoreOptions};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! // The in-memory filesystem keeps the example self-contained; drop
//! // `with_filesystem` to mirror to the real disk.
//! let fs = Arc::new(MemoryFileSystem::new());
//! fs.insert("app.json", br#"{"launches": 1}"#.to_vec());
//!
//! // 1. Open the store (write-through: every mutation flushes)
//! let options = StoreOptions::new()
//!     .with_filesystem(fs.clone())
//!     .write_through();
//! let store = read_sync("app.json", options).unwrap();
//!
//! // 2. Read and mutate the document
//! assert_eq!(store.get("launches"), Some(json!(1)));
//! store.set("launches", json!(2)).unwrap();
//! store.set("theme", json!("dark")).unwrap();
//!
//! // 3. The file tracks every mutation
//! let bytes = fs.contents("app.json").unwrap();
//! let on_file: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
//! assert_eq!(on_file, json!({"launches": 2, "theme": "dark"}));
//! ```
//!
//! ## Async
//!
//! [`read`] and [`Store::flush`] are the async forms for code already on a
//! tokio runtime; encoding and file IO run on the blocking pool. The rest
//! of the store API is synchronous and lock-based, so a store can be shared
//! freely across tasks and threads.

pub mod codec;
pub mod compress;
pub mod error;
pub mod fs;
pub mod loader;
pub mod options;
pub mod process;
pub mod registry;
pub mod store;
pub mod term;

// Re-export main types at crate root
pub use codec::{
    BsonCodec, Codec, CodecOptions, Format, JsonCodec, MessagePackCodec, TextEncoding, YamlCodec,
};
pub use compress::ZlibCodec;
pub use error::{Error, Result};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use loader::{read, read_sync};
pub use options::{FlushErrorHandler, StoreOptions, DEFAULT_FLUSH_INTERVAL};
pub use process::{flush_all, registered_paths};
pub use registry::CodecRegistry;
pub use store::Store;
pub use term::TermCodec;

/// The in-memory shape of a store: one top-level mapping from string keys
/// to JSON values.
pub type Document = serde_json::Map<String, serde_json::Value>;
