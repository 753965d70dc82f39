//! Loading stores from files.
//!
//! [`read`] and [`read_sync`] are the only way to create a [`Store`]: read
//! the raw bytes (with one `.json` fallback for missing files), resolve the
//! codec from the final path, decode, and register the store for the
//! shutdown flush.

use crate::codec::{Codec, Format};
use crate::error::{Error, Result};
use crate::fs::{FileSystem, OsFileSystem};
use crate::options::StoreOptions;
use crate::process;
use crate::registry::CodecRegistry;
use crate::store::{Driver, Store};
use crate::Document;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Open the store mirrored to `path`.
///
/// The store runs on the current tokio runtime: timer flushes are a spawned
/// task and write-through flushes go to the blocking pool. If `path` does
/// not exist the loader retries once with `.json` appended to the whole
/// name; the store then mirrors to the fallback path.
pub async fn read(path: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
    let fs = chosen_filesystem(&options);
    let requested = path.as_ref().to_path_buf();

    let (path, bytes) = match fs.read(&requested).await {
        Ok(bytes) => (requested, bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let fallback = fallback_path(&requested);
            debug!(
                requested = %requested.display(),
                fallback = %fallback.display(),
                "file missing; trying the json fallback"
            );
            match fs.read(&fallback).await {
                Ok(bytes) => (fallback, bytes),
                Err(source) => {
                    return Err(Error::Read {
                        path: fallback,
                        source,
                    })
                }
            }
        }
        Err(source) => {
            return Err(Error::Read {
                path: requested,
                source,
            })
        }
    };

    let codec = resolve_codec(&path, &options);
    let codec_options = options.codec_options();
    let value = codec.decode(&bytes, &codec_options).await?;
    let document = into_document(value, codec.format())?;

    let store = Store::new(
        path,
        document,
        codec,
        fs,
        options,
        Driver::Tokio(Handle::current()),
    );
    process::register(&store);
    debug!(path = %store.path().display(), format = %store.format(), "store loaded");
    Ok(store)
}

/// Blocking form of [`read`]. The store it returns flushes on the mutating
/// thread (write-through) or a dedicated timer thread (debounced), so it
/// works without a runtime.
pub fn read_sync(path: impl AsRef<Path>, options: StoreOptions) -> Result<Store> {
    let fs = chosen_filesystem(&options);
    let requested = path.as_ref().to_path_buf();

    let (path, bytes) = match fs.read_sync(&requested) {
        Ok(bytes) => (requested, bytes),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let fallback = fallback_path(&requested);
            debug!(
                requested = %requested.display(),
                fallback = %fallback.display(),
                "file missing; trying the json fallback"
            );
            match fs.read_sync(&fallback) {
                Ok(bytes) => (fallback, bytes),
                Err(source) => {
                    return Err(Error::Read {
                        path: fallback,
                        source,
                    })
                }
            }
        }
        Err(source) => {
            return Err(Error::Read {
                path: requested,
                source,
            })
        }
    };

    let codec = resolve_codec(&path, &options);
    let codec_options = options.codec_options();
    let value = codec.decode_sync(&bytes, &codec_options)?;
    let document = into_document(value, codec.format())?;

    let store = Store::new(path, document, codec, fs, options, Driver::Blocking);
    process::register(&store);
    debug!(path = %store.path().display(), format = %store.format(), "store loaded");
    Ok(store)
}

fn chosen_filesystem(options: &StoreOptions) -> Arc<dyn FileSystem> {
    options
        .filesystem
        .clone()
        .unwrap_or_else(|| Arc::new(OsFileSystem))
}

fn resolve_codec(path: &Path, options: &StoreOptions) -> Arc<dyn Codec> {
    match &options.codec {
        Some(codec) => Arc::clone(codec),
        None => CodecRegistry::new().resolve(path),
    }
}

/// The fallback appends `.json` to the whole name: `data.yaml` falls back
/// to `data.yaml.json`, not `data.json`.
fn fallback_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

fn into_document(value: Value, format: Format) -> Result<Document> {
    match value {
        Value::Object(document) => Ok(document),
        // An empty file decodes to null in the formats that allow it; the
        // store starts empty.
        Value::Null => Ok(Document::new()),
        other => Err(Error::Decode {
            format,
            message: format!("expected a mapping at the top level, got {}", kind(&other)),
        }),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}
