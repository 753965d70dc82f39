//! Error types for mirrorfile stores.

use crate::codec::Format;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// All possible errors from a mirrored store.
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // Codec errors
    #[error("{format} decode failed: {message}")]
    Decode { format: Format, message: String },

    #[error("{format} encode failed: {message}")]
    Encode { format: Format, message: String },

    #[error("codec backend not compiled in: {format}")]
    UnsupportedCodec { format: Format },

    #[error("unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    // Shutdown errors
    #[error("final flush failed for {} store(s)", failures.len())]
    FlushAll { failures: Vec<(PathBuf, Error)> },
}

impl Error {
    /// Whether this is a read error for a file that does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Read { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
