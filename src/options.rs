//! Store construction options.

use crate::codec::{Codec, CodecOptions, TextEncoding};
use crate::error::Error;
use crate::fs::FileSystem;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How long mutations may sit in memory before the flush timer writes them.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

/// Handler for flush failures that have no caller to return to.
pub type FlushErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Options for opening a store. All fields are optional; the defaults give
/// a UTF-8 store debounced at [`DEFAULT_FLUSH_INTERVAL`] on the real
/// filesystem, with the codec resolved from the file extension.
///
/// Options are immutable once the store is created.
#[derive(Clone)]
pub struct StoreOptions {
    pub(crate) flush_interval: Duration,
    pub(crate) encoding: TextEncoding,
    pub(crate) pretty_indent: Option<usize>,
    pub(crate) filesystem: Option<Arc<dyn FileSystem>>,
    pub(crate) codec: Option<Arc<dyn Codec>>,
    pub(crate) on_flush_error: Option<FlushErrorHandler>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            encoding: TextEncoding::default(),
            pretty_indent: None,
            filesystem: None,
            codec: None,
            on_flush_error: None,
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the debounce interval. [`Duration::ZERO`] means write-through:
    /// every mutation flushes immediately.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Flush on every mutation instead of on a timer.
    pub fn write_through(self) -> Self {
        self.with_flush_interval(Duration::ZERO)
    }

    /// Set the text encoding for text formats.
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Indent JSON output with the given width instead of compact output.
    pub fn with_pretty_indent(mut self, width: usize) -> Self {
        self.pretty_indent = Some(width);
        self
    }

    /// Read and write through the given filesystem instead of the OS one.
    pub fn with_filesystem(mut self, filesystem: Arc<dyn FileSystem>) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    /// Use this codec outright, bypassing extension resolution.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Install a handler for flush failures that have no caller. The store
    /// stays dirty after such a failure, so the next trigger retries.
    pub fn with_flush_error_handler(
        mut self,
        handler: impl Fn(&Error) + Send + Sync + 'static,
    ) -> Self {
        self.on_flush_error = Some(Arc::new(handler));
        self
    }

    /// The debounce interval this store will flush at.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Whether mutations flush immediately.
    pub fn is_write_through(&self) -> bool {
        self.flush_interval.is_zero()
    }

    pub(crate) fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            pretty_indent: self.pretty_indent,
            encoding: self.encoding,
        }
    }
}

impl fmt::Debug for StoreOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("flush_interval", &self.flush_interval)
            .field("encoding", &self.encoding)
            .field("pretty_indent", &self.pretty_indent)
            .field("filesystem", &self.filesystem)
            .field("codec", &self.codec.as_ref().map(|codec| codec.format()))
            .field("on_flush_error", &self.on_flush_error.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::fs::MemoryFileSystem;

    #[test]
    fn defaults() {
        let options = StoreOptions::default();
        assert_eq!(options.flush_interval(), DEFAULT_FLUSH_INTERVAL);
        assert!(!options.is_write_through());
        assert_eq!(options.codec_options().pretty_indent, None);
        assert_eq!(options.codec_options().encoding, TextEncoding::Utf8);
    }

    #[test]
    fn builders() {
        let options = StoreOptions::new()
            .write_through()
            .with_pretty_indent(2)
            .with_filesystem(Arc::new(MemoryFileSystem::new()))
            .with_codec(Arc::new(JsonCodec))
            .with_flush_error_handler(|_| {});

        assert!(options.is_write_through());
        assert_eq!(options.codec_options().pretty_indent, Some(2));
        assert!(options.filesystem.is_some());
        assert!(options.codec.is_some());
        assert!(options.on_flush_error.is_some());
    }

    #[test]
    fn debug_stays_opaque_over_callbacks() {
        let options = StoreOptions::new().with_flush_error_handler(|_| {});
        let rendered = format!("{options:?}");
        assert!(rendered.contains("on_flush_error: true"));
    }
}
