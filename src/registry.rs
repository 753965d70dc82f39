//! Extension-based codec resolution.

use crate::codec::{BsonCodec, Codec, JsonCodec, MessagePackCodec, YamlCodec};
use crate::compress::ZlibCodec;
use crate::term::TermCodec;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

/// Resolves a file path to the codec that serializes it.
///
/// The extension table:
///
/// | extension | codec |
/// |---|---|
/// | `yaml`, `yml` | YAML |
/// | `bson` | BSON |
/// | `mp` | MessagePack |
/// | `etf` | external term format |
/// | `gz` | zlib wrapping the codec for the name minus `.gz` |
/// | anything else | JSON |
///
/// Resolution never fails. The term codec resolves even when its backend is
/// not compiled in; availability surfaces as an error on first use.
#[derive(Debug)]
pub struct CodecRegistry {
    json: Arc<dyn Codec>,
    yaml: Arc<dyn Codec>,
    bson: Arc<dyn Codec>,
    messagepack: Arc<dyn Codec>,
    term: Arc<dyn Codec>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            json: Arc::new(JsonCodec),
            yaml: Arc::new(YamlCodec),
            bson: Arc::new(BsonCodec),
            messagepack: Arc::new(MessagePackCodec),
            term: Arc::new(TermCodec),
        }
    }

    /// Whether `.etf` stores can actually encode and decode in this build.
    pub fn term_available(&self) -> bool {
        TermCodec::available()
    }

    /// The codec for `path`, by extension.
    pub fn resolve(&self, path: &Path) -> Arc<dyn Codec> {
        match path.extension().and_then(OsStr::to_str) {
            Some("yaml") | Some("yml") => Arc::clone(&self.yaml),
            Some("bson") => Arc::clone(&self.bson),
            Some("mp") => Arc::clone(&self.messagepack),
            Some("etf") => Arc::clone(&self.term),
            Some("gz") => Arc::new(ZlibCodec::new(self.resolve(&path.with_extension("")))),
            _ => Arc::clone(&self.json),
        }
    }
}
