//! Zlib compression wrapper around an inner codec.
//!
//! Compression is a codec like any other: it delegates serialization to the
//! codec resolved from the rest of the file name, then deflates the result.
//! `state.json.gz` is a zlib wrapper around the JSON codec.

use crate::codec::{Codec, CodecOptions, Format};
use crate::error::{Error, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};
use std::sync::Arc;

/// Deflates the inner codec's output on encode and inflates file bytes
/// before handing them to the inner codec on decode.
#[derive(Debug, Clone)]
pub struct ZlibCodec {
    inner: Arc<dyn Codec>,
}

impl ZlibCodec {
    /// Wrap an inner codec.
    pub fn new(inner: Arc<dyn Codec>) -> Self {
        Self { inner }
    }

    /// The codec the compressed payload is serialized with.
    pub fn inner(&self) -> &Arc<dyn Codec> {
        &self.inner
    }
}

impl Codec for ZlibCodec {
    fn format(&self) -> Format {
        Format::Zlib
    }

    fn encode_sync(&self, value: &Value, options: &CodecOptions) -> Result<Vec<u8>> {
        let plain = self.inner.encode_sync(value, options)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&plain).map_err(|e| Error::Encode {
            format: Format::Zlib,
            message: e.to_string(),
        })?;
        encoder.finish().map_err(|e| Error::Encode {
            format: Format::Zlib,
            message: e.to_string(),
        })
    }

    fn decode_sync(&self, bytes: &[u8], options: &CodecOptions) -> Result<Value> {
        let mut decoder = ZlibDecoder::new(bytes);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).map_err(|e| Error::Decode {
            format: Format::Zlib,
            message: e.to_string(),
        })?;
        self.inner.decode_sync(&plain, options)
    }
}
