//! Codecs - serialization of the live document to and from file bytes.
//!
//! A [`Codec`] turns a full document into one self-contained byte blob and
//! back. Codecs are stateless and shared as `Arc<dyn Codec>`; the sync forms
//! are the required surface, the async forms default to them because encoding
//! a config-sized document is CPU-bound.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Identifies a serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Yaml,
    Bson,
    MessagePack,
    Etf,
    Zlib,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Bson => "bson",
            Format::MessagePack => "messagepack",
            Format::Etf => "etf",
            Format::Zlib => "zlib",
        };
        f.write_str(name)
    }
}

/// Text encoding for text formats.
///
/// UTF-8 is the only shipped variant; [`TextEncoding::from_label`] is the
/// fallible entry point for encodings configured from user-facing strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    #[default]
    Utf8,
}

impl TextEncoding {
    /// Parse an encoding label such as `"utf8"`.
    pub fn from_label(label: &str) -> Result<Self> {
        match label.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            other => Err(Error::UnsupportedEncoding(other.to_string())),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("utf-8"),
        }
    }
}

/// Per-store knobs passed into every encode/decode call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodecOptions {
    /// Indentation width for text output. `None` emits compact output.
    pub pretty_indent: Option<usize>,
    /// Text encoding for text formats.
    pub encoding: TextEncoding,
}

/// Serializes documents to bytes and back.
///
/// Invariants:
/// - `decode_sync(encode_sync(v))` round-trips any JSON document
/// - implementations are stateless; one instance serves every store
/// - errors carry the format tag and a rendered message, never panic
#[async_trait]
pub trait Codec: fmt::Debug + Send + Sync {
    /// The format this codec implements.
    fn format(&self) -> Format;

    /// Encode a document into one self-contained byte blob.
    fn encode_sync(&self, value: &Value, options: &CodecOptions) -> Result<Vec<u8>>;

    /// Decode a byte blob back into a document.
    fn decode_sync(&self, bytes: &[u8], options: &CodecOptions) -> Result<Value>;

    /// Async encode. Defaults to the sync form.
    async fn encode(&self, value: &Value, options: &CodecOptions) -> Result<Vec<u8>> {
        self.encode_sync(value, options)
    }

    /// Async decode. Defaults to the sync form.
    async fn decode(&self, bytes: &[u8], options: &CodecOptions) -> Result<Value> {
        self.decode_sync(bytes, options)
    }
}

fn encode_err(format: Format, err: impl fmt::Display) -> Error {
    Error::Encode {
        format,
        message: err.to_string(),
    }
}

fn decode_err(format: Format, err: impl fmt::Display) -> Error {
    Error::Decode {
        format,
        message: err.to_string(),
    }
}

/// JSON codec. The default for unknown file extensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn format(&self) -> Format {
        Format::Json
    }

    fn encode_sync(&self, value: &Value, options: &CodecOptions) -> Result<Vec<u8>> {
        match options.pretty_indent {
            None => serde_json::to_vec(value).map_err(|e| encode_err(Format::Json, e)),
            Some(width) => {
                let indent = " ".repeat(width);
                let mut bytes = Vec::new();
                let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
                let mut ser = serde_json::Serializer::with_formatter(&mut bytes, formatter);
                value
                    .serialize(&mut ser)
                    .map_err(|e| encode_err(Format::Json, e))?;
                Ok(bytes)
            }
        }
    }

    fn decode_sync(&self, bytes: &[u8], _options: &CodecOptions) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| decode_err(Format::Json, e))
    }
}

/// YAML codec. The emitter always writes block style, so `pretty_indent`
/// has no effect here.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn format(&self) -> Format {
        Format::Yaml
    }

    fn encode_sync(&self, value: &Value, _options: &CodecOptions) -> Result<Vec<u8>> {
        serde_yaml::to_string(value)
            .map(String::into_bytes)
            .map_err(|e| encode_err(Format::Yaml, e))
    }

    fn decode_sync(&self, bytes: &[u8], _options: &CodecOptions) -> Result<Value> {
        serde_yaml::from_slice(bytes).map_err(|e| decode_err(Format::Yaml, e))
    }
}

/// BSON codec. The top level must be a mapping; BSON has no other
/// root type.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonCodec;

impl Codec for BsonCodec {
    fn format(&self) -> Format {
        Format::Bson
    }

    fn encode_sync(&self, value: &Value, _options: &CodecOptions) -> Result<Vec<u8>> {
        bson::to_vec(value).map_err(|e| encode_err(Format::Bson, e))
    }

    fn decode_sync(&self, bytes: &[u8], _options: &CodecOptions) -> Result<Value> {
        bson::from_slice(bytes).map_err(|e| decode_err(Format::Bson, e))
    }
}

/// MessagePack codec. Maps are written with string keys so documents stay
/// readable by other MessagePack implementations.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackCodec;

impl Codec for MessagePackCodec {
    fn format(&self) -> Format {
        Format::MessagePack
    }

    fn encode_sync(&self, value: &Value, _options: &CodecOptions) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(value).map_err(|e| encode_err(Format::MessagePack, e))
    }

    fn decode_sync(&self, bytes: &[u8], _options: &CodecOptions) -> Result<Value> {
        rmp_serde::from_slice(bytes).map_err(|e| decode_err(Format::MessagePack, e))
    }
}
