//! Erlang external term format codec.
//!
//! The backend is optional: built with the `etf` cargo feature the codec
//! round-trips documents through external term format, built without it the
//! codec still resolves and registers but every encode/decode returns
//! [`Error::UnsupportedCodec`](crate::Error::UnsupportedCodec). Availability
//! is a compile-time property, so it never changes over a process lifetime.
//!
//! Mapping: objects become maps with binary keys, strings become UTF-8
//! binaries, booleans and null become the `true`/`false`/`nil` atoms.
//! Decoding also accepts atom keys and atom strings, so documents written
//! from the Erlang side stay readable.

use crate::codec::{Codec, CodecOptions, Format};
use crate::error::Result;
use serde_json::Value;

/// External term format codec. See the module docs for the value mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct TermCodec;

impl TermCodec {
    /// Whether the term format backend was compiled in.
    pub const fn available() -> bool {
        cfg!(feature = "etf")
    }
}

impl Codec for TermCodec {
    fn format(&self) -> Format {
        Format::Etf
    }

    fn encode_sync(&self, value: &Value, _options: &CodecOptions) -> Result<Vec<u8>> {
        imp::encode(value)
    }

    fn decode_sync(&self, bytes: &[u8], _options: &CodecOptions) -> Result<Value> {
        imp::decode(bytes)
    }
}

#[cfg(feature = "etf")]
mod imp {
    use crate::codec::Format;
    use crate::error::{Error, Result};
    use eetf::{Atom, BigInteger, Binary, FixInteger, Float, List, Map, Term};
    use serde_json::{Number, Value};
    use std::collections::HashMap;
    use std::io::Cursor;

    pub(super) fn encode(value: &Value) -> Result<Vec<u8>> {
        let term = to_term(value)?;
        let mut bytes = Vec::new();
        term.encode(&mut bytes).map_err(|e| Error::Encode {
            format: Format::Etf,
            message: e.to_string(),
        })?;
        Ok(bytes)
    }

    pub(super) fn decode(bytes: &[u8]) -> Result<Value> {
        let term = Term::decode(Cursor::new(bytes)).map_err(|e| Error::Decode {
            format: Format::Etf,
            message: e.to_string(),
        })?;
        from_term(&term)
    }

    fn encode_err(message: impl Into<String>) -> Error {
        Error::Encode {
            format: Format::Etf,
            message: message.into(),
        }
    }

    fn decode_err(message: impl Into<String>) -> Error {
        Error::Decode {
            format: Format::Etf,
            message: message.into(),
        }
    }

    fn to_term(value: &Value) -> Result<Term> {
        let term = match value {
            Value::Null => Term::from(Atom::from("nil")),
            Value::Bool(true) => Term::from(Atom::from("true")),
            Value::Bool(false) => Term::from(Atom::from("false")),
            Value::Number(number) => {
                if let Some(int) = number.as_i64() {
                    match i32::try_from(int) {
                        Ok(small) => Term::from(FixInteger::from(small)),
                        Err(_) => Term::from(BigInteger::from(int)),
                    }
                } else if let Some(float) = number.as_f64() {
                    Term::from(Float { value: float })
                } else {
                    return Err(encode_err(format!("integer out of range: {number}")));
                }
            }
            Value::String(text) => Term::from(Binary::from(text.clone().into_bytes())),
            Value::Array(items) => {
                let elements = items.iter().map(to_term).collect::<Result<Vec<_>>>()?;
                Term::from(List::from(elements))
            }
            Value::Object(document) => {
                let entries = document
                    .iter()
                    .map(|(key, val)| {
                        let key = Term::from(Binary::from(key.clone().into_bytes()));
                        Ok((key, to_term(val)?))
                    })
                    .collect::<Result<HashMap<Term, Term>>>()?;
                Term::from(Map::from(entries))
            }
        };
        Ok(term)
    }

    fn from_term(term: &Term) -> Result<Value> {
        let value = match term {
            Term::Atom(atom) => match atom.name.as_str() {
                "nil" | "null" | "undefined" => Value::Null,
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                other => Value::String(other.to_string()),
            },
            Term::FixInteger(int) => Value::from(int.value),
            Term::BigInteger(int) => {
                let int = i64::try_from(&int.value)
                    .map_err(|_| decode_err("integer outside the i64 range"))?;
                Value::from(int)
            }
            Term::Float(float) => Number::from_f64(float.value)
                .map(Value::Number)
                .ok_or_else(|| decode_err("non-finite float"))?,
            Term::Binary(binary) => {
                let text = String::from_utf8(binary.bytes.clone())
                    .map_err(|_| decode_err("binary is not valid utf-8"))?;
                Value::String(text)
            }
            Term::List(list) => {
                let items = list
                    .elements
                    .iter()
                    .map(from_term)
                    .collect::<Result<Vec<_>>>()?;
                Value::Array(items)
            }
            Term::Map(map) => {
                let mut document = serde_json::Map::new();
                for (key, val) in &map.map {
                    let key = match key {
                        Term::Atom(atom) => atom.name.clone(),
                        Term::Binary(binary) => String::from_utf8(binary.bytes.clone())
                            .map_err(|_| decode_err("map key is not valid utf-8"))?,
                        other => {
                            return Err(decode_err(format!("unsupported map key: {other}")))
                        }
                    };
                    document.insert(key, from_term(val)?);
                }
                Value::Object(document)
            }
            other => return Err(decode_err(format!("unsupported term: {other}"))),
        };
        Ok(value)
    }
}

#[cfg(not(feature = "etf"))]
mod imp {
    use crate::codec::Format;
    use crate::error::{Error, Result};
    use serde_json::Value;

    pub(super) fn encode(_value: &Value) -> Result<Vec<u8>> {
        Err(Error::UnsupportedCodec { format: Format::Etf })
    }

    pub(super) fn decode(_bytes: &[u8]) -> Result<Value> {
        Err(Error::UnsupportedCodec { format: Format::Etf })
    }
}
