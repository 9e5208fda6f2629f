//! Hashing primitives for bookledger
//!
//! Blocks are hashed over a canonical JSON encoding: object keys in sorted
//! order, `", "` and `": "` separators, and every character outside printable
//! ASCII escaped as `\uXXXX`. This is the byte layout of Python's
//! `json.dumps(obj, sort_keys=True)`, so nodes written against that format
//! agree on every digest.

use crate::error::ChainError;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io;

/// Lower-case hex SHA-256 digest, 64 characters.
pub type HexDigest = String;

/// `serde_json` formatter with Python's default separators and ASCII-only
/// string output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PyFormatter;

impl Formatter for PyFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    // Quotes, backslashes and C0 controls arrive through `write_char_escape`;
    // fragments only need DEL and non-ASCII escaped.
    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() && c != '\u{7f}' {
                continue;
            }
            writer.write_all(&bytes[start..i])?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(&bytes[start..])
    }
}

/// Serializes a `Value` with object keys in sorted order whatever map
/// implementation `serde_json` was built with.
struct SortedKeys<'a>(&'a Value);

impl Serialize for SortedKeys<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&SortedKeys(item))?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &SortedKeys(value))?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

/// Canonical JSON text of `item`.
pub fn canonical_json<T: Serialize + ?Sized>(item: &T) -> Result<String, ChainError> {
    let value = serde_json::to_value(item)?;
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, PyFormatter);
    SortedKeys(&value).serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| ChainError::SerializationError(e.to_string()))
}

/// SHA-256 over raw bytes, hex encoded.
pub fn sha256_hex(bytes: &[u8]) -> HexDigest {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of the canonical encoding of `item`.
pub fn hash<T: Serialize + ?Sized>(item: &T) -> Result<HexDigest, ChainError> {
    Ok(sha256_hex(canonical_json(item)?.as_bytes()))
}
