//! Serialized record format.
//!
//! A stored record is one tag byte followed by the JSON-serialized
//! [`Event`], compressed according to the tag:
//!
//! | Tag | Body |
//! |-----|------|
//! | `0` | plain JSON |
//! | `1` | gzip-compressed JSON |
//! | `2` | LZ4-compressed JSON (size-prepended block) |
//!
//! Decoding always honors the tag, so records written under one
//! compression setting stay readable after the setting changes.

use simtrace_types::Event;

use crate::config::Compression;
use crate::error::StoreError;

const TAG_NONE: u8 = 0;
const TAG_GZIP: u8 = 1;
const TAG_LZ4: u8 = 2;

/// Encodes events for storage and decodes stored records.
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    compression: Compression,
}

impl PayloadCodec {
    /// Build a codec for the requested compression.
    ///
    /// If the requested codec was not compiled in, the codec degrades to
    /// uncompressed storage and logs a warning once, here.
    pub fn new(requested: Compression) -> Self {
        let compression = if codec_available(requested) {
            requested
        } else {
            tracing::warn!(
                requested = ?requested,
                "compression codec unavailable, storing payloads uncompressed"
            );
            Compression::None
        };
        Self { compression }
    }

    /// The compression actually applied on encode.
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// Serialize and compress an event.
    ///
    /// A compression failure falls back to an uncompressed record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the event cannot be
    /// serialized.
    pub fn encode(&self, event: &Event) -> Result<Vec<u8>, StoreError> {
        let json = serde_json::to_vec(event)?;
        let compressed = match self.compression {
            Compression::None => None,
            Compression::Gzip => Some((TAG_GZIP, gzip_compress(&json))),
            Compression::Lz4 => Some((TAG_LZ4, lz4_compress(&json))),
        };
        match compressed {
            Some((tag, Ok(body))) => Ok(framed(tag, &body)),
            Some((_, Err(e))) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    error = %e,
                    "compression failed, storing payload uncompressed"
                );
                Ok(framed(TAG_NONE, &json))
            }
            None => Ok(framed(TAG_NONE, &json)),
        }
    }

    /// Decompress and deserialize a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] for an empty record, an unknown tag, a
    /// corrupt body, or a codec that is not compiled in. Returns
    /// [`StoreError::Serialization`] if the JSON is not a valid event.
    pub fn decode(record: &[u8]) -> Result<Event, StoreError> {
        let (tag, body) = record
            .split_first()
            .ok_or_else(|| StoreError::Codec("empty record".to_owned()))?;
        let event = match *tag {
            TAG_NONE => serde_json::from_slice(body)?,
            TAG_GZIP => serde_json::from_slice(&gzip_decompress(body)?)?,
            TAG_LZ4 => serde_json::from_slice(&lz4_decompress(body)?)?,
            other => return Err(StoreError::Codec(format!("unknown record tag {other}"))),
        };
        Ok(event)
    }
}

fn framed(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len().saturating_add(1));
    out.push(tag);
    out.extend_from_slice(body);
    out
}

const fn codec_available(compression: Compression) -> bool {
    match compression {
        Compression::None => true,
        Compression::Gzip => cfg!(feature = "gzip"),
        Compression::Lz4 => cfg!(feature = "lz4"),
    }
}

#[cfg(feature = "gzip")]
fn gzip_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    use std::io::Write;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| StoreError::Codec(format!("gzip encode: {e}")))?;
    encoder
        .finish()
        .map_err(|e| StoreError::Codec(format!("gzip encode: {e}")))
}

#[cfg(feature = "gzip")]
fn gzip_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    use std::io::Read;

    let mut out = Vec::new();
    flate2::read::GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| StoreError::Codec(format!("gzip decode: {e}")))?;
    Ok(out)
}

#[cfg(not(feature = "gzip"))]
fn gzip_compress(_data: &[u8]) -> Result<Vec<u8>, StoreError> {
    Err(StoreError::Codec("gzip support not compiled in".to_owned()))
}

#[cfg(not(feature = "gzip"))]
fn gzip_decompress(_data: &[u8]) -> Result<Vec<u8>, StoreError> {
    Err(StoreError::Codec("gzip support not compiled in".to_owned()))
}

#[cfg(feature = "lz4")]
#[allow(clippy::unnecessary_wraps)]
fn lz4_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    Ok(lz4_flex::compress_prepend_size(data))
}

#[cfg(feature = "lz4")]
fn lz4_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| StoreError::Codec(format!("lz4 decode: {e}")))
}

#[cfg(not(feature = "lz4"))]
fn lz4_compress(_data: &[u8]) -> Result<Vec<u8>, StoreError> {
    Err(StoreError::Codec("lz4 support not compiled in".to_owned()))
}

#[cfg(not(feature = "lz4"))]
fn lz4_decompress(_data: &[u8]) -> Result<Vec<u8>, StoreError> {
    Err(StoreError::Codec("lz4 support not compiled in".to_owned()))
}
