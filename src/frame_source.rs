//! Frame Source Resolver
//!
//! Turns a file path or a hexadecimal string into an owned frame buffer.

use crate::error::{HarnessError, Result};
use crate::types::FrameSource;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Owned bytes of exactly one transfer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Fresh mutable copy for operations that may transform their input
    pub fn working_copy(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }
}

/// Resolve any frame source into a buffer
pub fn resolve(source: &FrameSource) -> Result<FrameBuffer> {
    let buffer = match source {
        FrameSource::File(path) => load_file(path)?,
        FrameSource::Hex(text) => decode_hex(text)?,
        FrameSource::Bytes(bytes) => FrameBuffer::new(bytes.clone()),
    };
    debug!(
        source = %source.identifier(),
        len = buffer.len(),
        "resolved frame source"
    );
    Ok(buffer)
}

/// Read an entire binary file as one frame
pub fn load_file(path: &Path) -> Result<FrameBuffer> {
    let bytes = fs::read(path).map_err(|e| HarnessError::SourceUnavailable {
        source_id: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(FrameBuffer::new(bytes))
}

/// Decode two hex digits per byte, either case. Whitespace is not a hex
/// digit; positions in errors index into `text` as given.
pub fn decode_hex(text: &str) -> Result<FrameBuffer> {
    let bytes = hex::decode(text).map_err(|e| HarnessError::InvalidEncoding {
        reason: match e {
            hex::FromHexError::OddLength => {
                format!("odd number of hex digits ({})", text.len())
            }
            hex::FromHexError::InvalidHexCharacter { c, index } => {
                format!("non-hex character {:?} at position {}", c, index)
            }
            other => other.to_string(),
        },
    })?;
    Ok(FrameBuffer::new(bytes))
}
