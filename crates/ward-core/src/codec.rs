//! Filename component codec.
//!
//! Packs an ordered list of byte strings into a single byte string suitable
//! for a filesystem name, before encryption. Within a component the byte
//! `0x00` is escaped as `0x00 0x4C`; components are joined by `0x00 0x53`.
//! Decoding consumes an exact component count and fails on anything
//! malformed.
//!
//! Two name shapes are built on top of the packing:
//! - object directory names: `[index_value_0, …, index_value_{k-1}, id]`
//! - revision file names: `[timestamp, revision_id]`
//!
//! Index values and timestamps travel as UTF-8; identifiers travel as their
//! raw 16 bytes to conserve filename length.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use crate::id::{IdError, ObjectId, RevisionId};
use crate::time::{TimeError, Timestamp};

/// Escape lead byte.
const ESCAPE: u8 = 0x00;
/// Escaped literal NUL: `0x00 0x4C` ("L").
const LITERAL_NUL: u8 = 0x4C;
/// Component separator: `0x00 0x53` ("S").
const SEPARATOR: u8 = 0x53;

/// Errors during filename decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of an escape sequence
    #[error("unterminated escape sequence")]
    UnterminatedEscape,

    /// `0x00` was followed by a byte that is neither `L` nor `S`
    #[error("invalid escape byte: {0:#04x}")]
    InvalidEscape(u8),

    /// Decoded component count did not match the expected count
    #[error("component count mismatch: expected {expected}, got {actual}")]
    ComponentCount {
        /// Components the caller declared
        expected: usize,
        /// Components actually present
        actual: usize,
    },

    /// A component that must be UTF-8 (index value, timestamp) was not
    #[error("component is not valid UTF-8")]
    InvalidUtf8,

    /// The identifier component was malformed
    #[error("invalid identifier component: {0}")]
    InvalidId(#[from] IdError),

    /// The timestamp component was malformed
    #[error("invalid timestamp component: {0}")]
    InvalidTimestamp(#[from] TimeError),
}

/// Packs components into a single byte string.
pub fn encode_components(components: &[&[u8]]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    for (i, component) in components.iter().enumerate() {
        if i > 0 {
            buf.put_u8(ESCAPE);
            buf.put_u8(SEPARATOR);
        }
        for &byte in *component {
            if byte == ESCAPE {
                buf.put_u8(ESCAPE);
                buf.put_u8(LITERAL_NUL);
            } else {
                buf.put_u8(byte);
            }
        }
    }
    buf.to_vec()
}

/// Unpacks exactly `count` components.
pub fn decode_components(bytes: &[u8], count: usize) -> Result<Vec<Vec<u8>>, CodecError> {
    let mut components = Vec::with_capacity(count);
    let mut current = Vec::new();
    let mut iter = bytes.iter();

    while let Some(&byte) = iter.next() {
        if byte != ESCAPE {
            current.push(byte);
            continue;
        }
        match iter.next() {
            None => return Err(CodecError::UnterminatedEscape),
            Some(&LITERAL_NUL) => current.push(ESCAPE),
            Some(&SEPARATOR) => components.push(std::mem::take(&mut current)),
            Some(&other) => return Err(CodecError::InvalidEscape(other)),
        }
    }
    components.push(current);

    if components.len() != count {
        return Err(CodecError::ComponentCount {
            expected: count,
            actual: components.len(),
        });
    }
    Ok(components)
}

/// The decoded plaintext of an object directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectDirName {
    /// Indexed field values, in declaration order.
    pub index_values: Vec<String>,
    /// The object identifier.
    pub id: ObjectId,
}

/// Encodes an object directory name: indexed field values followed by the id.
pub fn encode_object_dir_name(index_values: &[&str], id: &ObjectId) -> Vec<u8> {
    let mut components: Vec<&[u8]> = index_values.iter().map(|v| v.as_bytes()).collect();
    components.push(id.as_slice());
    encode_components(&components)
}

/// Decodes an object directory name with `index_count` indexed fields.
pub fn decode_object_dir_name(bytes: &[u8], index_count: usize) -> Result<ObjectDirName, CodecError> {
    let mut components = decode_components(bytes, index_count + 1)?;
    let id = ObjectId::from_slice(&components.pop().expect("component count checked"))?;
    let index_values = components
        .into_iter()
        .map(|c| String::from_utf8(c).map_err(|_| CodecError::InvalidUtf8))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ObjectDirName { index_values, id })
}

/// The decoded plaintext of a revision file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionFileName {
    /// When the revision was written.
    pub timestamp: Timestamp,
    /// The revision identifier.
    pub revision_id: RevisionId,
}

/// Encodes a revision file name: timestamp followed by the revision id.
pub fn encode_revision_file_name(timestamp: &Timestamp, revision_id: &RevisionId) -> Vec<u8> {
    encode_components(&[timestamp.to_sortable().as_bytes(), revision_id.as_slice()])
}

/// Decodes a revision file name.
pub fn decode_revision_file_name(bytes: &[u8]) -> Result<RevisionFileName, CodecError> {
    let mut components = decode_components(bytes, 2)?;
    let revision_id = RevisionId::from_slice(&components.pop().expect("component count checked"))
        .map_err(CodecError::InvalidId)?;
    let ts_text =
        String::from_utf8(components.pop().expect("component count checked"))
            .map_err(|_| CodecError::InvalidUtf8)?;
    let timestamp = Timestamp::parse_sortable(&ts_text)?;
    Ok(RevisionFileName {
        timestamp,
        revision_id,
    })
}
