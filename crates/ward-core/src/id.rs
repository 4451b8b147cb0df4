//! Identifier types.
//!
//! Every stored object and every revision carries a 128-bit random
//! identifier. On disk and in payloads identifiers travel as base64url
//! (no padding, 22 characters); inside packed filenames they travel as
//! their raw 16 bytes to keep names short.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Byte length of all identifiers.
pub const ID_SIZE: usize = 16;

/// Errors when parsing an identifier from its textual or raw form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// Raw byte length was not 16
    #[error("invalid identifier length: expected {ID_SIZE} bytes, got {0}")]
    InvalidLength(usize),

    /// Textual form was not valid base64url
    #[error("invalid identifier encoding")]
    InvalidEncoding,
}

macro_rules! define_id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; ID_SIZE]);

        impl $name {
            /// Creates an identifier from a 16-byte array.
            pub const fn new(bytes: [u8; ID_SIZE]) -> Self {
                Self(bytes)
            }

            /// Generates a fresh random identifier.
            pub fn random() -> Self {
                use rand::RngCore;
                let mut bytes = [0u8; ID_SIZE];
                rand::thread_rng().fill_bytes(&mut bytes);
                Self(bytes)
            }

            /// Returns the inner bytes.
            pub const fn as_bytes(&self) -> &[u8; ID_SIZE] {
                &self.0
            }

            /// Returns the inner bytes as a slice.
            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            /// Creates an identifier from a raw byte slice.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, IdError> {
                if bytes.len() != ID_SIZE {
                    return Err(IdError::InvalidLength(bytes.len()));
                }
                let mut arr = [0u8; ID_SIZE];
                arr.copy_from_slice(bytes);
                Ok(Self(arr))
            }

            /// Returns the base64url textual form (22 characters, no padding).
            pub fn to_base64url(&self) -> String {
                URL_SAFE_NO_PAD.encode(self.0)
            }

            /// Parses the base64url textual form.
            pub fn from_base64url(s: &str) -> Result<Self, IdError> {
                let bytes = URL_SAFE_NO_PAD
                    .decode(s)
                    .map_err(|_| IdError::InvalidEncoding)?;
                Self::from_slice(&bytes)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_base64url())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_base64url())
            }
        }

        impl From<[u8; ID_SIZE]> for $name {
            fn from(bytes: [u8; ID_SIZE]) -> Self {
                Self(bytes)
            }
        }
    };
}

define_id_type!(
    /// Identifier of a stored object. Assigned once at `create` and stable
    /// across revisions and directory renames.
    ObjectId
);

define_id_type!(
    /// Identifier of a single revision of an object. Distinct per revision.
    RevisionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64url_roundtrip() {
        let id = ObjectId::random();
        let text = id.to_base64url();
        assert_eq!(text.len(), 22);
        let parsed = ObjectId::from_base64url(&text).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_from_slice_wrong_length() {
        assert_eq!(
            ObjectId::from_slice(&[0u8; 15]),
            Err(IdError::InvalidLength(15))
        );
    }

    #[test]
    fn test_from_base64url_rejects_standard_alphabet() {
        // '+' and '/' belong to the standard alphabet, not base64url.
        assert_eq!(
            RevisionId::from_base64url("++++++++++++++++++++++"),
            Err(IdError::InvalidEncoding)
        );
    }

    #[test]
    fn test_random_ids_are_distinct() {
        assert_ne!(ObjectId::random(), ObjectId::random());
    }
}
