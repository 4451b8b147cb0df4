//! Ward Core - primitives shared by the Ward object store.
//!
//! This crate provides:
//! - Cryptographic primitives (HKDF, AEAD payload sealing, the deterministic
//!   filename cipher, password key derivation)
//! - The filename component codec (object-directory and revision-file names)
//! - Identifier types (`ObjectId`, `RevisionId`)
//! - The single sortable timestamp format used across the store

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod codec;
pub mod crypto;
pub mod id;
pub mod time;

pub use codec::{CodecError, ObjectDirName, RevisionFileName};
pub use crypto::*;
pub use id::{IdError, ObjectId, RevisionId};
pub use time::{TimeError, Timestamp};
