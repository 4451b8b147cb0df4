//! Ward Store - the persistence layer.
//!
//! A local, encrypted, revision-tracked, lock-coordinated object store over
//! an ordinary filesystem:
//! - Atomic stage-then-commit filesystem mutations ([`fsx`])
//! - Directory-based leased locks with renewal and stale reclamation ([`lock`])
//! - Model definitions and structural schema validation ([`model`], [`schema`])
//! - Per-collection create/list/read/revision operations ([`collection`])
//! - Accounts and password-unlocked sessions ([`session`])
//! - A per-session event bus ([`events`])

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod collection;
pub mod config;
pub mod events;
pub mod fsx;
pub mod lock;
pub mod model;
pub mod schema;
pub mod session;

pub use collection::{Collection, ListEntry, RevisionEntry, Store};
pub use config::StoreConfig;
pub use events::{EventBus, StoreEvent};
pub use lock::{Lock, LockHolder, LockManager};
pub use model::ModelDef;
pub use schema::{Field, Schema};
pub use session::{Account, Session};

use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A filesystem call failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The schema rejected a payload, or an operation's input was malformed
    #[error("validation failed: {0}")]
    Validation(String),

    /// A decrypted payload did not match the location it was found at,
    /// or payload authentication failed
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// No object with the requested id exists in the collection
    #[error("object not found in {model}: {id}")]
    ObjectNotFound {
        /// Model name of the collection searched
        model: String,
        /// The id that was looked up
        id: String,
    },

    /// The lock is held by a non-stale holder
    #[error("lock {lock_id} is in use by {}", holder.user_name)]
    LockInUse {
        /// The contested lock id
        lock_id: String,
        /// Metadata of the current holder
        holder: LockHolder,
    },

    /// Login: no such account
    #[error("unknown user name: {0}")]
    UnknownUserName(String),

    /// Login: password check failed
    #[error("incorrect password")]
    IncorrectPassword,

    /// Login: the account carries a deactivation marker
    #[error("account is deactivated: {0}")]
    DeactivatedAccount(String),

    /// A cryptographic primitive failed outside a tamper-check context
    #[error("crypto failure: {0}")]
    Crypto(#[from] ward_core::crypto::CryptoError),

    /// A filename failed to decode
    #[error("filename codec failure: {0}")]
    Codec(#[from] ward_core::codec::CodecError),

    /// A decrypted payload was not valid JSON
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The operation does not exist for this collection's mutability
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}
