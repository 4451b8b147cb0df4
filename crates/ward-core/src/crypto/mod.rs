//! Cryptographic primitives for the Ward store.
//!
//! - HKDF-SHA-256 (RFC 5869) and HMAC-SHA-256 (RFC 2104)
//! - XChaCha20-Poly1305 payload sealing (strong, non-deterministic)
//! - Deterministic short-overhead filename cipher (weak, derived)
//! - Argon2id password key derivation for account unlock

mod aead;
mod kdf;
mod keys;
mod weak;

pub use aead::{open, seal, CryptoError};
pub use kdf::{hkdf_sha256, hmac_sha256};
pub use keys::{KeySchedule, StrongKey};
pub use weak::FilenameCipher;

/// AEAD nonce size for XChaCha20-Poly1305
pub const NONCE_SIZE: usize = 24;

/// AEAD tag size for XChaCha20-Poly1305
pub const TAG_SIZE: usize = 16;

/// Key size for all symmetric operations
pub const KEY_SIZE: usize = 32;

/// Salt size for the password KDF
pub const SALT_SIZE: usize = 16;
