//! Key types and the derivation schedule.
//!
//! One strong symmetric key per account, generated at account creation and
//! unlocked at login. Everything else is derived from it.

use std::fmt;

use argon2::Argon2;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::aead::CryptoError;
use super::kdf::hkdf_sha256;
use super::KEY_SIZE;

/// Derivation info constants.
pub mod info {
    /// Info string for the filename cipher's MAC key
    pub const FILENAME_MAC: &[u8] = b"ward/v1/filename-mac";
    /// Info string for the filename cipher's stream key
    pub const FILENAME_STREAM: &[u8] = b"ward/v1/filename-stream";
    /// Info string for the per-name keystream
    pub const FILENAME_KEYSTREAM: &[u8] = b"ward/v1/filename-keystream";
}

/// The strong symmetric key held by a logged-in session.
///
/// Encrypts object payloads and the account key file. Never written to disk
/// in the clear; unlocked from the account record at login.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrongKey(pub [u8; KEY_SIZE]);

impl StrongKey {
    /// Creates a strong key from bytes.
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Generates a random strong key.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the inner bytes.
    pub const fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Creates a strong key from a raw slice.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::OpenFailed);
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for StrongKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StrongKey([REDACTED])")
    }
}

/// Zeroizes the key on drop.
impl Drop for StrongKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Key derivation schedule.
pub struct KeySchedule;

impl KeySchedule {
    /// Derives the filename cipher's MAC key at the given security level.
    ///
    /// ```text
    /// filename_mac_key = HKDF(StrongKey, salt=[level], info="ward/v1/filename-mac", L=32)
    /// ```
    pub fn filename_mac_key(strong: &StrongKey, level: u8) -> [u8; KEY_SIZE] {
        let result = hkdf_sha256(strong.as_bytes(), &[level], info::FILENAME_MAC, KEY_SIZE);
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&result);
        key
    }

    /// Derives the filename cipher's stream key at the given security level.
    ///
    /// ```text
    /// filename_stream_key = HKDF(StrongKey, salt=[level], info="ward/v1/filename-stream", L=32)
    /// ```
    pub fn filename_stream_key(strong: &StrongKey, level: u8) -> [u8; KEY_SIZE] {
        let result = hkdf_sha256(strong.as_bytes(), &[level], info::FILENAME_STREAM, KEY_SIZE);
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&result);
        key
    }

    /// Derives the account-unlock key from a password and per-user salt
    /// (Argon2id, default parameters, 32-byte raw output).
    pub fn password_key(password: &str, salt: &[u8]) -> Result<StrongKey, CryptoError> {
        let mut out = [0u8; KEY_SIZE];
        Argon2::default()
            .hash_password_into(password.as_bytes(), salt, &mut out)
            .map_err(|e| CryptoError::Kdf(e.to_string()))?;
        Ok(StrongKey::new(out))
    }
}
