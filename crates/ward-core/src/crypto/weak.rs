//! Deterministic filename encryption.
//!
//! Directory and file names must encrypt to the same ciphertext every time
//! under one key, so `list()` can correlate names across invocations, and
//! the overhead must stay small so long index values fit within filesystem
//! name limits. That rules out the payload AEAD; instead names use an
//! SIV-shaped construction over the derivation primitives:
//!
//! ```text
//! tag       = HMAC-SHA-256(mac_key, plaintext)[..level]
//! keystream = HKDF(stream_key, salt=tag, info="ward/v1/filename-keystream", L=len)
//! output    = tag ‖ (plaintext ⊕ keystream)
//! ```
//!
//! Overhead is exactly `level` bytes. The truncated tag is far too short to
//! authenticate against a determined attacker; the context check inside the
//! encrypted payload is the real integrity boundary. What the tag does buy
//! is rejection of foreign bytes, which lets directory scans skip files that
//! were never written by this store.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::aead::CryptoError;
use super::kdf::{hkdf_sha256, hmac_sha256};
use super::keys::{info, KeySchedule, StrongKey};
use super::KEY_SIZE;

/// Deterministic cipher for on-disk names, bound to one strong key and one
/// security level.
#[derive(Clone)]
pub struct FilenameCipher {
    mac_key: [u8; KEY_SIZE],
    stream_key: [u8; KEY_SIZE],
    level: usize,
}

impl FilenameCipher {
    /// Builds the cipher for a strong key at the given security level
    /// (= bytes of overhead per name).
    pub fn new(strong: &StrongKey, level: u8) -> Self {
        Self {
            mac_key: KeySchedule::filename_mac_key(strong, level),
            stream_key: KeySchedule::filename_stream_key(strong, level),
            level: level as usize,
        }
    }

    /// Encrypts a plaintext name. Deterministic for a given key.
    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let tag = &hmac_sha256(&self.mac_key, plaintext)[..self.level];

        let mut out = Vec::with_capacity(self.level + plaintext.len());
        out.extend_from_slice(tag);
        out.extend_from_slice(&self.xor_keystream(tag, plaintext));
        out
    }

    /// Decrypts an encrypted name, verifying the truncated tag.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < self.level {
            return Err(CryptoError::TooShort(ciphertext.len()));
        }
        let (tag, body) = ciphertext.split_at(self.level);
        let plaintext = self.xor_keystream(tag, body);

        let expected = &hmac_sha256(&self.mac_key, &plaintext)[..self.level];
        if tag != expected {
            return Err(CryptoError::TagMismatch);
        }
        Ok(plaintext)
    }

    /// Encrypts a plaintext name and renders it base64url for the filesystem.
    pub fn encrypt_to_name(&self, plaintext: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.encrypt(plaintext))
    }

    /// Decodes a base64url filesystem name and decrypts it.
    pub fn decrypt_name(&self, name: &str) -> Result<Vec<u8>, CryptoError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(name)
            .map_err(|_| CryptoError::InvalidName)?;
        self.decrypt(&bytes)
    }

    fn xor_keystream(&self, tag: &[u8], data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return Vec::new();
        }
        let keystream = hkdf_sha256(&self.stream_key, tag, info::FILENAME_KEYSTREAM, data.len());
        data.iter().zip(keystream).map(|(b, k)| b ^ k).collect()
    }
}
