//! Strong payload encryption: XChaCha20-Poly1305.
//!
//! Used for object payloads and the on-disk account key file. Each call
//! draws a fresh random nonce, so identical plaintexts yield distinct
//! ciphertexts. The sealed form is self-contained:
//! `nonce (24) ‖ ciphertext ‖ tag (16)`.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use thiserror::Error;

use super::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Errors from the cryptographic primitives.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption failed
    #[error("encryption failed")]
    SealFailed,

    /// Authentication tag mismatch or corrupted ciphertext
    #[error("decryption failed: authentication tag mismatch")]
    OpenFailed,

    /// Sealed input shorter than nonce + tag
    #[error("sealed data too short: expected at least {} bytes, got {0}", NONCE_SIZE + TAG_SIZE)]
    TooShort(usize),

    /// Deterministic filename cipher tag mismatch
    #[error("filename tag mismatch")]
    TagMismatch,

    /// Filename was not valid base64url
    #[error("invalid encrypted name encoding")]
    InvalidName,

    /// Password key derivation failed
    #[error("key derivation failed: {0}")]
    Kdf(String),
}

/// Seals plaintext under the given key with a random nonce.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::SealFailed)?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::SealFailed)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Opens a sealed buffer produced by [`seal`].
pub fn open(key: &[u8; KEY_SIZE], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::TooShort(sealed.len()));
    }

    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::OpenFailed)?;

    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::OpenFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = [0x42u8; KEY_SIZE];
        let plaintext = b"clinical note payload";

        let sealed = seal(&key, plaintext).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);

        let opened = open(&key, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_seal_is_nondeterministic() {
        let key = [0x42u8; KEY_SIZE];
        let a = seal(&key, b"same plaintext").unwrap();
        let b = seal(&key, b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_open_wrong_key() {
        let sealed = seal(&[0x01u8; KEY_SIZE], b"payload").unwrap();
        assert_eq!(
            open(&[0x02u8; KEY_SIZE], &sealed),
            Err(CryptoError::OpenFailed)
        );
    }

    #[test]
    fn test_open_tampered() {
        let key = [0x42u8; KEY_SIZE];
        let mut sealed = seal(&key, b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert_eq!(open(&key, &sealed), Err(CryptoError::OpenFailed));
    }

    #[test]
    fn test_open_too_short() {
        let key = [0x42u8; KEY_SIZE];
        assert_eq!(open(&key, &[0u8; 10]), Err(CryptoError::TooShort(10)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = [0x42u8; KEY_SIZE];
        let sealed = seal(&key, b"").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + TAG_SIZE);
        assert!(open(&key, &sealed).unwrap().is_empty());
    }
}
