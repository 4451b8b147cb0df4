//! HKDF-SHA-256 (RFC 5869) over HMAC-SHA-256.
//!
//! Every working key in the store is derived from the strong key through
//! this function: the filename cipher's MAC and stream keys, and the
//! per-name keystreams.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HASH_LEN: usize = 32;

/// Computes HMAC-SHA-256 of `message` under `key`.
pub fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().into()
}

/// Derives `length` bytes of key material per RFC 5869.
///
/// An empty salt is treated as a hash-length block of zeros during extract.
///
/// # Panics
/// Panics when `length` is 0 or needs more than the RFC limit of 255
/// expansion blocks (8160 bytes).
pub fn hkdf_sha256(ikm: &[u8], salt: &[u8], info: &[u8], length: usize) -> Vec<u8> {
    let block_count = length.div_ceil(HASH_LEN);
    assert!(
        (1..=255).contains(&block_count),
        "HKDF output length out of range: {length}"
    );

    let pseudo_random_key = if salt.is_empty() {
        hmac_sha256(&[0u8; HASH_LEN], ikm)
    } else {
        hmac_sha256(salt, ikm)
    };

    // expand: each block is HMAC over the previous block, the info string,
    // and a 1-based counter
    let mut okm = Vec::with_capacity(block_count * HASH_LEN);
    let mut previous: Option<[u8; HASH_LEN]> = None;
    for counter in 1..=block_count as u8 {
        let mut input = Vec::with_capacity(HASH_LEN + info.len() + 1);
        if let Some(prev) = &previous {
            input.extend_from_slice(prev);
        }
        input.extend_from_slice(info);
        input.push(counter);

        let block = hmac_sha256(&pseudo_random_key, &input);
        okm.extend_from_slice(&block);
        previous = Some(block);
    }

    okm.truncate(length);
    okm
}
