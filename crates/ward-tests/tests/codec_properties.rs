//! Property tests for the filename codec and the deterministic filename
//! cipher.

use proptest::prelude::*;
use ward_core::codec::{
    decode_components, decode_object_dir_name, encode_components, encode_object_dir_name,
    CodecError,
};
use ward_core::crypto::{FilenameCipher, StrongKey};
use ward_core::ObjectId;

fn components() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6)
}

proptest! {
    #[test]
    fn prop_codec_roundtrip(xs in components()) {
        let refs: Vec<&[u8]> = xs.iter().map(Vec::as_slice).collect();
        let packed = encode_components(&refs);
        let unpacked = decode_components(&packed, xs.len()).unwrap();
        prop_assert_eq!(unpacked, xs);
    }

    #[test]
    fn prop_codec_wrong_count_rejected(xs in components()) {
        let refs: Vec<&[u8]> = xs.iter().map(Vec::as_slice).collect();
        let packed = encode_components(&refs);
        let is_component_count_err = matches!(
            decode_components(&packed, xs.len() + 1),
            Err(CodecError::ComponentCount { .. })
        );
        prop_assert!(is_component_count_err);
    }

    #[test]
    fn prop_codec_trailing_escape_rejected(xs in components()) {
        let refs: Vec<&[u8]> = xs.iter().map(Vec::as_slice).collect();
        let mut packed = encode_components(&refs);
        packed.push(0x00);
        prop_assert_eq!(
            decode_components(&packed, xs.len()),
            Err(CodecError::UnterminatedEscape)
        );
    }

    #[test]
    fn prop_object_dir_name_roundtrip(
        values in prop::collection::vec(".{0,24}", 0..4),
        id_bytes in prop::array::uniform16(any::<u8>()),
    ) {
        let id = ObjectId::new(id_bytes);
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        let packed = encode_object_dir_name(&refs, &id);
        let decoded = decode_object_dir_name(&packed, values.len()).unwrap();
        prop_assert_eq!(decoded.index_values, values);
        prop_assert_eq!(decoded.id, id);
    }

    #[test]
    fn prop_filename_cipher_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..128)) {
        let cipher = FilenameCipher::new(&StrongKey::new([0x42u8; 32]), 5);
        let name = cipher.encrypt_to_name(&plaintext);
        prop_assert_eq!(cipher.decrypt_name(&name).unwrap(), plaintext);
    }

    #[test]
    fn prop_filename_cipher_deterministic(plaintext in prop::collection::vec(any::<u8>(), 0..128)) {
        let cipher = FilenameCipher::new(&StrongKey::new([0x42u8; 32]), 5);
        prop_assert_eq!(cipher.encrypt(&plaintext), cipher.encrypt(&plaintext));
    }

    #[test]
    fn prop_filename_cipher_overhead(plaintext in prop::collection::vec(any::<u8>(), 0..128)) {
        let cipher = FilenameCipher::new(&StrongKey::new([0x42u8; 32]), 5);
        prop_assert_eq!(cipher.encrypt(&plaintext).len(), plaintext.len() + 5);
    }

    #[test]
    fn prop_filename_cipher_rejects_foreign_key(plaintext in prop::collection::vec(any::<u8>(), 0..128)) {
        let ours = FilenameCipher::new(&StrongKey::new([0x01u8; 32]), 5);
        let theirs = FilenameCipher::new(&StrongKey::new([0x02u8; 32]), 5);
        let name = ours.encrypt_to_name(&plaintext);
        prop_assert!(theirs.decrypt_name(&name).is_err());
    }
}
