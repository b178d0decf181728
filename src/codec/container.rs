//! Binary transfer container (`.lfs`)
//!
//! Format:
//! ```text
//! [KEY NAME 128B][UTF-8, NUL padded]
//! [CIPHERTEXT variable][AES-256-GCM under the named key]
//! [NONCE 12B]
//! [TAG 16B]
//! ```
//! Only the suffix has a fixed size, so decoding splits from the end.

use crate::cipher::EncryptedPayload;
use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

use super::names::validate_key_name;

/// Fixed header size holding the key name
pub const HEADER_LEN: usize = 128;

/// Smallest valid container: header, empty ciphertext, nonce, tag
pub const MIN_CONTAINER_LEN: usize = HEADER_LEN + NONCE_LEN + TAG_LEN;

/// Decoded container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferContainer {
    pub key_name: String,
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

impl TransferContainer {
    /// Payload view for the item cipher
    pub fn payload(&self) -> EncryptedPayload {
        EncryptedPayload {
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce.to_vec(),
            tag: self.tag.to_vec(),
        }
    }
}

/// Encode a container. Names over 128 bytes are rejected.
pub fn encode_binary(
    key_name: &str,
    ciphertext: &[u8],
    nonce: &[u8; NONCE_LEN],
    tag: &[u8; TAG_LEN],
) -> VaultResult<Vec<u8>> {
    let name = key_name.as_bytes();
    if name.len() > HEADER_LEN {
        return Err(VaultError::KeyNameTooLong {
            len: name.len(),
            max: HEADER_LEN,
        });
    }

    let mut out = Vec::with_capacity(MIN_CONTAINER_LEN + ciphertext.len());
    out.extend_from_slice(name);
    out.resize(HEADER_LEN, 0);
    out.extend_from_slice(ciphertext);
    out.extend_from_slice(nonce);
    out.extend_from_slice(tag);

    Ok(out)
}

/// Decode a container and validate the key name it references
pub fn decode_binary(bytes: &[u8]) -> VaultResult<TransferContainer> {
    if bytes.len() < MIN_CONTAINER_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "container is {} bytes, need at least {}",
            bytes.len(),
            MIN_CONTAINER_LEN
        )));
    }

    let header = &bytes[..HEADER_LEN];
    let name_len = header.iter().position(|b| *b == 0).unwrap_or(HEADER_LEN);
    let key_name = std::str::from_utf8(&header[..name_len])
        .map_err(|_| VaultError::InvalidFormat("key name is not valid UTF-8".into()))?
        .trim()
        .to_string();
    validate_key_name(&key_name)?;

    let tag_start = bytes.len() - TAG_LEN;
    let nonce_start = tag_start - NONCE_LEN;

    let nonce: [u8; NONCE_LEN] = bytes[nonce_start..tag_start]
        .try_into()
        .map_err(|_| VaultError::InvalidFormat("nonce".into()))?;
    let tag: [u8; TAG_LEN] = bytes[tag_start..]
        .try_into()
        .map_err(|_| VaultError::InvalidFormat("tag".into()))?;

    Ok(TransferContainer {
        key_name,
        ciphertext: bytes[HEADER_LEN..nonce_start].to_vec(),
        nonce,
        tag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONCE: [u8; NONCE_LEN] = [0xA5; NONCE_LEN];
    const TAG: [u8; TAG_LEN] = [0x5A; TAG_LEN];

    #[test]
    fn test_roundtrip_various_lengths() {
        for len in [0usize, 1, 1_000_000] {
            let ciphertext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let bytes = encode_binary("SampleKey", &ciphertext, &NONCE, &TAG).unwrap();
            assert_eq!(bytes.len(), MIN_CONTAINER_LEN + len);

            let decoded = decode_binary(&bytes).unwrap();
            assert_eq!(decoded.key_name, "SampleKey");
            assert_eq!(decoded.ciphertext, ciphertext);
            assert_eq!(decoded.nonce, NONCE);
            assert_eq!(decoded.tag, TAG);
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode_binary("K", b"ct", &NONCE, &TAG).unwrap();
        assert_eq!(bytes[0], b'K');
        assert!(bytes[1..HEADER_LEN].iter().all(|b| *b == 0));
        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 2], b"ct");
        assert_eq!(&bytes[HEADER_LEN + 2..HEADER_LEN + 2 + NONCE_LEN], &NONCE);
        assert_eq!(&bytes[bytes.len() - TAG_LEN..], &TAG);
    }

    #[test]
    fn test_name_length_limits() {
        let exact = "n".repeat(HEADER_LEN);
        let bytes = encode_binary(&exact, b"", &NONCE, &TAG).unwrap();
        assert_eq!(&bytes[..HEADER_LEN], exact.as_bytes());

        let too_long = "n".repeat(HEADER_LEN + 1);
        assert!(matches!(
            encode_binary(&too_long, b"", &NONCE, &TAG),
            Err(VaultError::KeyNameTooLong { len: 129, max: 128 })
        ));
    }

    #[test]
    fn test_short_input_rejected() {
        for len in [0usize, 1, 100, MIN_CONTAINER_LEN - 1] {
            let err = decode_binary(&vec![b'a'; len]).unwrap_err();
            assert!(err.is_format_error(), "len {} gave {:?}", len, err);
        }
    }

    #[test]
    fn test_name_trimmed_and_validated() {
        let mut bytes = encode_binary("  Trip-2024 ", b"x", &NONCE, &TAG).unwrap();
        assert_eq!(decode_binary(&bytes).unwrap().key_name, "Trip-2024");

        bytes[..9].copy_from_slice(b"../secret");
        assert!(matches!(
            decode_binary(&bytes),
            Err(VaultError::NameValidation(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_name_rejected() {
        let mut bytes = encode_binary("Key", b"x", &NONCE, &TAG).unwrap();
        bytes[0] = 0xFF;
        assert!(matches!(
            decode_binary(&bytes),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_corrupted_tag_fails_authentication() {
        use crate::cipher::{decrypt_item, encrypt_item};
        use crate::crypto::{derive_master_key, unwrap, wrap, KdfParams};

        let master = derive_master_key("2468", &[3u8; 16], &KdfParams::Pbkdf2 { iterations: 1_000 })
            .unwrap();
        let (payload, key) = encrypt_item(b"0123456789").unwrap();
        let wrapped = wrap(&key, &master).unwrap();

        let nonce: [u8; NONCE_LEN] = payload.nonce.as_slice().try_into().unwrap();
        let tag: [u8; TAG_LEN] = payload.tag.as_slice().try_into().unwrap();
        let mut bytes = encode_binary("Trip", &payload.ciphertext, &nonce, &tag).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;

        let container = decode_binary(&bytes).unwrap();
        let key = unwrap(&wrapped, &master).unwrap();
        assert!(matches!(
            decrypt_item(&container.payload(), &key),
            Err(VaultError::Authentication)
        ));
    }

    #[test]
    fn test_header_without_nul() {
        // Full header with no padding: the whole header is the name, which
        // is then too long for a key name.
        let bytes = encode_binary(&"a".repeat(HEADER_LEN), b"", &NONCE, &TAG).unwrap();
        assert!(matches!(
            decode_binary(&bytes),
            Err(VaultError::NameValidation(_))
        ));
    }
}
