//! Locafoto Vault - AEAD Encryption
//!
//! AES-256-GCM with a detached tag. Every on-disk and on-wire layout in the
//! vault keeps ciphertext, nonce and tag as separate fields, so the tag is
//! never left glued to the ciphertext here.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};

use super::keys::{VaultKey, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

/// Encrypt `plaintext` under `key` and `nonce`, returning ciphertext and tag
pub fn seal(
    key: &VaultKey,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> VaultResult<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| VaultError::EncryptionFailed("AES-GCM seal failed".into()))?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok((buffer, tag_bytes))
}

/// Decrypt and authenticate. Any failure is reported as `Authentication`.
pub fn open(
    key: &VaultKey,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> VaultResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.expose())
        .map_err(|_| VaultError::Authentication)?;

    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer, Tag::from_slice(tag))
        .map_err(|_| VaultError::Authentication)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_nonce;

    #[test]
    fn test_seal_open_roundtrip() {
        let key = VaultKey::generate();
        let nonce = generate_nonce();
        let plaintext = b"Locafoto - holiday photo bytes";

        let (ciphertext, tag) = seal(&key, &nonce, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());

        let decrypted = open(&key, &nonce, &ciphertext, &tag).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = generate_nonce();
        let (ciphertext, tag) = seal(&VaultKey::generate(), &nonce, b"secret").unwrap();

        let result = open(&VaultKey::generate(), &nonce, &ciphertext, &tag);
        assert!(matches!(result, Err(VaultError::Authentication)));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = VaultKey::generate();
        let nonce = generate_nonce();
        let (ciphertext, mut tag) = seal(&key, &nonce, b"secret").unwrap();
        tag[0] ^= 0x01;

        let result = open(&key, &nonce, &ciphertext, &tag);
        assert!(matches!(result, Err(VaultError::Authentication)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = VaultKey::generate();
        let nonce = generate_nonce();
        let (ciphertext, tag) = seal(&key, &nonce, b"").unwrap();
        assert!(ciphertext.is_empty());
        assert!(open(&key, &nonce, &ciphertext, &tag).unwrap().is_empty());
    }
}
