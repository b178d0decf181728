//! Per-item payload encryption.
//!
//! Each item gets its own random key and nonce. The cipher hands the raw key
//! back to the caller and never persists it; wrapping or discarding it is the
//! caller's job.

use serde::{Deserialize, Serialize};

use crate::crypto::{aead, generate_nonce, VaultKey, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

/// Ciphertext plus the nonce and tag needed to open it.
///
/// Nonce and tag are kept as plain byte vectors because payloads are
/// reassembled from untrusted wire data; their lengths are checked on
/// decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tag: Vec<u8>,
}

impl EncryptedPayload {
    /// Ciphertext with its tag appended, used for self-describing blobs
    pub fn ciphertext_with_tag(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + self.tag.len());
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Split a `ciphertext ‖ tag` blob back apart
    pub fn from_ciphertext_with_tag(blob: &[u8], nonce: Vec<u8>) -> VaultResult<Self> {
        if blob.len() < TAG_LEN {
            return Err(VaultError::MalformedPayload(format!(
                "blob of {} bytes cannot hold a {}-byte tag",
                blob.len(),
                TAG_LEN
            )));
        }
        let split = blob.len() - TAG_LEN;
        Ok(Self {
            ciphertext: blob[..split].to_vec(),
            nonce,
            tag: blob[split..].to_vec(),
        })
    }
}

/// Encrypt an item under a freshly generated key
pub fn encrypt_item(plaintext: &[u8]) -> VaultResult<(EncryptedPayload, VaultKey)> {
    let key = VaultKey::generate();
    let payload = encrypt_with_key(plaintext, &key)?;
    Ok((payload, key))
}

/// Encrypt under an existing key with an internally generated nonce
pub fn encrypt_with_key(plaintext: &[u8], key: &VaultKey) -> VaultResult<EncryptedPayload> {
    let nonce = generate_nonce();
    let (ciphertext, tag) = aead::seal(key, &nonce, plaintext)?;

    Ok(EncryptedPayload {
        ciphertext,
        nonce: nonce.to_vec(),
        tag: tag.to_vec(),
    })
}

/// Thumbnail fallback: encrypt under the primary item's key and nonce.
///
/// Used when no separate thumbnail key was requested. The returned tag is
/// the thumbnail's own tag; the primary payload's tag is not involved.
pub fn encrypt_with_existing_key_material(
    plaintext: &[u8],
    key: &VaultKey,
    nonce: &[u8],
) -> VaultResult<EncryptedPayload> {
    let nonce = fixed_nonce(nonce)?;
    let (ciphertext, tag) = aead::seal(key, &nonce, plaintext)?;

    Ok(EncryptedPayload {
        ciphertext,
        nonce: nonce.to_vec(),
        tag: tag.to_vec(),
    })
}

/// Decrypt an item payload
pub fn decrypt_item(payload: &EncryptedPayload, key: &VaultKey) -> VaultResult<Vec<u8>> {
    let nonce = fixed_nonce(&payload.nonce)?;
    let tag: [u8; TAG_LEN] = payload.tag.as_slice().try_into().map_err(|_| {
        VaultError::MalformedPayload(format!(
            "tag must be {} bytes, got {}",
            TAG_LEN,
            payload.tag.len()
        ))
    })?;

    aead::open(key, &nonce, &payload.ciphertext, &tag)
}

fn fixed_nonce(nonce: &[u8]) -> VaultResult<[u8; NONCE_LEN]> {
    nonce.try_into().map_err(|_| {
        VaultError::MalformedPayload(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            nonce.len()
        ))
    })
}
