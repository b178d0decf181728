//! Locafoto Vault - Key Wrapping
//!
//! Layout of a wrapped key:
//! ```text
//! [NONCE 12B][ENCRYPTED KEY 32B][TAG 16B]
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::aead;
use super::keys::{generate_nonce, VaultKey, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

/// Length of a wrapped 256-bit key
pub const WRAPPED_KEY_LEN: usize = NONCE_LEN + KEY_LEN + TAG_LEN;

/// Key material encrypted under another key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WrappedKey(#[serde(with = "crate::codec::b64")] Vec<u8>);

impl WrappedKey {
    /// Wrap raw bytes received from storage or the wire
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

/// Wrap `key` under `master` with a fresh nonce
pub fn wrap(key: &VaultKey, master: &VaultKey) -> VaultResult<WrappedKey> {
    let nonce = generate_nonce();
    let (ciphertext, tag) = aead::seal(master, &nonce, key.expose())?;

    let mut out = Vec::with_capacity(WRAPPED_KEY_LEN);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&tag);

    Ok(WrappedKey(out))
}

/// Unwrap a key. Every failure, including bad lengths, is `Authentication`.
pub fn unwrap(wrapped: &WrappedKey, master: &VaultKey) -> VaultResult<VaultKey> {
    let bytes = wrapped.as_bytes();
    if bytes.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::Authentication);
    }

    let tag_start = bytes.len() - TAG_LEN;
    let nonce: [u8; NONCE_LEN] = bytes[..NONCE_LEN]
        .try_into()
        .map_err(|_| VaultError::Authentication)?;
    let tag: [u8; TAG_LEN] = bytes[tag_start..]
        .try_into()
        .map_err(|_| VaultError::Authentication)?;

    let raw = Zeroizing::new(aead::open(master, &nonce, &bytes[NONCE_LEN..tag_start], &tag)?);

    VaultKey::from_slice(&raw).map_err(|_| VaultError::Authentication)
}
