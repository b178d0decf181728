//! Locafoto Vault - Key Material
//!
//! Symmetric key type plus the HKDF split of the device master key into
//! the item and keyring wrapping keys.

use std::fmt;

use hkdf::Hkdf;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;

use crate::error::{VaultError, VaultResult};

/// Key length for AES-256
pub const KEY_LEN: usize = 32;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length
pub const TAG_LEN: usize = 16;

/// Salt length for master key derivation
pub const SALT_LEN: usize = 16;

/// HKDF contexts for key derivation
pub mod contexts {
    /// Wraps per-item keys stored in the metadata store
    pub const ITEMS: &[u8] = b"LOCAFOTO:ITEMS:v1";

    /// Wraps named key material stored in the keyring
    pub const KEYRING: &[u8] = b"LOCAFOTO:KEYRING:v1";
}

/// 256-bit symmetric key, zeroized on drop
pub struct VaultKey {
    inner: Secret<[u8; KEY_LEN]>,
}

impl VaultKey {
    /// Create a new vault key from bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Build a key from a slice, rejecting anything that is not 32 bytes
    pub fn from_slice(bytes: &[u8]) -> VaultResult<Self> {
        let array: [u8; KEY_LEN] = bytes.try_into().map_err(|_| VaultError::InvalidKeyLength {
            expected: KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self::new(array))
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        self.inner.expose_secret()
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }
}

impl Clone for VaultKey {
    fn clone(&self) -> Self {
        Self::new(*self.expose())
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

/// Wrapping keys derived from the PIN-derived master key.
///
/// Item keys and named-key material are wrapped under different subkeys so
/// a wrapped item key can never be confused for a wrapped named key.
pub struct MasterKeys {
    items: VaultKey,
    keyring: VaultKey,
}

impl MasterKeys {
    /// Split a master key into its wrapping subkeys
    pub fn from_master(master: &VaultKey) -> VaultResult<Self> {
        Ok(Self {
            items: derive_key(master.expose(), b"", contexts::ITEMS)?,
            keyring: derive_key(master.expose(), b"", contexts::KEYRING)?,
        })
    }

    /// Key that wraps per-item keys
    pub fn items_key(&self) -> &VaultKey {
        &self.items
    }

    /// Key that wraps named key material
    pub fn keyring_key(&self) -> &VaultKey {
        &self.keyring
    }
}

/// Derive a key using HKDF-SHA256
pub fn derive_key(ikm: &[u8], salt: &[u8], info: &[u8]) -> VaultResult<VaultKey> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = [0u8; KEY_LEN];

    hk.expand(info, &mut okm)
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

    Ok(VaultKey::new(okm))
}

/// Generate a random nonce for AES-GCM
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Generate a random salt for master key derivation
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
