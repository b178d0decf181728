//! Locafoto Vault - Master Key Derivation
//!
//! PIN → 256-bit master key. PBKDF2-HMAC-SHA256 is the default; Argon2id is
//! available for devices that can afford a memory-hard derivation.

use argon2::{Algorithm, Argon2, Params, Version};
use hmac::Hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{VaultKey, KEY_LEN};
use crate::error::{VaultError, VaultResult};

/// Default PBKDF2 iteration count
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

/// Key derivation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum KdfParams {
    /// PBKDF2-HMAC-SHA256
    Pbkdf2 { iterations: u32 },
    /// Argon2id
    Argon2id {
        memory_kib: u32,
        time_cost: u32,
        parallelism: u32,
    },
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams::Pbkdf2 {
            iterations: DEFAULT_PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Argon2id settings matching the mobile profile (64 MiB, 3 passes)
    pub fn argon2_default() -> Self {
        KdfParams::Argon2id {
            memory_kib: 64 * 1024,
            time_cost: 3,
            parallelism: 2,
        }
    }
}

/// Derive the master key from a user secret and a stored random salt
pub fn derive_master_key(secret: &str, salt: &[u8], params: &KdfParams) -> VaultResult<VaultKey> {
    if secret.is_empty() {
        return Err(VaultError::WeakInput("secret must not be empty".into()));
    }

    let mut output = Zeroizing::new([0u8; KEY_LEN]);

    match params {
        KdfParams::Pbkdf2 { iterations } => {
            if *iterations == 0 {
                return Err(VaultError::KeyDerivationFailed(
                    "PBKDF2 iteration count must be positive".into(),
                ));
            }
            pbkdf2::pbkdf2::<Hmac<Sha256>>(secret.as_bytes(), salt, *iterations, &mut *output)
                .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
        }
        KdfParams::Argon2id {
            memory_kib,
            time_cost,
            parallelism,
        } => {
            let params = Params::new(*memory_kib, *time_cost, *parallelism, Some(KEY_LEN))
                .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
            let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
            argon2
                .hash_password_into(secret.as_bytes(), salt, &mut *output)
                .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
        }
    }

    Ok(VaultKey::new(*output))
}
