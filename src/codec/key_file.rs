//! Named key export file (`.lfkey`)
//!
//! Carries raw key bytes. Only meant for channels that are already trusted
//! (AirDrop between own devices, a USB stick in hand).

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::VaultKey;
use crate::error::{VaultError, VaultResult};

use super::b64;
use super::names::validate_key_name;

/// On-disk form of an exported named key
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedKeyFile {
    pub name: String,
    pub key_data: String,
}

/// Serialize a named key for sharing
pub fn encode_key_file(name: &str, key: &VaultKey) -> VaultResult<Vec<u8>> {
    validate_key_name(name)?;
    let file = SharedKeyFile {
        name: name.to_string(),
        key_data: b64::encode(key.expose()),
    };
    Ok(serde_json::to_vec_pretty(&file)?)
}

/// Parse a shared key file into a validated name and key
pub fn decode_key_file(bytes: &[u8]) -> VaultResult<(String, VaultKey)> {
    let file: SharedKeyFile = serde_json::from_slice(bytes)
        .map_err(|e| VaultError::InvalidFormat(format!("key file: {}", e)))?;

    let name = file.name.trim().to_string();
    validate_key_name(&name)?;

    let raw = Zeroizing::new(
        b64::decode(&file.key_data)
            .map_err(|e| VaultError::InvalidFormat(format!("keyData: {}", e)))?,
    );
    let key = VaultKey::from_slice(&raw)?;

    Ok((name, key))
}
