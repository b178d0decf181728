//! Locafoto Vault - Transfer Formats
//!
//! - `.lfs`       fixed-header binary container naming the key by name
//! - `.locaphoto` self-contained JSON bundle carrying a wrapped key
//! - `.lfkey`     named key export file

pub mod names;
pub mod container;
pub mod bundle;
pub mod key_file;

pub use names::{validate_key_name, MAX_KEY_NAME_LEN};
pub use container::{decode_binary, encode_binary, TransferContainer, HEADER_LEN, MIN_CONTAINER_LEN};
pub use bundle::{decode_bundle, encode_bundle, BundleMetadata, BundlePhoto, TransferBundle, BUNDLE_VERSION};
pub use key_file::{decode_key_file, encode_key_file, SharedKeyFile};

/// Standard base64 for binary fields in JSON documents and records
pub mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn encode(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    pub fn decode(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(value.trim())
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        decode(&value).map_err(serde::de::Error::custom)
    }
}
