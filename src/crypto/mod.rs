//! Locafoto Vault - Cryptographic Core
//!
//! AES-256-GCM for payloads and key wrapping, PBKDF2/Argon2id for the
//! PIN-derived master key, HKDF for the wrapping subkeys.

pub mod keys;
pub mod aead;
pub mod kdf;
pub mod wrap;

pub use keys::*;
pub use kdf::{derive_master_key, KdfParams, DEFAULT_PBKDF2_ITERATIONS};
pub use wrap::{unwrap, wrap, WrappedKey, WRAPPED_KEY_LEN};
