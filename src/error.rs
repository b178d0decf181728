//! Locafoto Vault - Error Types

use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault error types
#[derive(Error, Debug)]
pub enum VaultError {
    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// Tag verification failed. Covers both tampering and use of the wrong
    /// key; the two are never told apart.
    #[error("Authentication failed - wrong key or corrupted data")]
    Authentication,

    #[error("Weak input: {0}")]
    WeakInput(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    // ═══════════════════════════════════════════════════════════════
    // TRANSFER FORMAT ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Key name too long: {len} bytes (max {max})")]
    KeyNameTooLong { len: usize, max: usize },

    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Invalid key name: {0}")]
    NameValidation(String),

    // ═══════════════════════════════════════════════════════════════
    // KEY ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("A key named '{0}' already exists")]
    DuplicateName(String),

    #[error("Key '{name}' is still used by {usage} imported item(s)")]
    KeyInUse { name: String, usage: u64 },

    #[error("Vault is locked")]
    VaultLocked,

    #[error("Vault is already initialized")]
    AlreadyInitialized,

    // ═══════════════════════════════════════════════════════════════
    // STORAGE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Store '{0}' is shut down")]
    StoreClosed(&'static str),

    #[error("Operation cancelled")]
    Cancelled,
}

impl VaultError {
    /// Malformed container, bundle or payload bytes
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            VaultError::InvalidFormat(_)
                | VaultError::InvalidBundle(_)
                | VaultError::MalformedPayload(_)
        )
    }

    /// Check if this is a security-critical error
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            VaultError::Authentication | VaultError::NameValidation(_)
        )
    }

    /// Short machine-readable kind, used in batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::Authentication => "authentication",
            VaultError::WeakInput(_) => "weak_input",
            VaultError::KeyDerivationFailed(_) => "key_derivation",
            VaultError::EncryptionFailed(_) => "encryption",
            VaultError::InvalidKeyLength { .. } => "invalid_key_length",
            VaultError::KeyNameTooLong { .. } => "key_name_too_long",
            VaultError::InvalidFormat(_)
            | VaultError::InvalidBundle(_)
            | VaultError::MalformedPayload(_) => "format",
            VaultError::NameValidation(_) => "name_validation",
            VaultError::DuplicateName(_) => "duplicate_name",
            VaultError::KeyInUse { .. } => "key_in_use",
            VaultError::VaultLocked => "locked",
            VaultError::AlreadyInitialized => "already_initialized",
            VaultError::NotFound(_) => "not_found",
            VaultError::Io(_) => "io",
            VaultError::Database(_) => "database",
            VaultError::Serialization(_) => "serialization",
            VaultError::Config(_) => "config",
            VaultError::StoreClosed(_) => "store_closed",
            VaultError::Cancelled => "cancelled",
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        VaultError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_errors_grouped() {
        assert!(VaultError::InvalidFormat("short".into()).is_format_error());
        assert!(VaultError::InvalidBundle("iv".into()).is_format_error());
        assert!(VaultError::MalformedPayload("tag".into()).is_format_error());
        assert!(!VaultError::Authentication.is_format_error());
        assert_eq!(VaultError::InvalidBundle("x".into()).kind(), "format");
    }

    #[test]
    fn test_authentication_message_is_generic() {
        let msg = VaultError::Authentication.to_string();
        assert!(msg.contains("wrong key or corrupted"));
    }
}
