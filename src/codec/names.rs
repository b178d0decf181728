//! Key name validation.
//!
//! Key names arrive in container headers from other devices and are later
//! used as keyring lookups and in file names, so they are checked here.

use crate::error::{VaultError, VaultResult};

/// Longest accepted key name, in UTF-8 bytes
pub const MAX_KEY_NAME_LEN: usize = 64;

/// Accept only non-empty `[A-Za-z0-9_-]` names of at most 64 bytes
pub fn validate_key_name(name: &str) -> VaultResult<()> {
    if name.is_empty() {
        return Err(VaultError::NameValidation("name is empty".into()));
    }
    if name.len() > MAX_KEY_NAME_LEN {
        return Err(VaultError::NameValidation(format!(
            "name is {} bytes (max {})",
            name.len(),
            MAX_KEY_NAME_LEN
        )));
    }
    if name.contains("..") {
        return Err(VaultError::NameValidation("parent directory reference".into()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(VaultError::NameValidation("path separator".into()));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(VaultError::NameValidation(format!(
            "character {:?} is not allowed",
            c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_simple_names() {
        validate_key_name("My-Key_01").unwrap();
        validate_key_name("SampleKey").unwrap();
        validate_key_name(&"k".repeat(64)).unwrap();
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in ["../secret", "a/b", "", "a\\b", "..", "key name", "clé", "a.b"] {
            let err = validate_key_name(name).unwrap_err();
            assert!(
                matches!(err, VaultError::NameValidation(_)),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_rejects_65_byte_name() {
        let name = "a".repeat(65);
        assert!(matches!(
            validate_key_name(&name),
            Err(VaultError::NameValidation(_))
        ));
    }
}
