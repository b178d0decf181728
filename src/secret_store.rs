//! Locafoto Vault - Device Secret Storage
//!
//! Holds the small secrets the master key depends on (salt, PIN verifier).
//! On a phone this is the platform keychain; here it is a trait with a
//! file-backed and an in-memory implementation.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::codec::b64;
use crate::error::{VaultError, VaultResult};

/// When a stored secret may be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Readable only while the device is unlocked; never synced or escrowed
    WhenUnlockedThisDeviceOnly,
}

/// Secure key-value store for device secrets
pub trait SecretStore: Send + Sync {
    fn get(&self, account: &str) -> VaultResult<Option<Zeroizing<Vec<u8>>>>;

    fn set(&self, account: &str, secret: &[u8], accessibility: Accessibility) -> VaultResult<()>;

    /// Remove a secret. Missing accounts are not an error.
    fn delete(&self, account: &str) -> VaultResult<()>;
}

#[derive(Clone, Serialize, Deserialize)]
struct StoredSecret {
    accessibility: Accessibility,
    #[serde(with = "b64")]
    value: Vec<u8>,
}

impl Drop for StoredSecret {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.value);
    }
}

// ═══════════════════════════════════════════════════════════════
// MEMORY
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemorySecretStore {
    secrets: RwLock<BTreeMap<String, StoredSecret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, account: &str) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
        Ok(self
            .secrets
            .read()
            .get(account)
            .map(|s| Zeroizing::new(s.value.clone())))
    }

    fn set(&self, account: &str, secret: &[u8], accessibility: Accessibility) -> VaultResult<()> {
        self.secrets.write().insert(
            account.to_string(),
            StoredSecret {
                accessibility,
                value: secret.to_vec(),
            },
        );
        Ok(())
    }

    fn delete(&self, account: &str) -> VaultResult<()> {
        self.secrets.write().remove(account);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// FILE
// ═══════════════════════════════════════════════════════════════

/// Secrets in a single JSON file, rewritten atomically with owner-only
/// permissions
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> VaultResult<BTreeMap<String, StoredSecret>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let bytes = Zeroizing::new(bytes);
                Ok(serde_json::from_slice(&bytes)?)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, secrets: &BTreeMap<String, StoredSecret>) -> VaultResult<()> {
        let bytes = Zeroizing::new(serde_json::to_vec(secrets)?);
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, account: &str) -> VaultResult<Option<Zeroizing<Vec<u8>>>> {
        let _guard = self.lock.lock();
        Ok(self
            .load()?
            .get(account)
            .map(|s| Zeroizing::new(s.value.clone())))
    }

    fn set(&self, account: &str, secret: &[u8], accessibility: Accessibility) -> VaultResult<()> {
        let _guard = self.lock.lock();
        let mut secrets = self.load()?;
        secrets.insert(
            account.to_string(),
            StoredSecret {
                accessibility,
                value: secret.to_vec(),
            },
        );
        self.persist(&secrets)
    }

    fn delete(&self, account: &str) -> VaultResult<()> {
        let _guard = self.lock.lock();
        let mut secrets = self.load()?;
        if secrets.remove(account).is_some() {
            self.persist(&secrets)?;
        }
        Ok(())
    }
}

/// Read a secret that must be present
pub(crate) fn require(store: &dyn SecretStore, account: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
    store
        .get(account)?
        .ok_or_else(|| VaultError::NotFound(format!("secret '{}'", account)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_secret_store() {
        let store = MemorySecretStore::new();
        assert!(store.get("salt").unwrap().is_none());

        store
            .set("salt", b"0123", Accessibility::WhenUnlockedThisDeviceOnly)
            .unwrap();
        assert_eq!(store.get("salt").unwrap().unwrap().as_slice(), b"0123");

        store.delete("salt").unwrap();
        store.delete("salt").unwrap();
        assert!(require(&store, "salt").is_err());
    }

    #[test]
    fn test_file_secret_store_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");

        let store = FileSecretStore::new(&path);
        store
            .set("master-salt", &[7u8; 16], Accessibility::WhenUnlockedThisDeviceOnly)
            .unwrap();

        let reopened = FileSecretStore::new(&path);
        assert_eq!(reopened.get("master-salt").unwrap().unwrap().as_slice(), &[7u8; 16]);

        reopened.delete("master-salt").unwrap();
        assert!(FileSecretStore::new(&path).get("master-salt").unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_secret_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("secrets.json");
        FileSecretStore::new(&path)
            .set("k", b"v", Accessibility::WhenUnlockedThisDeviceOnly)
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
