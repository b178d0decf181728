//! Locafoto Vault - Configuration
//!
//! Stored as `vault.json` in the vault root and created with defaults on
//! first open.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crypto::KdfParams;
use crate::error::{VaultError, VaultResult};

/// File name of the config inside the vault root
pub const CONFIG_FILE: &str = "vault.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Master key derivation
    pub kdf: KdfParams,
    /// Encrypt thumbnails under their own key. When off, thumbnails reuse
    /// the primary item's key and nonce.
    pub separate_thumbnail_keys: bool,
    /// Command queue depth of each store
    pub store_channel_capacity: usize,
    /// Buffered store events per subscriber
    pub event_channel_capacity: usize,
    pub database_file: String,
    pub blobs_dir: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            separate_thumbnail_keys: true,
            store_channel_capacity: 64,
            event_channel_capacity: 32,
            database_file: "vault.db".to_string(),
            blobs_dir: "blobs".to_string(),
        }
    }
}

impl VaultConfig {
    /// Load `<root>/vault.json`, writing the defaults if it does not exist
    pub fn load_or_default(root: &Path) -> VaultResult<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            let config = Self::default();
            config.save(root)?;
            log::info!("created default config at {}", path.display());
            return Ok(config);
        }

        let bytes = fs::read(&path)?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Both paths must name a single entry below the vault root
    pub fn validate(&self) -> VaultResult<()> {
        check_entry("database_file", &self.database_file)?;
        check_entry("blobs_dir", &self.blobs_dir)?;
        if self.database_file == self.blobs_dir {
            return Err(VaultError::Config(
                "database_file and blobs_dir must differ".into(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, root: &Path) -> VaultResult<()> {
        self.validate()?;
        fs::create_dir_all(root)?;
        let path = root.join(CONFIG_FILE);
        let temp = path.with_extension("json.tmp");
        fs::write(&temp, serde_json::to_vec_pretty(self)?)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    pub fn database_path(&self, root: &Path) -> PathBuf {
        root.join(&self.database_file)
    }

    pub fn blobs_path(&self, root: &Path) -> PathBuf {
        root.join(&self.blobs_dir)
    }
}

fn check_entry(field: &str, value: &str) -> VaultResult<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(VaultError::Config(format!(
            "{} must be a plain name inside the vault root, got {:?}",
            field, value
        ))),
    }
}
