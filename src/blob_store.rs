//! Locafoto Vault - Ciphertext Blob Storage
//!
//! Blobs are opaque ciphertext addressed by a relative id such as
//! `items/<uuid>.enc`. The vault never hands plaintext to a blob store.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use parking_lot::RwLock;
use walkdir::WalkDir;

use crate::error::{VaultError, VaultResult};

/// Suffix of in-flight atomic writes
const TEMP_SUFFIX: &str = ".tmp";

/// Storage for ciphertext blobs
pub trait BlobStore: Send + Sync {
    /// Atomically write a blob, replacing any previous content
    fn write(&self, id: &str, data: &[u8]) -> VaultResult<()>;

    /// Read a blob. Missing blobs are `NotFound`.
    fn read(&self, id: &str) -> VaultResult<Vec<u8>>;

    /// Delete a blob. Deleting a missing blob succeeds.
    fn delete(&self, id: &str) -> VaultResult<()>;

    fn exists(&self, id: &str) -> VaultResult<bool>;

    /// Ids of every stored blob
    fn list(&self) -> VaultResult<Vec<String>>;
}

/// Reject ids that could escape the blob root
fn check_id(id: &str) -> VaultResult<()> {
    let invalid = id.is_empty()
        || id.contains('\\')
        || id.ends_with(TEMP_SUFFIX)
        || Path::new(id)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));

    if invalid {
        return Err(VaultError::NameValidation(format!("invalid blob id {:?}", id)));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
// FILESYSTEM
// ═══════════════════════════════════════════════════════════════

/// Blob store rooted at a directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store, creating the root directory if needed
    pub fn open(root: &Path) -> VaultResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn full_path(&self, id: &str) -> VaultResult<PathBuf> {
        check_id(id)?;
        Ok(self.root.join(id))
    }

    /// Overwrite with zeros before unlinking
    fn scrub(path: &Path) -> std::io::Result<()> {
        let size = fs::metadata(path)?.len() as usize;
        if size == 0 {
            return Ok(());
        }

        let mut file = OpenOptions::new().write(true).open(path)?;
        let zeros = vec![0u8; size.min(1024 * 1024)];
        let mut remaining = size;
        while remaining > 0 {
            let chunk = remaining.min(zeros.len());
            file.write_all(&zeros[..chunk])?;
            remaining -= chunk;
        }
        file.sync_all()
    }
}

impl BlobStore for FsBlobStore {
    fn write(&self, id: &str, data: &[u8]) -> VaultResult<()> {
        let path = self.full_path(id)?;
        let parent = path.parent().unwrap_or(&self.root).to_path_buf();
        fs::create_dir_all(&parent)?;

        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(TEMP_SUFFIX);
        let temp_path = PathBuf::from(temp_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &path)?;

        #[cfg(unix)]
        File::open(&parent)?.sync_all()?;

        log::debug!("wrote blob {} ({} bytes)", id, data.len());
        Ok(())
    }

    fn read(&self, id: &str) -> VaultResult<Vec<u8>> {
        let path = self.full_path(id)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("blob {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &str) -> VaultResult<()> {
        let path = self.full_path(id)?;
        if !path.exists() {
            return Ok(());
        }

        if let Err(e) = Self::scrub(&path) {
            log::warn!("could not scrub blob {} before delete: {}", id, e);
        }
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, id: &str) -> VaultResult<bool> {
        Ok(self.full_path(id)?.is_file())
    }

    fn list(&self) -> VaultResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1) {
            let entry = entry.map_err(|e| VaultError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let id = relative
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .collect::<Vec<_>>()
                .join("/");
            if !id.ends_with(TEMP_SUFFIX) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

// ═══════════════════════════════════════════════════════════════
// MEMORY
// ═══════════════════════════════════════════════════════════════

/// In-memory blob store for tests and previews
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, id: &str, data: &[u8]) -> VaultResult<()> {
        check_id(id)?;
        self.blobs.write().insert(id.to_string(), data.to_vec());
        Ok(())
    }

    fn read(&self, id: &str) -> VaultResult<Vec<u8>> {
        check_id(id)?;
        self.blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("blob {}", id)))
    }

    fn delete(&self, id: &str) -> VaultResult<()> {
        check_id(id)?;
        self.blobs.write().remove(id);
        Ok(())
    }

    fn exists(&self, id: &str) -> VaultResult<bool> {
        check_id(id)?;
        Ok(self.blobs.read().contains_key(id))
    }

    fn list(&self) -> VaultResult<Vec<String>> {
        Ok(self.blobs.read().keys().cloned().collect())
    }
}
