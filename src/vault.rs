//! Locafoto Vault - Vault Facade
//!
//! Ties the cipher, key wrapping, transfer codecs and stores together.
//!
//! Local add: plaintext → fresh item key → ciphertext blob(s) written →
//! metadata record committed. Import: codec parse → named key → decrypt →
//! stored as a local item → usage recorded against the named key.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::Sha256;
use tokio::sync::broadcast;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::batch::{run_batch, BatchProgress, BatchReport, CancelToken};
use crate::blob_store::{BlobStore, FsBlobStore};
use crate::cipher::{decrypt_item, encrypt_item, encrypt_with_existing_key_material, encrypt_with_key, EncryptedPayload};
use crate::codec::{
    decode_binary, decode_bundle, decode_key_file, encode_binary, encode_bundle, encode_key_file,
    validate_key_name, BundleMetadata,
};
use crate::config::VaultConfig;
use crate::crypto::{
    derive_master_key, generate_salt, unwrap, wrap, KdfParams, MasterKeys, VaultKey, NONCE_LEN,
    TAG_LEN,
};
use crate::error::{VaultError, VaultResult};
use crate::model::{
    sniff_bytes, AlbumSummary, EncryptedItem, ItemFilter, KeyMaterial, KeyUsageStats, MediaType,
    NamedKey, NewItem, DEFAULT_ALBUM,
};
use crate::secret_store::{self, Accessibility, FileSecretStore, SecretStore};
use crate::store::{Keyring, MetadataStore, StoreEvent, UsageTracker};

/// Secret store account holding the master key salt
pub const SALT_ACCOUNT: &str = "master-salt";

/// Secret store account holding the KDF parameters used at setup
pub const KDF_ACCOUNT: &str = "master-kdf";

/// Secret store account holding the PIN verifier
pub const VERIFIER_ACCOUNT: &str = "master-check";

/// File name of the file-backed secret store
pub const SECRETS_FILE: &str = "secrets.json";

const VERIFIER_CONTEXT: &[u8] = b"LOCAFOTO:PIN-CHECK:v1";

type HmacSha256 = Hmac<Sha256>;

/// Transfer format for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// `.lfs`, references the named key by name
    Container,
    /// `.locaphoto`, carries the item key wrapped under the named key
    Bundle,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Container => "lfs",
            ExportFormat::Bundle => "locaphoto",
        }
    }
}

/// Encrypted media vault
pub struct Vault {
    root: PathBuf,
    config: VaultConfig,
    secrets: Arc<dyn SecretStore>,
    blobs: Arc<dyn BlobStore>,
    items: MetadataStore,
    usage: UsageTracker,
    keyring: Keyring,
    /// Wrapping keys, present only while unlocked
    keys: RwLock<Option<Arc<MasterKeys>>>,
    /// Shared by blob writers, exclusive for orphan reclamation
    blob_writes: tokio::sync::RwLock<()>,
    /// Shared by imports until usage is recorded, exclusive for key deletion
    key_uses: tokio::sync::RwLock<()>,
}

impl Vault {
    // ═══════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════

    /// Open the vault at `root` with on-disk config, secrets and blobs.
    /// The vault starts locked.
    pub fn open<P: AsRef<Path>>(root: P) -> VaultResult<Self> {
        let root = root.as_ref();
        let config = VaultConfig::load_or_default(root)?;
        let secrets = Arc::new(FileSecretStore::new(&root.join(SECRETS_FILE)));
        let blobs = Arc::new(FsBlobStore::open(&config.blobs_path(root))?);
        Self::open_with(root, config, secrets, blobs)
    }

    /// Open with explicit collaborators
    pub fn open_with(
        root: &Path,
        config: VaultConfig,
        secrets: Arc<dyn SecretStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> VaultResult<Self> {
        fs::create_dir_all(root)?;
        let db_path = config.database_path(root);

        let items = MetadataStore::open(
            &db_path,
            config.store_channel_capacity,
            config.event_channel_capacity,
        )?;
        let usage = UsageTracker::open(&db_path, config.store_channel_capacity)?;
        let keyring = Keyring::open(&db_path, config.store_channel_capacity)?;

        log::info!("vault opened at {}", root.display());

        Ok(Self {
            root: root.to_path_buf(),
            config,
            secrets,
            blobs,
            items,
            usage,
            keyring,
            keys: RwLock::new(None),
            blob_writes: tokio::sync::RwLock::new(()),
            key_uses: tokio::sync::RwLock::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// A master key salt has been set up
    pub fn is_initialized(&self) -> VaultResult<bool> {
        Ok(self.secrets.get(SALT_ACCOUNT)?.is_some())
    }

    /// First-time setup: derive the master key from `pin` and leave the
    /// vault unlocked
    pub fn initialize(&self, pin: &str) -> VaultResult<()> {
        if self.is_initialized()? {
            return Err(VaultError::AlreadyInitialized);
        }

        let salt = generate_salt();
        let master = derive_master_key(pin, &salt, &self.config.kdf)?;
        let verifier = pin_verifier(&master)?;

        let access = Accessibility::WhenUnlockedThisDeviceOnly;
        self.secrets
            .set(KDF_ACCOUNT, &serde_json::to_vec(&self.config.kdf)?, access)?;
        self.secrets.set(VERIFIER_ACCOUNT, &verifier, access)?;
        self.secrets.set(SALT_ACCOUNT, &salt, access)?;

        *self.keys.write() = Some(Arc::new(MasterKeys::from_master(&master)?));
        log::info!("vault initialized");
        Ok(())
    }

    /// Derive the master key from `pin`. A wrong PIN is `Authentication`.
    pub fn unlock(&self, pin: &str) -> VaultResult<()> {
        let salt = secret_store::require(self.secrets.as_ref(), SALT_ACCOUNT)?;
        let kdf: KdfParams = match self.secrets.get(KDF_ACCOUNT)? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => self.config.kdf.clone(),
        };
        let expected = secret_store::require(self.secrets.as_ref(), VERIFIER_ACCOUNT)?;

        let master = derive_master_key(pin, &salt, &kdf)?;
        let mut mac = HmacSha256::new_from_slice(master.expose())
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
        mac.update(VERIFIER_CONTEXT);
        if mac.verify_slice(&expected).is_err() {
            log::warn!("unlock rejected");
            return Err(VaultError::Authentication);
        }

        *self.keys.write() = Some(Arc::new(MasterKeys::from_master(&master)?));
        log::info!("vault unlocked");
        Ok(())
    }

    /// Drop the wrapping keys
    pub fn lock(&self) {
        *self.keys.write() = None;
        log::info!("vault locked");
    }

    pub fn is_unlocked(&self) -> bool {
        self.keys.read().is_some()
    }

    /// Lock, flush and stop every store
    pub async fn shutdown(&self) -> VaultResult<()> {
        self.lock();
        self.items.shutdown().await?;
        self.usage.shutdown().await?;
        self.keyring.shutdown().await?;
        log::info!("vault shut down");
        Ok(())
    }

    fn master_keys(&self) -> VaultResult<Arc<MasterKeys>> {
        self.keys.read().clone().ok_or(VaultError::VaultLocked)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // NAMED KEYS
    // ═══════════════════════════════════════════════════════════════════════

    /// Create a random named key
    pub async fn create_key(&self, name: &str) -> VaultResult<NamedKey> {
        self.store_named_key(name, &VaultKey::generate()).await
    }

    /// Import a `.lfkey` file. Returns the key name.
    pub async fn import_named_key(&self, file: &[u8]) -> VaultResult<String> {
        let (name, key) = decode_key_file(file)?;
        self.store_named_key(&name, &key).await?;
        Ok(name)
    }

    /// Import a hex-encoded 256-bit key under `name`
    pub async fn import_hex_key(&self, name: &str, hex_key: &str) -> VaultResult<NamedKey> {
        let cleaned: String = hex_key.split_whitespace().collect();
        let cleaned = cleaned.strip_prefix("0x").unwrap_or(&cleaned);
        let raw = Zeroizing::new(
            hex::decode(cleaned).map_err(|e| VaultError::InvalidFormat(format!("hex key: {}", e)))?,
        );
        let key = VaultKey::from_slice(&raw)?;
        self.store_named_key(name, &key).await
    }

    /// Export a named key as a `.lfkey` file. The output holds the raw key.
    pub async fn export_named_key(&self, name: &str) -> VaultResult<Vec<u8>> {
        let key = self.named_key(name).await?;
        encode_key_file(name, &key)
    }

    /// Delete a named key that no imported item depends on
    pub async fn delete_key(&self, name: &str) -> VaultResult<()> {
        let _exclusive = self.key_uses.write().await;
        let usage = self.usage.usage_count(name).await?;
        self.keyring.delete(name, usage).await
    }

    /// Usage statistics of every named key
    pub async fn key_stats(&self) -> VaultResult<Vec<KeyUsageStats>> {
        let counts = self.usage.counts().await?;
        let keys = self.keyring.list().await?;

        Ok(keys
            .into_iter()
            .map(|key| {
                let usage_count = counts.get(&key.name).copied().unwrap_or(0);
                KeyUsageStats {
                    name: key.name,
                    created_at: key.created_at,
                    usage_count,
                    last_used_at: key.last_used_at,
                    deletable: usage_count == 0,
                }
            })
            .collect())
    }

    async fn store_named_key(&self, name: &str, key: &VaultKey) -> VaultResult<NamedKey> {
        validate_key_name(name)?;
        let keys = self.master_keys()?;

        let named = NamedKey {
            name: name.to_string(),
            created_at: Utc::now(),
            wrapped_key: wrap(key, keys.keyring_key())?,
            last_used_at: None,
        };
        self.keyring.insert(named.clone()).await?;
        Ok(named)
    }

    async fn named_key(&self, name: &str) -> VaultResult<VaultKey> {
        let keys = self.master_keys()?;
        let named = self
            .keyring
            .get(name)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("key '{}'", name)))?;
        unwrap(&named.wrapped_key, keys.keyring_key())
    }

    async fn mark_used(&self, item_id: Uuid, key_name: &str) -> VaultResult<()> {
        self.usage.record_import(item_id, key_name).await?;
        self.keyring.touch(key_name, Utc::now()).await?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // ITEMS
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt and store a new item
    pub async fn add_item(&self, input: NewItem) -> VaultResult<EncryptedItem> {
        self.seal_and_store(Uuid::new_v4(), input, None).await
    }

    async fn seal_and_store(
        &self,
        id: Uuid,
        input: NewItem,
        source_key: Option<String>,
    ) -> VaultResult<EncryptedItem> {
        let keys = self.master_keys()?;
        let _writing = self.blob_writes.read().await;

        let sniffed = sniff_bytes(&input.data);
        let format = input
            .format
            .clone()
            .or_else(|| sniffed.map(|s| s.format.to_string()))
            .unwrap_or_else(|| "unknown".to_string());
        let media_type = sniffed
            .map(|s| s.media_type)
            .or_else(|| MediaType::from_format(&format));

        let (payload, item_key) = encrypt_item(&input.data)?;
        let key_material = KeyMaterial {
            wrapped_key: wrap(&item_key, keys.items_key())?,
            nonce: payload.nonce.clone(),
            tag: payload.tag.clone(),
        };

        // Ciphertext first under fresh names; a failure past this point
        // leaves only orphans and never touches a committed item's blobs
        let generation = format!("{:016x}", rand::random::<u64>());
        let blob_path = format!("items/{}-{}.enc", id, generation);
        self.blobs.write(&blob_path, &payload.ciphertext)?;

        let (thumbnail_path, thumbnail_key) = match input.thumbnail {
            None => (None, None),
            Some(ref thumbnail) => {
                let path = format!("thumbs/{}-{}.enc", id, generation);
                let material = if self.config.separate_thumbnail_keys {
                    let (thumb, thumb_key) = encrypt_item(thumbnail)?;
                    self.blobs.write(&path, &thumb.ciphertext)?;
                    Some(KeyMaterial {
                        wrapped_key: wrap(&thumb_key, keys.items_key())?,
                        nonce: thumb.nonce,
                        tag: thumb.tag,
                    })
                } else {
                    let thumb =
                        encrypt_with_existing_key_material(thumbnail, &item_key, &payload.nonce)?;
                    self.blobs.write(&path, &thumb.ciphertext_with_tag())?;
                    None
                };
                (Some(path), material)
            }
        };

        let now = Utc::now();
        let item = EncryptedItem {
            id,
            key_material,
            thumbnail_key,
            capture_date: input.capture_date.unwrap_or(now),
            import_date: now,
            modified_date: now,
            original_size: input.data.len() as u64,
            encrypted_size: payload.ciphertext.len() as u64,
            width: input.width,
            height: input.height,
            duration_secs: input.duration_secs,
            location: input.location,
            format,
            media_type,
            blob_path,
            thumbnail_path,
            album_id: input.album_id.unwrap_or(DEFAULT_ALBUM),
            tags: input.tags,
            is_favorite: false,
            is_hidden: false,
            source_key,
        };

        let replaced = self.items.add(item.clone()).await?;
        log::debug!("stored item {} ({} bytes)", id, item.original_size);

        if let Some(old) = replaced {
            let stale = std::iter::once(old.blob_path).chain(old.thumbnail_path);
            for path in stale {
                if let Err(e) = self.blobs.delete(&path) {
                    log::warn!("failed to delete replaced blob {}: {}", path, e);
                }
            }
        }
        Ok(item)
    }

    pub async fn get_item(&self, id: Uuid) -> VaultResult<EncryptedItem> {
        self.items
            .get(id)
            .await?
            .ok_or_else(|| VaultError::NotFound(format!("item {}", id)))
    }

    /// Decrypt an item's primary payload
    pub async fn read_item(&self, id: Uuid) -> VaultResult<Vec<u8>> {
        let item = self.get_item(id).await?;
        let keys = self.master_keys()?;

        let item_key = unwrap(&item.key_material.wrapped_key, keys.items_key())?;
        let payload = EncryptedPayload {
            ciphertext: self.blobs.read(&item.blob_path)?,
            nonce: item.key_material.nonce.clone(),
            tag: item.key_material.tag.clone(),
        };
        decrypt_item(&payload, &item_key)
    }

    /// Decrypt an item's thumbnail, if it has one
    pub async fn read_thumbnail(&self, id: Uuid) -> VaultResult<Option<Vec<u8>>> {
        let item = self.get_item(id).await?;
        let Some(ref path) = item.thumbnail_path else {
            return Ok(None);
        };
        let keys = self.master_keys()?;
        let blob = self.blobs.read(path)?;

        let (payload, key) = match item.thumbnail_key {
            Some(ref material) => (
                EncryptedPayload {
                    ciphertext: blob,
                    nonce: material.nonce.clone(),
                    tag: material.tag.clone(),
                },
                unwrap(&material.wrapped_key, keys.items_key())?,
            ),
            None => (
                EncryptedPayload::from_ciphertext_with_tag(&blob, item.key_material.nonce.clone())?,
                unwrap(&item.key_material.wrapped_key, keys.items_key())?,
            ),
        };
        decrypt_item(&payload, &key).map(Some)
    }

    /// Delete an item, its blobs and its usage record. Returns whether the
    /// item existed; deleting twice is not an error.
    pub async fn delete_item(&self, id: Uuid) -> VaultResult<bool> {
        let item = self.items.get(id).await?;

        // Metadata and tracking first so no record ever points at deleted
        // ciphertext; a failed blob delete leaves only orphans
        self.items.remove(id).await?;
        self.usage.delete_tracking(id).await?;
        if let Some(ref item) = item {
            self.blobs.delete(&item.blob_path)?;
            if let Some(ref thumb) = item.thumbnail_path {
                self.blobs.delete(thumb)?;
            }
        }

        if item.is_some() {
            log::info!("deleted item {}", id);
        }
        Ok(item.is_some())
    }

    /// Every item, newest capture first
    pub async fn all_items(&self) -> VaultResult<Vec<EncryptedItem>> {
        self.items.get_all().await
    }

    pub async fn list_items(&self, filter: ItemFilter) -> VaultResult<Vec<EncryptedItem>> {
        self.items.filter(filter).await
    }

    pub async fn album_items(&self, album_id: Uuid) -> VaultResult<Vec<EncryptedItem>> {
        self.items.get_by_album(album_id).await
    }

    pub async fn albums(&self) -> VaultResult<Vec<AlbumSummary>> {
        self.items.album_summaries().await
    }

    pub async fn update_album(&self, id: Uuid, album_id: Uuid) -> VaultResult<bool> {
        self.items.update_album(id, album_id).await
    }

    pub async fn set_favorite(&self, id: Uuid, favorite: bool) -> VaultResult<bool> {
        self.items.set_favorite(id, favorite).await
    }

    pub async fn set_hidden(&self, id: Uuid, hidden: bool) -> VaultResult<bool> {
        self.items.set_hidden(id, hidden).await
    }

    pub async fn set_tags(&self, id: Uuid, tags: Vec<String>) -> VaultResult<bool> {
        self.items.set_tags(id, tags).await
    }

    /// Committed metadata changes
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.items.subscribe()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // TRANSFER
    // ═══════════════════════════════════════════════════════════════════════

    /// Export an item as a `.lfs` container sealed directly under a named key
    pub async fn export_container(&self, id: Uuid, key_name: &str) -> VaultResult<Vec<u8>> {
        let plaintext = Zeroizing::new(self.read_item(id).await?);
        let named = self.named_key(key_name).await?;

        let payload = encrypt_with_key(&plaintext, &named)?;
        let nonce: [u8; NONCE_LEN] = payload
            .nonce
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::MalformedPayload("nonce".into()))?;
        let tag: [u8; TAG_LEN] = payload
            .tag
            .as_slice()
            .try_into()
            .map_err(|_| VaultError::MalformedPayload("tag".into()))?;

        log::info!("exporting item {} as container for key '{}'", id, key_name);
        encode_binary(key_name, &payload.ciphertext, &nonce, &tag)
    }

    /// Import a `.lfs` container. The named key it references must exist.
    pub async fn import_container(&self, bytes: &[u8]) -> VaultResult<EncryptedItem> {
        let container = decode_binary(bytes)?;
        let _using = self.key_uses.read().await;
        let named = self.named_key(&container.key_name).await?;
        let plaintext = Zeroizing::new(decrypt_item(&container.payload(), &named)?);

        let input = NewItem::new(plaintext.to_vec());
        let item = self
            .seal_and_store(Uuid::new_v4(), input, Some(container.key_name.clone()))
            .await?;
        self.mark_used(item.id, &container.key_name).await?;

        log::info!("imported container as item {} with key '{}'", item.id, container.key_name);
        Ok(item)
    }

    /// Export an item as a `.locaphoto` bundle. The stored ciphertext is
    /// reused; only the item key is rewrapped under the named key.
    pub async fn export_bundle(&self, id: Uuid, key_name: &str) -> VaultResult<Vec<u8>> {
        let item = self.get_item(id).await?;
        let keys = self.master_keys()?;

        let item_key = unwrap(&item.key_material.wrapped_key, keys.items_key())?;
        let named = self.named_key(key_name).await?;
        let wrapped = wrap(&item_key, &named)?;

        let payload = EncryptedPayload {
            ciphertext: self.blobs.read(&item.blob_path)?,
            nonce: item.key_material.nonce.clone(),
            tag: item.key_material.tag.clone(),
        };
        let metadata = BundleMetadata {
            original_size: item.original_size,
            capture_date: item.capture_date,
            width: item.width,
            height: item.height,
            format: item.format.clone(),
        };

        log::info!("exporting item {} as bundle for key '{}'", id, key_name);
        encode_bundle(item.id, &payload, &wrapped, &metadata)
    }

    /// Import a `.locaphoto` bundle, trying each named key until one opens
    /// the wrapped item key
    pub async fn import_bundle(&self, bytes: &[u8]) -> VaultResult<EncryptedItem> {
        let bundle = decode_bundle(bytes)?;
        let keys = self.master_keys()?;
        let _using = self.key_uses.read().await;

        let mut opened = None;
        for named in self.keyring.list().await? {
            let named_key = unwrap(&named.wrapped_key, keys.keyring_key())?;
            if let Ok(item_key) = unwrap(&bundle.photo.encrypted_key, &named_key) {
                opened = Some((named.name, item_key));
                break;
            }
        }
        let Some((key_name, item_key)) = opened else {
            log::warn!("no named key opens bundle {}", bundle.photo.id);
            return Err(VaultError::Authentication);
        };

        let plaintext = Zeroizing::new(decrypt_item(&bundle.photo.payload, &item_key)?);
        let meta = bundle.metadata;
        let input = NewItem {
            data: plaintext.to_vec(),
            capture_date: Some(meta.capture_date),
            width: meta.width,
            height: meta.height,
            format: Some(meta.format),
            ..Default::default()
        };

        let item = self
            .seal_and_store(bundle.photo.id, input, Some(key_name.clone()))
            .await?;
        self.mark_used(item.id, &key_name).await?;

        log::info!("imported bundle {} with key '{}'", item.id, key_name);
        Ok(item)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // BATCH
    // ═══════════════════════════════════════════════════════════════════════

    /// Import files one at a time: `.lfs` as containers, `.locaphoto` as
    /// bundles, anything else as a new local item
    pub async fn import_files<P>(
        &self,
        paths: Vec<PathBuf>,
        cancel: &CancelToken,
        progress: P,
    ) -> BatchReport<EncryptedItem>
    where
        P: FnMut(&BatchProgress),
    {
        run_batch(
            paths,
            |path| path.display().to_string(),
            cancel,
            progress,
            |path| self.import_file(path),
        )
        .await
    }

    async fn import_file(&self, path: PathBuf) -> VaultResult<EncryptedItem> {
        let bytes = Zeroizing::new(fs::read(&path)?);
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match extension.as_deref() {
            Some("lfs") => self.import_container(&bytes).await,
            Some("locaphoto") => self.import_bundle(&bytes).await,
            _ => self.add_item(NewItem::new(bytes.to_vec())).await,
        }
    }

    /// Export items into `out_dir` as `<id>.<ext>`
    pub async fn export_items<P>(
        &self,
        ids: Vec<Uuid>,
        key_name: &str,
        format: ExportFormat,
        out_dir: &Path,
        cancel: &CancelToken,
        progress: P,
    ) -> VaultResult<BatchReport<PathBuf>>
    where
        P: FnMut(&BatchProgress),
    {
        fs::create_dir_all(out_dir)?;
        Ok(run_batch(
            ids,
            |id| id.to_string(),
            cancel,
            progress,
            |id| self.export_one(id, key_name, format, out_dir),
        )
        .await)
    }

    async fn export_one(
        &self,
        id: Uuid,
        key_name: &str,
        format: ExportFormat,
        out_dir: &Path,
    ) -> VaultResult<PathBuf> {
        let bytes = match format {
            ExportFormat::Container => self.export_container(id, key_name).await?,
            ExportFormat::Bundle => self.export_bundle(id, key_name).await?,
        };
        let path = out_dir.join(format!("{}.{}", id, format.extension()));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // MAINTENANCE
    // ═══════════════════════════════════════════════════════════════════════

    /// Delete blobs that no metadata record references. Waits for in-flight
    /// adds and imports, and refuses to run while any stored record is
    /// unreadable. Returns the removed blob ids.
    pub async fn reclaim_orphans(&self) -> VaultResult<Vec<String>> {
        let _exclusive = self.blob_writes.write().await;
        let referenced = self.items.referenced_blobs().await?;

        let mut removed = Vec::new();
        for id in self.blobs.list()? {
            if !referenced.contains(&id) {
                log::warn!("reclaiming orphan blob {}", id);
                self.blobs.delete(&id)?;
                removed.push(id);
            }
        }
        Ok(removed)
    }
}

fn pin_verifier(master: &VaultKey) -> VaultResult<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(master.expose())
        .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
    mac.update(VERIFIER_CONTEXT);
    Ok(mac.finalize().into_bytes().to_vec())
}
