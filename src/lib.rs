//! # Locafoto Vault
//!
//! Local-first encrypted media vault with offline transfer containers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     LOCAFOTO VAULT                       │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │ PIN → KDF   │  │ ITEM CIPHER │  │ TRANSFER CODECS │  │
//! │  │ master key  │  │ AES-256-GCM │  │ .lfs .locaphoto │  │
//! │  └──────┬──────┘  └──────┬──────┘  └────────┬────────┘  │
//! │         │                │                   │           │
//! │  ┌──────┴────────────────┴───────────────────┴────────┐ │
//! │  │                  KEY WRAPPING                       │ │
//! │  │        HKDF → K_items / K_keyring (AES-GCM)         │ │
//! │  └─────────────────────────────────────────────────────┘ │
//! │                                                          │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────┐  │
//! │  │  METADATA   │  │   KEYRING   │  │  USAGE TRACKER  │  │
//! │  │  STORE      │  │ named keys  │  │ key → imports   │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────┘  │
//! │         SQLite actors          ciphertext blob store     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - Every item sealed with its own random AES-256-GCM key
//! - Item keys stored only wrapped under the PIN-derived master key
//! - Thumbnails encrypted too
//! - Transfers name or carry the named key, never a raw item key
//! - Wrong key and tampering both surface as `Authentication`

pub mod error;
pub mod config;
pub mod crypto;
pub mod cipher;
pub mod codec;
pub mod model;
pub mod store;
pub mod blob_store;
pub mod secret_store;
pub mod batch;
pub mod vault;

pub use error::{VaultError, VaultResult};
pub use config::VaultConfig;
pub use cipher::{decrypt_item, encrypt_item, EncryptedPayload};
pub use model::{EncryptedItem, ItemFilter, KeyUsageStats, MediaType, NamedKey, NewItem};
pub use store::{Keyring, MetadataStore, StoreEvent, UsageTracker};
pub use batch::{BatchProgress, BatchReport, CancelToken};
pub use vault::{ExportFormat, Vault};

/// Locafoto Vault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
