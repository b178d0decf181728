//! Locafoto Vault - Data Model
//!
//! Encrypted item records, named keys and usage records, plus the
//! backward-compatible decoding of stored item records.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::WrappedKey;
use crate::error::VaultResult;

/// Album every item belongs to until moved
pub const DEFAULT_ALBUM: Uuid = Uuid::nil();

/// Version written into every stored item record
pub const RECORD_SCHEMA_VERSION: u32 = 2;

// ═══════════════════════════════════════════════════════════════
// MEDIA TYPE
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
}

impl MediaType {
    /// Map a format name, MIME type or file extension to a media type
    pub fn from_format(format: &str) -> Option<Self> {
        let format = format.trim().to_ascii_lowercase();
        let format = format.rsplit('/').next().unwrap_or(&format);
        match format {
            "jpeg" | "jpg" | "png" | "gif" | "webp" | "heic" | "heif" | "tiff" | "dng" => {
                Some(MediaType::Photo)
            }
            "mp4" | "mov" | "m4v" | "quicktime" | "hevc" => Some(MediaType::Video),
            _ => None,
        }
    }
}

/// Result of sniffing plaintext magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub media_type: MediaType,
    pub format: &'static str,
}

/// Detect the media format from magic bytes
pub fn sniff_bytes(data: &[u8]) -> Option<Sniffed> {
    let photo = |format| Some(Sniffed { media_type: MediaType::Photo, format });
    let video = |format| Some(Sniffed { media_type: MediaType::Video, format });

    if data.len() < 12 {
        return None;
    }

    match &data[0..8] {
        [0xFF, 0xD8, 0xFF, ..] => photo("JPEG"),
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] => photo("PNG"),
        [0x47, 0x49, 0x46, 0x38, ..] => photo("GIF"),
        [0x52, 0x49, 0x46, 0x46, ..] if &data[8..12] == b"WEBP" => photo("WEBP"),
        _ if &data[4..8] == b"ftyp" => match &data[8..12] {
            b"heic" | b"heix" | b"hevc" | b"hevx" => photo("HEIC"),
            b"mif1" | b"msf1" => photo("HEIF"),
            b"qt  " => video("MOV"),
            b"isom" | b"iso2" | b"mp41" | b"mp42" | b"avc1" | b"M4V " | b"dash" => video("MP4"),
            _ => None,
        },
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════
// ITEMS
// ═══════════════════════════════════════════════════════════════

/// Wrapped key, nonce and tag needed to open one ciphertext blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMaterial {
    pub wrapped_key: WrappedKey,
    #[serde(with = "crate::codec::b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "crate::codec::b64")]
    pub tag: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
}

/// Metadata record of one encrypted photo or video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedItem {
    pub id: Uuid,
    /// Primary payload key material
    pub key_material: KeyMaterial,
    /// Separate thumbnail key material. `None` means the thumbnail was
    /// sealed with the primary key and nonce.
    pub thumbnail_key: Option<KeyMaterial>,
    pub capture_date: DateTime<Utc>,
    pub import_date: DateTime<Utc>,
    pub modified_date: DateTime<Utc>,
    pub original_size: u64,
    pub encrypted_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<f64>,
    pub location: Option<GeoLocation>,
    pub format: String,
    pub media_type: Option<MediaType>,
    pub blob_path: String,
    pub thumbnail_path: Option<String>,
    pub album_id: Uuid,
    pub tags: Vec<String>,
    pub is_favorite: bool,
    pub is_hidden: bool,
    /// Named key that opened the transfer this item was imported from
    pub source_key: Option<String>,
}

impl EncryptedItem {
    /// Media type, sniffed from the format or blob path for legacy records
    pub fn effective_media_type(&self) -> MediaType {
        self.media_type
            .or_else(|| MediaType::from_format(&self.format))
            .or_else(|| extension_media_type(&self.blob_path))
            .unwrap_or(MediaType::Photo)
    }
}

fn extension_media_type(path: &str) -> Option<MediaType> {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(MediaType::from_format)
}

/// Input for adding a local item to the vault
#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub data: Vec<u8>,
    pub thumbnail: Option<Vec<u8>>,
    pub capture_date: Option<DateTime<Utc>>,
    pub album_id: Option<Uuid>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_secs: Option<f64>,
    pub location: Option<GeoLocation>,
    /// Overrides the sniffed format
    pub format: Option<String>,
    pub tags: Vec<String>,
}

impl NewItem {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Vec<u8>) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn in_album(mut self, album_id: Uuid) -> Self {
        self.album_id = Some(album_id);
        self
    }

    pub fn captured_at(mut self, date: DateTime<Utc>) -> Self {
        self.capture_date = Some(date);
        self
    }
}

/// Filter for item scans. The default matches every visible item.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub album: Option<Uuid>,
    pub media_type: Option<MediaType>,
    pub tag: Option<String>,
    pub favorites_only: bool,
    pub include_hidden: bool,
}

impl ItemFilter {
    pub fn matches(&self, item: &EncryptedItem) -> bool {
        if item.is_hidden && !self.include_hidden {
            return false;
        }
        if self.favorites_only && !item.is_favorite {
            return false;
        }
        if let Some(album) = self.album {
            if item.album_id != album {
                return false;
            }
        }
        if let Some(media_type) = self.media_type {
            if item.effective_media_type() != media_type {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if !item.tags.iter().any(|t| t == tag) {
                return false;
            }
        }
        true
    }
}

/// Aggregate view of one album
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumSummary {
    pub album_id: Uuid,
    pub item_count: usize,
    pub latest_capture: Option<DateTime<Utc>>,
}

/// Group items by album, ordered by album id
pub fn summarize_albums<'a>(items: impl IntoIterator<Item = &'a EncryptedItem>) -> Vec<AlbumSummary> {
    let mut albums: BTreeMap<Uuid, AlbumSummary> = BTreeMap::new();
    for item in items {
        let summary = albums.entry(item.album_id).or_insert(AlbumSummary {
            album_id: item.album_id,
            item_count: 0,
            latest_capture: None,
        });
        summary.item_count += 1;
        summary.latest_capture = summary.latest_capture.max(Some(item.capture_date));
    }
    albums.into_values().collect()
}

// ═══════════════════════════════════════════════════════════════
// KEYS AND USAGE
// ═══════════════════════════════════════════════════════════════

/// Named key as held in the keyring. Key bytes stay wrapped under the
/// device master key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedKey {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub wrapped_key: WrappedKey,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Which named key opened which imported container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub container_id: Uuid,
    pub key_name: String,
    pub imported_at: DateTime<Utc>,
}

/// Per-key statistics shown to the user before deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyUsageStats {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub usage_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub deletable: bool,
}

// ═══════════════════════════════════════════════════════════════
// RECORD ENCODING
// ═══════════════════════════════════════════════════════════════

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordOut<'a> {
    schema_version: u32,
    #[serde(flatten)]
    item: &'a EncryptedItem,
}

/// Stored record as it may appear from any schema version. Fields added
/// after version 1 are optional here and filled from the default table in
/// `decode_record`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordIn {
    #[serde(default = "legacy_schema")]
    schema_version: u32,
    id: Uuid,
    key_material: KeyMaterial,
    #[serde(default)]
    thumbnail_key: Option<KeyMaterial>,
    capture_date: DateTime<Utc>,
    import_date: DateTime<Utc>,
    #[serde(default)]
    modified_date: Option<DateTime<Utc>>,
    original_size: u64,
    encrypted_size: u64,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    duration_secs: Option<f64>,
    #[serde(default)]
    location: Option<GeoLocation>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    media_type: Option<MediaType>,
    blob_path: String,
    #[serde(default)]
    thumbnail_path: Option<String>,
    #[serde(default)]
    album_id: Option<Uuid>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    is_favorite: Option<bool>,
    #[serde(default)]
    is_hidden: Option<bool>,
    #[serde(default)]
    source_key: Option<String>,
}

fn legacy_schema() -> u32 {
    1
}

/// Serialize an item record with the current schema version
pub fn encode_record(item: &EncryptedItem) -> VaultResult<Vec<u8>> {
    Ok(serde_json::to_vec(&RecordOut {
        schema_version: RECORD_SCHEMA_VERSION,
        item,
    })?)
}

/// Decode a stored record, applying the default table:
///
/// | field         | default                                  |
/// |---------------|------------------------------------------|
/// | isFavorite    | `false`                                  |
/// | isHidden      | `false`                                  |
/// | mediaType     | sniffed from `format`, then path extension |
/// | format        | `"unknown"`                              |
/// | tags          | empty                                    |
/// | modifiedDate  | `importDate`                             |
/// | albumId       | default album                            |
///
/// Returns the names of the fields that were defaulted.
pub fn decode_record(bytes: &[u8]) -> VaultResult<(EncryptedItem, Vec<&'static str>)> {
    let record: RecordIn = serde_json::from_slice(bytes)?;
    let mut defaulted = Vec::new();

    let mut fill = |field: &'static str, present: bool| {
        if !present {
            defaulted.push(field);
        }
    };
    fill("isFavorite", record.is_favorite.is_some());
    fill("isHidden", record.is_hidden.is_some());
    fill("format", record.format.is_some());
    fill("tags", record.tags.is_some());
    fill("modifiedDate", record.modified_date.is_some());
    fill("albumId", record.album_id.is_some());

    let format = record.format.unwrap_or_else(|| "unknown".to_string());
    let media_type = match record.media_type {
        Some(media_type) => Some(media_type),
        None => {
            defaulted.push("mediaType");
            MediaType::from_format(&format).or_else(|| extension_media_type(&record.blob_path))
        }
    };

    log::trace!(
        "decoded item {} (schema v{})",
        record.id,
        record.schema_version
    );

    let item = EncryptedItem {
        id: record.id,
        key_material: record.key_material,
        thumbnail_key: record.thumbnail_key,
        capture_date: record.capture_date,
        import_date: record.import_date,
        modified_date: record.modified_date.unwrap_or(record.import_date),
        original_size: record.original_size,
        encrypted_size: record.encrypted_size,
        width: record.width,
        height: record.height,
        duration_secs: record.duration_secs,
        location: record.location,
        format,
        media_type,
        blob_path: record.blob_path,
        thumbnail_path: record.thumbnail_path,
        album_id: record.album_id.unwrap_or(DEFAULT_ALBUM),
        tags: record.tags.unwrap_or_default(),
        is_favorite: record.is_favorite.unwrap_or(false),
        is_hidden: record.is_hidden.unwrap_or(false),
        source_key: record.source_key,
    };

    Ok((item, defaulted))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    pub(crate) fn sample_item(capture_offset_days: i64) -> EncryptedItem {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let id = Uuid::new_v4();
        EncryptedItem {
            id,
            key_material: KeyMaterial {
                wrapped_key: WrappedKey::from_bytes(vec![1; 60]),
                nonce: vec![2; 12],
                tag: vec![3; 16],
            },
            thumbnail_key: None,
            capture_date: base + Duration::days(capture_offset_days),
            import_date: base,
            modified_date: base,
            original_size: 10,
            encrypted_size: 10,
            width: None,
            height: None,
            duration_secs: None,
            location: None,
            format: "JPEG".into(),
            media_type: Some(MediaType::Photo),
            blob_path: format!("items/{}.enc", id),
            thumbnail_path: None,
            album_id: DEFAULT_ALBUM,
            tags: Vec::new(),
            is_favorite: false,
            is_hidden: false,
            source_key: None,
        }
    }

    #[test]
    fn test_sniff_bytes() {
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE0];
        jpeg.resize(16, 0);
        assert_eq!(sniff_bytes(&jpeg).unwrap().format, "JPEG");

        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(sniff_bytes(&png).unwrap().media_type, MediaType::Photo);

        let mov = b"\0\0\0\x14ftypqt  \0\0\0\0";
        let sniffed = sniff_bytes(mov).unwrap();
        assert_eq!(sniffed.media_type, MediaType::Video);
        assert_eq!(sniffed.format, "MOV");

        let heic = b"\0\0\0\x18ftypheic\0\0\0\0";
        assert_eq!(sniff_bytes(heic).unwrap().format, "HEIC");

        assert!(sniff_bytes(b"plain text file").is_none());
        assert!(sniff_bytes(&[0xFF, 0xD8]).is_none());
    }

    #[test]
    fn test_from_format() {
        assert_eq!(MediaType::from_format("image/jpeg"), Some(MediaType::Photo));
        assert_eq!(MediaType::from_format("MOV"), Some(MediaType::Video));
        assert_eq!(MediaType::from_format("txt"), None);
    }

    #[test]
    fn test_record_roundtrip_carries_schema_version() {
        let item = sample_item(0);
        let bytes = encode_record(&item).unwrap();

        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["schemaVersion"], RECORD_SCHEMA_VERSION);

        let (decoded, defaulted) = decode_record(&bytes).unwrap();
        assert_eq!(decoded, item);
        assert!(defaulted.is_empty());
    }

    #[test]
    fn test_legacy_record_gets_defaults() {
        let item = sample_item(0);
        let mut json = serde_json::to_value(&item).unwrap();
        let obj = json.as_object_mut().unwrap();
        for field in ["isFavorite", "isHidden", "mediaType", "tags", "modifiedDate", "albumId"] {
            obj.remove(field);
        }
        obj.insert("format".into(), json!("MOV"));

        let (decoded, defaulted) = decode_record(json.to_string().as_bytes()).unwrap();
        assert!(!decoded.is_favorite);
        assert!(!decoded.is_hidden);
        assert_eq!(decoded.media_type, Some(MediaType::Video));
        assert_eq!(decoded.modified_date, decoded.import_date);
        assert_eq!(decoded.album_id, DEFAULT_ALBUM);
        assert!(decoded.tags.is_empty());
        assert!(defaulted.contains(&"mediaType"));
        assert!(defaulted.contains(&"isFavorite"));
    }

    #[test]
    fn test_effective_media_type_sniffs() {
        let mut item = sample_item(0);
        item.media_type = None;
        item.format = "unknown".into();
        item.blob_path = "legacy/clip.mp4".into();
        assert_eq!(item.effective_media_type(), MediaType::Video);

        item.blob_path = "legacy/blob".into();
        assert_eq!(item.effective_media_type(), MediaType::Photo);
    }

    #[test]
    fn test_filter_and_summaries() {
        let album = Uuid::new_v4();
        let mut a = sample_item(1);
        a.album_id = album;
        a.is_favorite = true;
        a.tags = vec!["beach".into()];
        let mut b = sample_item(5);
        b.album_id = album;
        b.is_hidden = true;
        let c = sample_item(3);

        let visible = ItemFilter::default();
        assert!(visible.matches(&a) && !visible.matches(&b) && visible.matches(&c));

        let favorites = ItemFilter { favorites_only: true, ..Default::default() };
        assert!(favorites.matches(&a) && !favorites.matches(&c));

        let tagged = ItemFilter { tag: Some("beach".into()), ..Default::default() };
        assert!(tagged.matches(&a) && !tagged.matches(&c));

        let summaries = summarize_albums([&a, &b, &c]);
        let in_album = summaries.iter().find(|s| s.album_id == album).unwrap();
        assert_eq!(in_album.item_count, 2);
        assert_eq!(in_album.latest_capture, Some(b.capture_date));
        assert_eq!(summaries.len(), 2);
    }
}
