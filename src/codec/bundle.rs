//! Self-contained JSON bundle (`.locaphoto`)
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "photo": { "id", "encryptedData", "encryptedKey", "iv", "authTag" },
//!   "metadata": { "originalSize", "captureDate", "width", "height", "format" }
//! }
//! ```
//! Binary fields are standard base64, `captureDate` is ISO-8601.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cipher::EncryptedPayload;
use crate::crypto::{WrappedKey, NONCE_LEN, TAG_LEN};
use crate::error::{VaultError, VaultResult};

use super::b64;

/// Only bundle version this build reads and writes
pub const BUNDLE_VERSION: &str = "1.0";

/// Shortest `encryptedData` a bundle may carry
const MIN_DATA_LEN: usize = 1;

/// Shortest `encryptedKey`: nonce, tag and at least one key byte
const MIN_WRAPPED_LEN: usize = NONCE_LEN + TAG_LEN + 1;

/// Decoded bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferBundle {
    pub version: String,
    pub photo: BundlePhoto,
    pub metadata: BundleMetadata,
}

/// Encrypted item carried by a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePhoto {
    pub id: Uuid,
    pub payload: EncryptedPayload,
    /// Item key wrapped under one of the sender's named keys
    pub encrypted_key: WrappedKey,
}

/// Plaintext descriptive metadata carried by a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMetadata {
    pub original_size: u64,
    pub capture_date: DateTime<Utc>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: String,
}

// ---------------------------------------------------------------------------
// Wire document
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct BundleDocument {
    version: String,
    photo: PhotoRecord,
    metadata: MetadataRecord,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhotoRecord {
    id: String,
    encrypted_data: String,
    encrypted_key: String,
    iv: String,
    auth_tag: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataRecord {
    original_size: i64,
    capture_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    height: Option<i64>,
    format: String,
}

/// Encode a bundle as pretty-printed JSON. Refuses anything
/// `decode_bundle` would reject, so an empty payload cannot be bundled.
pub fn encode_bundle(
    id: Uuid,
    payload: &EncryptedPayload,
    wrapped_key: &WrappedKey,
    metadata: &BundleMetadata,
) -> VaultResult<Vec<u8>> {
    check_min("encryptedData", payload.ciphertext.len(), MIN_DATA_LEN)?;
    check_min("encryptedKey", wrapped_key.len(), MIN_WRAPPED_LEN)?;
    check_exact("iv", payload.nonce.len(), NONCE_LEN)?;
    check_exact("authTag", payload.tag.len(), TAG_LEN)?;

    let document = BundleDocument {
        version: BUNDLE_VERSION.to_string(),
        photo: PhotoRecord {
            id: id.to_string(),
            encrypted_data: b64::encode(&payload.ciphertext),
            encrypted_key: b64::encode(wrapped_key.as_bytes()),
            iv: b64::encode(&payload.nonce),
            auth_tag: b64::encode(&payload.tag),
        },
        metadata: MetadataRecord {
            original_size: i64::try_from(metadata.original_size)
                .map_err(|_| VaultError::InvalidBundle("originalSize out of range".into()))?,
            capture_date: metadata
                .capture_date
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            width: metadata.width.map(i64::from),
            height: metadata.height.map(i64::from),
            format: metadata.format.clone(),
        },
    };

    Ok(serde_json::to_vec_pretty(&document)?)
}

/// Decode and validate a bundle
pub fn decode_bundle(bytes: &[u8]) -> VaultResult<TransferBundle> {
    let document: BundleDocument =
        serde_json::from_slice(bytes).map_err(|e| VaultError::InvalidBundle(e.to_string()))?;

    if document.version != BUNDLE_VERSION {
        return Err(VaultError::InvalidBundle(format!(
            "unsupported version {:?}",
            document.version
        )));
    }

    let photo = document.photo;
    let id = Uuid::parse_str(photo.id.trim())
        .map_err(|e| VaultError::InvalidBundle(format!("photo.id: {}", e)))?;

    let ciphertext = decode_field("encryptedData", &photo.encrypted_data, MIN_DATA_LEN)?;
    let encrypted_key = decode_field("encryptedKey", &photo.encrypted_key, MIN_WRAPPED_LEN)?;
    let iv = decode_exact("iv", &photo.iv, NONCE_LEN)?;
    let tag = decode_exact("authTag", &photo.auth_tag, TAG_LEN)?;

    let meta = document.metadata;
    let original_size = u64::try_from(meta.original_size)
        .map_err(|_| VaultError::InvalidBundle("originalSize must be non-negative".into()))?;
    let capture_date = parse_capture_date(&meta.capture_date)?;
    let width = meta.width.map(|w| dimension("width", w)).transpose()?;
    let height = meta.height.map(|h| dimension("height", h)).transpose()?;

    Ok(TransferBundle {
        version: document.version,
        photo: BundlePhoto {
            id,
            payload: EncryptedPayload {
                ciphertext,
                nonce: iv,
                tag,
            },
            encrypted_key: WrappedKey::from_bytes(encrypted_key),
        },
        metadata: BundleMetadata {
            original_size,
            capture_date,
            width,
            height,
            format: meta.format,
        },
    })
}

fn decode_field(field: &str, value: &str, min_len: usize) -> VaultResult<Vec<u8>> {
    let bytes = b64::decode(value)
        .map_err(|e| VaultError::InvalidBundle(format!("{}: invalid base64: {}", field, e)))?;
    check_min(field, bytes.len(), min_len)?;
    Ok(bytes)
}

fn decode_exact(field: &str, value: &str, len: usize) -> VaultResult<Vec<u8>> {
    let bytes = decode_field(field, value, len)?;
    check_exact(field, bytes.len(), len)?;
    Ok(bytes)
}

fn check_min(field: &str, actual: usize, min_len: usize) -> VaultResult<()> {
    if actual < min_len {
        return Err(VaultError::InvalidBundle(format!(
            "{}: {} bytes, need at least {}",
            field, actual, min_len
        )));
    }
    Ok(())
}

fn check_exact(field: &str, actual: usize, len: usize) -> VaultResult<()> {
    if actual != len {
        return Err(VaultError::InvalidBundle(format!(
            "{}: {} bytes, expected {}",
            field, actual, len
        )));
    }
    Ok(())
}

fn dimension(field: &str, value: i64) -> VaultResult<u32> {
    u32::try_from(value)
        .map_err(|_| VaultError::InvalidBundle(format!("{} out of range: {}", field, value)))
}

/// RFC 3339, or a zone-less ISO-8601 timestamp read as UTC
fn parse_capture_date(value: &str) -> VaultResult<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Ok(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| VaultError::InvalidBundle(format!("captureDate: unparseable {:?}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn sample() -> (Uuid, EncryptedPayload, WrappedKey, BundleMetadata) {
        let payload = EncryptedPayload {
            ciphertext: vec![1, 2, 3, 4],
            nonce: vec![7; NONCE_LEN],
            tag: vec![9; TAG_LEN],
        };
        let metadata = BundleMetadata {
            original_size: 4,
            capture_date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            width: Some(1),
            height: Some(1),
            format: "PNG".into(),
        };
        (Uuid::new_v4(), payload, WrappedKey::from_bytes(vec![3; 60]), metadata)
    }

    fn sample_document() -> Value {
        let (id, payload, key, meta) = sample();
        serde_json::from_slice(&encode_bundle(id, &payload, &key, &meta).unwrap()).unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let (id, payload, key, meta) = sample();
        let bytes = encode_bundle(id, &payload, &key, &meta).unwrap();

        let bundle = decode_bundle(&bytes).unwrap();
        assert_eq!(bundle.version, "1.0");
        assert_eq!(bundle.photo.id, id);
        assert_eq!(bundle.photo.payload, payload);
        assert_eq!(bundle.photo.encrypted_key, key);
        assert_eq!(bundle.metadata, meta);
    }

    #[test]
    fn test_encode_refuses_what_decode_rejects() {
        let (id, payload, key, meta) = sample();

        let empty = EncryptedPayload {
            ciphertext: Vec::new(),
            ..payload.clone()
        };
        assert!(matches!(
            encode_bundle(id, &empty, &key, &meta),
            Err(VaultError::InvalidBundle(ref m)) if m.starts_with("encryptedData")
        ));

        let short_tag = EncryptedPayload {
            tag: vec![0; TAG_LEN - 1],
            ..payload
        };
        assert!(encode_bundle(id, &short_tag, &key, &meta).is_err());
    }

    #[test]
    fn test_document_field_names() {
        let doc = sample_document();
        assert_eq!(doc["version"], "1.0");
        for field in ["id", "encryptedData", "encryptedKey", "iv", "authTag"] {
            assert!(doc["photo"][field].is_string(), "missing photo.{}", field);
        }
        assert_eq!(doc["metadata"]["captureDate"], "2024-05-01T12:30:00.000Z");
        assert_eq!(doc["metadata"]["originalSize"], 4);
    }

    #[test]
    fn test_reads_python_style_timestamp() {
        let mut doc = sample_document();
        doc["metadata"]["captureDate"] = json!("2024-05-01T12:30:00.123456Z");
        let bundle = decode_bundle(doc.to_string().as_bytes()).unwrap();
        assert_eq!(bundle.metadata.capture_date.timestamp(), 1_714_566_600);
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut doc = sample_document();
        doc["photo"].as_object_mut().unwrap().remove("authTag");
        let err = decode_bundle(doc.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, VaultError::InvalidBundle(ref m) if m.contains("authTag")));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let mut doc = sample_document();
        doc["photo"]["encryptedData"] = json!("not*base64!");
        assert!(matches!(
            decode_bundle(doc.to_string().as_bytes()),
            Err(VaultError::InvalidBundle(_))
        ));
    }

    #[test]
    fn test_empty_and_short_fields_rejected() {
        let mut doc = sample_document();
        doc["photo"]["encryptedData"] = json!("");
        assert!(decode_bundle(doc.to_string().as_bytes()).is_err());

        let mut doc = sample_document();
        doc["photo"]["iv"] = json!(b64::encode(&[0u8; 8]));
        assert!(decode_bundle(doc.to_string().as_bytes()).is_err());

        let mut doc = sample_document();
        doc["photo"]["encryptedKey"] = json!(b64::encode(&[0u8; 10]));
        assert!(decode_bundle(doc.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_bad_capture_date_is_surfaced() {
        let mut doc = sample_document();
        doc["metadata"]["captureDate"] = json!("yesterday");
        let err = decode_bundle(doc.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, VaultError::InvalidBundle(ref m) if m.contains("captureDate")));
    }

    #[test]
    fn test_negative_sizes_rejected() {
        let mut doc = sample_document();
        doc["metadata"]["originalSize"] = json!(-1);
        assert!(decode_bundle(doc.to_string().as_bytes()).is_err());

        let mut doc = sample_document();
        doc["metadata"]["width"] = json!(-5);
        assert!(decode_bundle(doc.to_string().as_bytes()).is_err());
    }

    #[test]
    fn test_optional_dimensions() {
        let mut doc = sample_document();
        doc["metadata"].as_object_mut().unwrap().remove("width");
        doc["metadata"]["height"] = Value::Null;
        let bundle = decode_bundle(doc.to_string().as_bytes()).unwrap();
        assert_eq!(bundle.metadata.width, None);
        assert_eq!(bundle.metadata.height, None);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut doc = sample_document();
        doc["version"] = json!("2.0");
        assert!(matches!(
            decode_bundle(doc.to_string().as_bytes()),
            Err(VaultError::InvalidBundle(_))
        ));
    }
}
