//! Locafoto Vault - Metadata Store
//!
//! Durable map of item id → `EncryptedItem`. The live set is held in memory
//! sorted by capture date (newest first) and mirrored in the `items` table as
//! schema-versioned JSON records.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::{params, Connection};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::{checkpoint, format_time, open_connection, request, respond, spawn_actor, Reply};
use crate::error::{VaultError, VaultResult};
use crate::model::{decode_record, encode_record, summarize_albums, AlbumSummary, EncryptedItem, ItemFilter};

const STORE_NAME: &str = "metadata";

/// Change notification, sent only after the change is committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Upserted { id: Uuid, album_id: Uuid },
    Removed { id: Uuid, album_id: Uuid },
}

/// Field edits applied in place
enum ItemEdit {
    Album(Uuid),
    Favorite(bool),
    Hidden(bool),
    Tags(Vec<String>),
}

enum Command {
    Add(EncryptedItem, Reply<Option<EncryptedItem>>),
    Get(Uuid, Reply<Option<EncryptedItem>>),
    Scan(ItemFilter, Reply<Vec<EncryptedItem>>),
    All(Reply<Vec<EncryptedItem>>),
    Remove(Uuid, Reply<bool>),
    Edit(Uuid, ItemEdit, Reply<bool>),
    Albums(Reply<Vec<AlbumSummary>>),
    ReferencedBlobs(Reply<HashSet<String>>),
    Shutdown(Reply<()>),
}

/// Handle to the metadata store actor
#[derive(Clone)]
pub struct MetadataStore {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<StoreEvent>,
}

impl MetadataStore {
    /// Load the committed snapshot and start the actor
    pub fn open(db_path: &Path, channel_capacity: usize, event_capacity: usize) -> VaultResult<Self> {
        let conn = open_connection(db_path)?;
        let items = load_items(&conn)?;
        log::info!("metadata store opened with {} items", items.len());

        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let (events, _) = broadcast::channel(event_capacity.max(1));

        let actor = ItemsActor {
            conn,
            items,
            events: events.clone(),
        };
        spawn_actor(STORE_NAME, move || actor.run(rx))?;

        Ok(Self { tx, events })
    }

    /// Insert or replace an item. Returns the record it replaced.
    pub async fn add(&self, item: EncryptedItem) -> VaultResult<Option<EncryptedItem>> {
        request(&self.tx, STORE_NAME, |r| Command::Add(item, r)).await
    }

    pub async fn get(&self, id: Uuid) -> VaultResult<Option<EncryptedItem>> {
        request(&self.tx, STORE_NAME, |r| Command::Get(id, r)).await
    }

    /// Every item, newest capture first
    pub async fn get_all(&self) -> VaultResult<Vec<EncryptedItem>> {
        request(&self.tx, STORE_NAME, Command::All).await
    }

    pub async fn get_by_album(&self, album_id: Uuid) -> VaultResult<Vec<EncryptedItem>> {
        let filter = ItemFilter {
            album: Some(album_id),
            include_hidden: true,
            ..Default::default()
        };
        self.filter(filter).await
    }

    /// Items matching `filter`, newest capture first
    pub async fn filter(&self, filter: ItemFilter) -> VaultResult<Vec<EncryptedItem>> {
        request(&self.tx, STORE_NAME, |r| Command::Scan(filter, r)).await
    }

    /// Remove an item. Returns whether it existed.
    pub async fn remove(&self, id: Uuid) -> VaultResult<bool> {
        request(&self.tx, STORE_NAME, |r| Command::Remove(id, r)).await
    }

    /// Move an item to another album. Unknown ids are a no-op and return false.
    pub async fn update_album(&self, id: Uuid, album_id: Uuid) -> VaultResult<bool> {
        self.edit(id, ItemEdit::Album(album_id)).await
    }

    pub async fn set_favorite(&self, id: Uuid, favorite: bool) -> VaultResult<bool> {
        self.edit(id, ItemEdit::Favorite(favorite)).await
    }

    pub async fn set_hidden(&self, id: Uuid, hidden: bool) -> VaultResult<bool> {
        self.edit(id, ItemEdit::Hidden(hidden)).await
    }

    pub async fn set_tags(&self, id: Uuid, tags: Vec<String>) -> VaultResult<bool> {
        self.edit(id, ItemEdit::Tags(tags)).await
    }

    async fn edit(&self, id: Uuid, edit: ItemEdit) -> VaultResult<bool> {
        request(&self.tx, STORE_NAME, |r| Command::Edit(id, edit, r)).await
    }

    /// Per-album counts over the live set
    pub async fn album_summaries(&self) -> VaultResult<Vec<AlbumSummary>> {
        request(&self.tx, STORE_NAME, Command::Albums).await
    }

    /// Blob ids named by every row of the `items` table, including rows
    /// that failed to load. Fails if any row's blob path cannot be read.
    pub async fn referenced_blobs(&self) -> VaultResult<HashSet<String>> {
        request(&self.tx, STORE_NAME, Command::ReferencedBlobs).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Flush and stop the actor. Later calls fail with `StoreClosed`.
    pub async fn shutdown(&self) -> VaultResult<()> {
        request(&self.tx, STORE_NAME, Command::Shutdown).await
    }
}

// ═══════════════════════════════════════════════════════════════
// ACTOR
// ═══════════════════════════════════════════════════════════════

struct ItemsActor {
    conn: Connection,
    items: Vec<EncryptedItem>,
    events: broadcast::Sender<StoreEvent>,
}

impl ItemsActor {
    fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Add(item, reply) => respond(reply, self.add(item)),
                Command::Get(id, reply) => respond(reply, Ok(self.find(id).cloned())),
                Command::All(reply) => respond(reply, Ok(self.items.clone())),
                Command::Scan(filter, reply) => {
                    let found = self.items.iter().filter(|i| filter.matches(i)).cloned().collect();
                    respond(reply, Ok(found));
                }
                Command::Remove(id, reply) => respond(reply, self.remove(id)),
                Command::Edit(id, edit, reply) => respond(reply, self.edit(id, edit)),
                Command::Albums(reply) => respond(reply, Ok(summarize_albums(&self.items))),
                Command::ReferencedBlobs(reply) => respond(reply, referenced_blobs(&self.conn)),
                Command::Shutdown(reply) => {
                    rx.close();
                    respond(reply, checkpoint(&self.conn));
                    break;
                }
            }
        }
        log::info!("metadata store stopped");
    }

    fn find(&self, id: Uuid) -> Option<&EncryptedItem> {
        self.items.iter().find(|i| i.id == id)
    }

    fn persist(&self, item: &EncryptedItem) -> VaultResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO items (id, record, capture_date) VALUES (?1, ?2, ?3)",
            params![item.id.to_string(), encode_record(item)?, format_time(&item.capture_date)],
        )?;
        Ok(())
    }

    fn add(&mut self, item: EncryptedItem) -> VaultResult<Option<EncryptedItem>> {
        self.persist(&item)?;

        let event = StoreEvent::Upserted {
            id: item.id,
            album_id: item.album_id,
        };
        let replaced = self
            .items
            .iter()
            .position(|i| i.id == item.id)
            .map(|pos| self.items.remove(pos));
        insert_sorted(&mut self.items, item);
        let _ = self.events.send(event);
        Ok(replaced)
    }

    fn remove(&mut self, id: Uuid) -> VaultResult<bool> {
        self.conn
            .execute("DELETE FROM items WHERE id = ?1", params![id.to_string()])?;

        let Some(pos) = self.items.iter().position(|i| i.id == id) else {
            return Ok(false);
        };
        let removed = self.items.remove(pos);
        let _ = self.events.send(StoreEvent::Removed {
            id,
            album_id: removed.album_id,
        });
        Ok(true)
    }

    fn edit(&mut self, id: Uuid, edit: ItemEdit) -> VaultResult<bool> {
        let Some(mut item) = self.find(id).cloned() else {
            log::debug!("edit of unknown item {} ignored", id);
            return Ok(false);
        };

        match edit {
            ItemEdit::Album(album_id) => item.album_id = album_id,
            ItemEdit::Favorite(favorite) => item.is_favorite = favorite,
            ItemEdit::Hidden(hidden) => item.is_hidden = hidden,
            ItemEdit::Tags(tags) => item.tags = tags,
        }
        item.modified_date = chrono::Utc::now();

        self.add(item)?;
        Ok(true)
    }
}

/// Keep `items` ordered by capture date descending, ties by id
fn insert_sorted(items: &mut Vec<EncryptedItem>, item: EncryptedItem) {
    let pos = items
        .binary_search_by(|other| {
            item.capture_date
                .cmp(&other.capture_date)
                .then_with(|| other.id.cmp(&item.id))
        })
        .unwrap_or_else(|e| e);
    items.insert(pos, item);
}

/// Read blob paths straight from the stored JSON so rows that no longer
/// decode as items still protect their ciphertext
fn referenced_blobs(conn: &Connection) -> VaultResult<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT id, record FROM items")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?;

    let mut paths = HashSet::new();
    for row in rows {
        let (id, record) = row?;
        let value: serde_json::Value = serde_json::from_slice(&record).map_err(|e| {
            VaultError::Database(format!("item record {} is not JSON: {}", id, e))
        })?;

        let Some(blob) = value.get("blobPath").and_then(|v| v.as_str()) else {
            return Err(VaultError::Database(format!(
                "item record {} has no readable blobPath",
                id
            )));
        };
        paths.insert(blob.to_string());
        if let Some(thumb) = value.get("thumbnailPath").and_then(|v| v.as_str()) {
            paths.insert(thumb.to_string());
        }
    }
    Ok(paths)
}

fn load_items(conn: &Connection) -> VaultResult<Vec<EncryptedItem>> {
    let mut stmt = conn.prepare("SELECT id, record FROM items")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?)))?;

    let mut items = Vec::new();
    for row in rows {
        let (id, record) = row?;
        match decode_record(&record) {
            Ok((item, defaulted)) => {
                if !defaulted.is_empty() {
                    log::debug!("item {} loaded with defaults for {:?}", id, defaulted);
                }
                insert_sorted(&mut items, item);
            }
            Err(e) => log::warn!("skipping unreadable item record {}: {}", id, e),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::sample_item;
    use tempfile::tempdir;

    fn open(dir: &Path) -> MetadataStore {
        MetadataStore::open(&dir.join("vault.db"), 8, 8).unwrap()
    }

    #[tokio::test]
    async fn test_add_get_remove() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let item = sample_item(0);

        store.add(item.clone()).await.unwrap();
        assert_eq!(store.get(item.id).await.unwrap(), Some(item.clone()));

        assert!(store.remove(item.id).await.unwrap());
        assert!(!store.remove(item.id).await.unwrap());
        assert_eq!(store.get(item.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_by_capture_date_descending() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());

        for offset in [3, 10, 1, 7] {
            store.add(sample_item(offset)).await.unwrap();
        }

        let all = store.get_all().await.unwrap();
        let dates: Vec<_> = all.iter().map(|i| i.capture_date).collect();
        let mut sorted = dates.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(dates, sorted);
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_resorts() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let mut item = sample_item(1);
        store.add(item.clone()).await.unwrap();
        store.add(sample_item(5)).await.unwrap();

        item.capture_date = item.capture_date + chrono::Duration::days(30);
        store.add(item.clone()).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, item.id);
    }

    #[tokio::test]
    async fn test_reload_after_restart() {
        let dir = tempdir().unwrap();
        let item = sample_item(2);
        {
            let store = open(dir.path());
            store.add(item.clone()).await.unwrap();
            store.add(sample_item(4)).await.unwrap();
            store.remove(item.id).await.unwrap();
            store.add(item.clone()).await.unwrap();
            store.shutdown().await.unwrap();
            assert!(store.get(item.id).await.is_err());
        }

        let store = open(dir.path());
        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.get(item.id).await.unwrap(), Some(item));
    }

    #[tokio::test]
    async fn test_update_album_unknown_id_is_noop() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let item = sample_item(0);
        store.add(item.clone()).await.unwrap();

        assert!(!store.update_album(Uuid::new_v4(), Uuid::new_v4()).await.unwrap());
        assert_eq!(store.get_all().await.unwrap(), vec![item.clone()]);

        let album = Uuid::new_v4();
        assert!(store.update_album(item.id, album).await.unwrap());
        let moved = store.get_by_album(album).await.unwrap();
        assert_eq!(moved.len(), 1);
        assert_eq!(moved[0].id, item.id);
    }

    #[tokio::test]
    async fn test_edits_and_filters() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let a = sample_item(0);
        let b = sample_item(1);
        store.add(a.clone()).await.unwrap();
        store.add(b.clone()).await.unwrap();

        store.set_favorite(a.id, true).await.unwrap();
        store.set_hidden(b.id, true).await.unwrap();
        store.set_tags(a.id, vec!["trip".into()]).await.unwrap();

        let visible = store.filter(ItemFilter::default()).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, a.id);
        assert_eq!(visible[0].tags, vec!["trip".to_string()]);

        let favorites = store
            .filter(ItemFilter { favorites_only: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(favorites.len(), 1);

        let summaries = store.album_summaries().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].item_count, 2);
    }

    #[tokio::test]
    async fn test_events_follow_commit() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let mut events = store.subscribe();
        let item = sample_item(0);

        store.add(item.clone()).await.unwrap();
        match events.recv().await.unwrap() {
            StoreEvent::Upserted { id, .. } => {
                assert_eq!(id, item.id);
                assert!(store.get(id).await.unwrap().is_some());
            }
            other => panic!("unexpected event {:?}", other),
        }

        store.remove(item.id).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            StoreEvent::Removed { id, .. } if id == item.id
        ));

        // Idempotent removal sends nothing
        store.remove(item.id).await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unreadable_record_skipped() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("vault.db");
        let good = sample_item(0);
        {
            let store = MetadataStore::open(&db, 8, 8).unwrap();
            store.add(good.clone()).await.unwrap();
            store.shutdown().await.unwrap();
        }
        {
            let conn = open_connection(&db).unwrap();
            conn.execute(
                "INSERT INTO items (id, record, capture_date) VALUES ('broken', x'7b7d', 'x')",
                [],
            )
            .unwrap();
        }

        let store = MetadataStore::open(&db, 8, 8).unwrap();
        assert_eq!(store.get_all().await.unwrap(), vec![good]);
        assert!(matches!(
            store.referenced_blobs().await,
            Err(VaultError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_referenced_blobs_include_rows_that_fail_to_load() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("vault.db");
        let good = sample_item(0);
        let mut bad = sample_item(1);
        bad.thumbnail_path = Some(format!("thumbs/{}.enc", bad.id));
        {
            let store = MetadataStore::open(&db, 8, 8).unwrap();
            store.add(good.clone()).await.unwrap();
            store.add(bad.clone()).await.unwrap();
            store.shutdown().await.unwrap();
        }
        {
            let conn = open_connection(&db).unwrap();
            let record: Vec<u8> = conn
                .query_row(
                    "SELECT record FROM items WHERE id = ?1",
                    params![bad.id.to_string()],
                    |row| row.get(0),
                )
                .unwrap();
            let mut json: serde_json::Value = serde_json::from_slice(&record).unwrap();
            json["isFavorite"] = serde_json::json!("yes");
            conn.execute(
                "UPDATE items SET record = ?1 WHERE id = ?2",
                params![serde_json::to_vec(&json).unwrap(), bad.id.to_string()],
            )
            .unwrap();
        }

        let store = MetadataStore::open(&db, 8, 8).unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        let referenced = store.referenced_blobs().await.unwrap();
        assert!(referenced.contains(&good.blob_path));
        assert!(referenced.contains(&bad.blob_path));
        assert!(referenced.contains(bad.thumbnail_path.as_ref().unwrap()));
    }

    #[tokio::test]
    async fn test_add_returns_replaced_record() {
        let dir = tempdir().unwrap();
        let store = open(dir.path());
        let item = sample_item(0);

        assert_eq!(store.add(item.clone()).await.unwrap(), None);
        let mut newer = item.clone();
        newer.blob_path = format!("items/{}-next.enc", item.id);
        assert_eq!(store.add(newer).await.unwrap(), Some(item));
    }
}
