//! Locafoto Vault - Key Usage Tracking
//!
//! Records which named key opened which imported container. A named key may
//! only be deleted while no record points at it.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{checkpoint, format_time, open_connection, parse_time, request, respond, spawn_actor, Reply};
use crate::error::VaultResult;
use crate::model::UsageRecord;

const STORE_NAME: &str = "usage";

enum Command {
    Record(UsageRecord, Reply<()>),
    Count(String, Reply<u64>),
    Delete(Uuid, Reply<bool>),
    Counts(Reply<BTreeMap<String, u64>>),
    Shutdown(Reply<()>),
}

/// Handle to the usage tracker actor
#[derive(Clone)]
pub struct UsageTracker {
    tx: mpsc::Sender<Command>,
}

impl UsageTracker {
    pub fn open(db_path: &Path, channel_capacity: usize) -> VaultResult<Self> {
        let conn = open_connection(db_path)?;
        let records = load_records(&conn)?;
        log::info!("usage tracker opened with {} records", records.len());

        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = UsageActor { conn, records };
        spawn_actor(STORE_NAME, move || actor.run(rx))?;

        Ok(Self { tx })
    }

    /// Record that `key_name` opened container `container_id`. Recording the
    /// same container again replaces the earlier record.
    pub async fn record_import(&self, container_id: Uuid, key_name: &str) -> VaultResult<()> {
        let record = UsageRecord {
            container_id,
            key_name: key_name.to_string(),
            imported_at: Utc::now(),
        };
        request(&self.tx, STORE_NAME, |r| Command::Record(record, r)).await
    }

    /// Containers opened by `key_name`; 0 for unknown names
    pub async fn usage_count(&self, key_name: &str) -> VaultResult<u64> {
        let name = key_name.to_string();
        request(&self.tx, STORE_NAME, |r| Command::Count(name, r)).await
    }

    /// Forget a container. Returns whether a record existed.
    pub async fn delete_tracking(&self, container_id: Uuid) -> VaultResult<bool> {
        request(&self.tx, STORE_NAME, |r| Command::Delete(container_id, r)).await
    }

    /// Usage count of every key with at least one record
    pub async fn counts(&self) -> VaultResult<BTreeMap<String, u64>> {
        request(&self.tx, STORE_NAME, Command::Counts).await
    }

    pub async fn shutdown(&self) -> VaultResult<()> {
        request(&self.tx, STORE_NAME, Command::Shutdown).await
    }
}

struct UsageActor {
    conn: Connection,
    records: HashMap<Uuid, UsageRecord>,
}

impl UsageActor {
    fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Record(record, reply) => respond(reply, self.record(record)),
                Command::Count(name, reply) => respond(reply, Ok(self.count(&name))),
                Command::Delete(id, reply) => respond(reply, self.delete(id)),
                Command::Counts(reply) => {
                    let mut counts = BTreeMap::new();
                    for record in self.records.values() {
                        *counts.entry(record.key_name.clone()).or_insert(0) += 1;
                    }
                    respond(reply, Ok(counts));
                }
                Command::Shutdown(reply) => {
                    rx.close();
                    respond(reply, checkpoint(&self.conn));
                    break;
                }
            }
        }
        log::info!("usage tracker stopped");
    }

    fn count(&self, key_name: &str) -> u64 {
        self.records
            .values()
            .filter(|r| r.key_name == key_name)
            .count() as u64
    }

    fn record(&mut self, record: UsageRecord) -> VaultResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO key_usage (container_id, key_name, imported_at) VALUES (?1, ?2, ?3)",
            params![
                record.container_id.to_string(),
                record.key_name,
                format_time(&record.imported_at)
            ],
        )?;
        log::debug!("container {} opened with key {}", record.container_id, record.key_name);
        self.records.insert(record.container_id, record);
        Ok(())
    }

    fn delete(&mut self, container_id: Uuid) -> VaultResult<bool> {
        self.conn.execute(
            "DELETE FROM key_usage WHERE container_id = ?1",
            params![container_id.to_string()],
        )?;
        Ok(self.records.remove(&container_id).is_some())
    }
}

fn load_records(conn: &Connection) -> VaultResult<HashMap<Uuid, UsageRecord>> {
    let mut stmt = conn.prepare("SELECT container_id, key_name, imported_at FROM key_usage")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut records = HashMap::new();
    for row in rows {
        let (id, key_name, imported_at) = row?;
        let Ok(container_id) = Uuid::parse_str(&id) else {
            log::warn!("skipping usage record with bad container id {:?}", id);
            continue;
        };
        records.insert(
            container_id,
            UsageRecord {
                container_id,
                key_name,
                imported_at: parse_time(&imported_at)?,
            },
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_usage_counts() {
        let dir = tempdir().unwrap();
        let tracker = UsageTracker::open(&dir.path().join("vault.db"), 8).unwrap();

        assert_eq!(tracker.usage_count("Unknown").await.unwrap(), 0);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        tracker.record_import(a, "Family").await.unwrap();
        tracker.record_import(b, "Family").await.unwrap();
        tracker.record_import(a, "Family").await.unwrap();
        assert_eq!(tracker.usage_count("Family").await.unwrap(), 2);
        assert_eq!(tracker.usage_count("family").await.unwrap(), 0);

        assert!(tracker.delete_tracking(a).await.unwrap());
        assert!(!tracker.delete_tracking(a).await.unwrap());
        assert_eq!(tracker.usage_count("Family").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_returns_to_zero_after_delete() {
        let dir = tempdir().unwrap();
        let tracker = UsageTracker::open(&dir.path().join("vault.db"), 8).unwrap();
        let id = Uuid::new_v4();

        assert_eq!(tracker.usage_count("K").await.unwrap(), 0);
        tracker.record_import(id, "K").await.unwrap();
        assert_eq!(tracker.usage_count("K").await.unwrap(), 1);
        tracker.delete_tracking(id).await.unwrap();
        assert_eq!(tracker.usage_count("K").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_usage_survives_restart() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("vault.db");
        let id = Uuid::new_v4();
        {
            let tracker = UsageTracker::open(&db, 8).unwrap();
            tracker.record_import(id, "Trip").await.unwrap();
            tracker.shutdown().await.unwrap();
        }

        let tracker = UsageTracker::open(&db, 8).unwrap();
        assert_eq!(tracker.usage_count("Trip").await.unwrap(), 1);
        assert_eq!(tracker.counts().await.unwrap().get("Trip"), Some(&1));
    }
}
