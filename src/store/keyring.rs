//! Locafoto Vault - Named Key Storage
//!
//! Named keys are held wrapped under the device keyring key. Names are
//! unique with exact, case-sensitive matching.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tokio::sync::mpsc;

use super::{checkpoint, format_time, open_connection, parse_time, request, respond, spawn_actor, Reply};
use crate::crypto::WrappedKey;
use crate::error::{VaultError, VaultResult};
use crate::model::NamedKey;

const STORE_NAME: &str = "keyring";

enum Command {
    Insert(NamedKey, Reply<()>),
    Get(String, Reply<Option<NamedKey>>),
    List(Reply<Vec<NamedKey>>),
    Delete {
        name: String,
        confirmed_usage: u64,
        reply: Reply<()>,
    },
    Touch(String, DateTime<Utc>, Reply<bool>),
    Shutdown(Reply<()>),
}

/// Handle to the keyring actor
#[derive(Clone)]
pub struct Keyring {
    tx: mpsc::Sender<Command>,
}

impl Keyring {
    pub fn open(db_path: &Path, channel_capacity: usize) -> VaultResult<Self> {
        let conn = open_connection(db_path)?;
        let keys = load_keys(&conn)?;
        log::info!("keyring opened with {} named keys", keys.len());

        let (tx, rx) = mpsc::channel(channel_capacity.max(1));
        let actor = KeyringActor { conn, keys };
        spawn_actor(STORE_NAME, move || actor.run(rx))?;

        Ok(Self { tx })
    }

    /// Add a new named key. Fails with `DuplicateName` if the name exists.
    pub async fn insert(&self, key: NamedKey) -> VaultResult<()> {
        request(&self.tx, STORE_NAME, |r| Command::Insert(key, r)).await
    }

    pub async fn get(&self, name: &str) -> VaultResult<Option<NamedKey>> {
        let name = name.to_string();
        request(&self.tx, STORE_NAME, |r| Command::Get(name, r)).await
    }

    /// All named keys ordered by name
    pub async fn list(&self) -> VaultResult<Vec<NamedKey>> {
        request(&self.tx, STORE_NAME, Command::List).await
    }

    /// Delete a named key. `confirmed_usage` is the count just read from the
    /// usage tracker; anything but zero is `KeyInUse`.
    pub async fn delete(&self, name: &str, confirmed_usage: u64) -> VaultResult<()> {
        let name = name.to_string();
        request(&self.tx, STORE_NAME, |reply| Command::Delete {
            name,
            confirmed_usage,
            reply,
        })
        .await
    }

    /// Stamp the last-used time. Returns false for unknown names.
    pub async fn touch(&self, name: &str, at: DateTime<Utc>) -> VaultResult<bool> {
        let name = name.to_string();
        request(&self.tx, STORE_NAME, |r| Command::Touch(name, at, r)).await
    }

    pub async fn shutdown(&self) -> VaultResult<()> {
        request(&self.tx, STORE_NAME, Command::Shutdown).await
    }
}

struct KeyringActor {
    conn: Connection,
    keys: BTreeMap<String, NamedKey>,
}

impl KeyringActor {
    fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Insert(key, reply) => respond(reply, self.insert(key)),
                Command::Get(name, reply) => respond(reply, Ok(self.keys.get(&name).cloned())),
                Command::List(reply) => respond(reply, Ok(self.keys.values().cloned().collect())),
                Command::Delete {
                    name,
                    confirmed_usage,
                    reply,
                } => respond(reply, self.delete(&name, confirmed_usage)),
                Command::Touch(name, at, reply) => respond(reply, self.touch(&name, at)),
                Command::Shutdown(reply) => {
                    rx.close();
                    respond(reply, checkpoint(&self.conn));
                    break;
                }
            }
        }
        log::info!("keyring stopped");
    }

    fn insert(&mut self, key: NamedKey) -> VaultResult<()> {
        if self.keys.contains_key(&key.name) {
            return Err(VaultError::DuplicateName(key.name));
        }

        self.conn.execute(
            "INSERT INTO named_keys (name, wrapped_key, created_at, last_used_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                key.name,
                key.wrapped_key.as_bytes(),
                format_time(&key.created_at),
                key.last_used_at.as_ref().map(format_time)
            ],
        )?;
        log::info!("named key '{}' created", key.name);
        self.keys.insert(key.name.clone(), key);
        Ok(())
    }

    fn delete(&mut self, name: &str, confirmed_usage: u64) -> VaultResult<()> {
        if !self.keys.contains_key(name) {
            return Err(VaultError::NotFound(format!("key '{}'", name)));
        }
        if confirmed_usage > 0 {
            return Err(VaultError::KeyInUse {
                name: name.to_string(),
                usage: confirmed_usage,
            });
        }

        self.conn
            .execute("DELETE FROM named_keys WHERE name = ?1", params![name])?;
        self.keys.remove(name);
        log::info!("named key '{}' deleted", name);
        Ok(())
    }

    fn touch(&mut self, name: &str, at: DateTime<Utc>) -> VaultResult<bool> {
        if !self.keys.contains_key(name) {
            return Ok(false);
        }

        self.conn.execute(
            "UPDATE named_keys SET last_used_at = ?1 WHERE name = ?2",
            params![format_time(&at), name],
        )?;
        if let Some(key) = self.keys.get_mut(name) {
            key.last_used_at = Some(at);
        }
        Ok(true)
    }
}

fn load_keys(conn: &Connection) -> VaultResult<BTreeMap<String, NamedKey>> {
    let mut stmt =
        conn.prepare("SELECT name, wrapped_key, created_at, last_used_at FROM named_keys")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Vec<u8>>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut keys = BTreeMap::new();
    for row in rows {
        let (name, wrapped, created_at, last_used_at) = row?;
        let key = NamedKey {
            name: name.clone(),
            created_at: parse_time(&created_at)?,
            wrapped_key: WrappedKey::from_bytes(wrapped),
            last_used_at: last_used_at.as_deref().map(parse_time).transpose()?,
        };
        keys.insert(name, key);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn named(name: &str) -> NamedKey {
        NamedKey {
            name: name.to_string(),
            created_at: Utc::now(),
            wrapped_key: WrappedKey::from_bytes(vec![5; 60]),
            last_used_at: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_names_are_case_sensitive() {
        let dir = tempdir().unwrap();
        let keyring = Keyring::open(&dir.path().join("vault.db"), 8).unwrap();

        keyring.insert(named("Family")).await.unwrap();
        keyring.insert(named("family")).await.unwrap();
        assert!(matches!(
            keyring.insert(named("Family")).await,
            Err(VaultError::DuplicateName(ref n)) if n == "Family"
        ));
        assert_eq!(keyring.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_requires_zero_usage() {
        let dir = tempdir().unwrap();
        let keyring = Keyring::open(&dir.path().join("vault.db"), 8).unwrap();
        keyring.insert(named("Trip")).await.unwrap();

        assert!(matches!(
            keyring.delete("Trip", 3).await,
            Err(VaultError::KeyInUse { usage: 3, .. })
        ));
        assert!(keyring.get("Trip").await.unwrap().is_some());

        keyring.delete("Trip", 0).await.unwrap();
        assert!(keyring.get("Trip").await.unwrap().is_none());
        assert!(matches!(
            keyring.delete("Trip", 0).await,
            Err(VaultError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_keys_and_last_used_survive_restart() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("vault.db");
        let key = named("Shared");
        let used_at = Utc::now();
        {
            let keyring = Keyring::open(&db, 8).unwrap();
            keyring.insert(key.clone()).await.unwrap();
            assert!(keyring.touch("Shared", used_at).await.unwrap());
            assert!(!keyring.touch("Missing", used_at).await.unwrap());
            keyring.shutdown().await.unwrap();
        }

        let keyring = Keyring::open(&db, 8).unwrap();
        let loaded = keyring.get("Shared").await.unwrap().unwrap();
        assert_eq!(loaded.wrapped_key, key.wrapped_key);
        assert_eq!(
            loaded.last_used_at.map(|t| t.timestamp_micros()),
            Some(used_at.timestamp_micros())
        );
    }
}
