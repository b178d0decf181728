//! Locafoto Vault - Persistent Stores
//!
//! Each store is an actor: one thread owns the SQLite connection and the
//! in-memory state, and callers queue commands through a bounded channel
//! via a cheap, clonable handle. Every mutation is committed to disk before
//! its reply is sent.

pub mod schema;
pub mod items;
pub mod usage;
pub mod keyring;

pub use items::{MetadataStore, StoreEvent};
pub use keyring::Keyring;
pub use usage::UsageTracker;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

use crate::error::{VaultError, VaultResult};

/// Reply channel carried by every store command
pub(crate) type Reply<T> = oneshot::Sender<VaultResult<T>>;

/// Open a connection to the shared vault database
pub(crate) fn open_connection(path: &Path) -> VaultResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA synchronous=FULL;")?;
    schema::run_migrations(&conn)?;
    Ok(conn)
}

/// Run an actor loop on its own named thread
pub(crate) fn spawn_actor<F>(name: &'static str, run: F) -> VaultResult<()>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("locafoto-{}", name))
        .spawn(run)?;
    Ok(())
}

/// Send a command and wait for its reply
pub(crate) async fn request<C, T>(
    tx: &mpsc::Sender<C>,
    store: &'static str,
    command: impl FnOnce(Reply<T>) -> C,
) -> VaultResult<T> {
    let (reply, rx) = oneshot::channel();
    tx.send(command(reply))
        .await
        .map_err(|_| VaultError::StoreClosed(store))?;
    rx.await.map_err(|_| VaultError::StoreClosed(store))?
}

/// Answer a command. A caller that stopped waiting is not an error.
pub(crate) fn respond<T>(reply: Reply<T>, result: VaultResult<T>) {
    let _ = reply.send(result);
}

/// Flush the WAL into the main database file
pub(crate) fn checkpoint(conn: &Connection) -> VaultResult<()> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
    Ok(())
}

pub(crate) fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

pub(crate) fn parse_time(value: &str) -> VaultResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| VaultError::Database(format!("bad timestamp {:?}: {}", value, e)))
}
