//! Database schema migrations

use rusqlite::Connection;

use crate::error::VaultResult;

const SCHEMA_VERSION: i32 = 2;

/// Bring the database up to the current schema
pub fn run_migrations(conn: &Connection) -> VaultResult<()> {
    let current: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    log::debug!(
        "running migrations: current_version={}, target_version={}",
        current,
        SCHEMA_VERSION
    );

    if current < 1 {
        migrate_v1(conn)?;
    }
    if current < 2 {
        migrate_v2(conn)?;
    }

    conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
    Ok(())
}

/// Items, usage records and named keys
fn migrate_v1(conn: &Connection) -> VaultResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            record BLOB NOT NULL,
            capture_date TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS key_usage (
            container_id TEXT PRIMARY KEY,
            key_name TEXT NOT NULL,
            imported_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS named_keys (
            name TEXT PRIMARY KEY,
            wrapped_key BLOB NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

/// Last-used tracking and lookup indexes
fn migrate_v2(conn: &Connection) -> VaultResult<()> {
    let has_last_used = conn
        .prepare("SELECT 1 FROM pragma_table_info('named_keys') WHERE name = 'last_used_at'")?
        .exists([])?;
    if !has_last_used {
        conn.execute_batch("ALTER TABLE named_keys ADD COLUMN last_used_at TEXT;")?;
    }

    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_items_capture ON items(capture_date);
        CREATE INDEX IF NOT EXISTS idx_usage_key ON key_usage(key_name);
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        conn.execute(
            "INSERT INTO named_keys (name, wrapped_key, created_at, last_used_at) VALUES ('a', x'00', 'now', NULL)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_upgrades_v1_database() {
        let conn = Connection::open_in_memory().unwrap();
        migrate_v1(&conn).unwrap();
        conn.execute_batch("PRAGMA user_version = 1;").unwrap();

        run_migrations(&conn).unwrap();
        let has_column = conn
            .prepare("SELECT 1 FROM pragma_table_info('named_keys') WHERE name = 'last_used_at'")
            .unwrap()
            .exists([])
            .unwrap();
        assert!(has_column);
    }
}
