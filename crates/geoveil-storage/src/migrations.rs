//! Database migrations

use crate::Result;
use rusqlite::{Connection, OptionalExtension};

type Migration = fn(&Connection) -> Result<()>;

/// Ordered schema steps; entry `i` upgrades the store to version `i + 1`.
const MIGRATIONS: &[(&str, Migration)] = &[("settings table", create_settings)];

fn schema_version_target() -> i32 {
    MIGRATIONS.len() as i32
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let stored = stored_version(conn)?;
    for (index, (label, step)) in MIGRATIONS.iter().enumerate() {
        let version = index as i32 + 1;
        if version <= stored {
            continue;
        }
        tracing::info!(version, "Running settings migration: {}", label);
        step(conn)?;
    }

    if stored != schema_version_target() {
        conn.execute("DELETE FROM schema_version", [])?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [schema_version_target()],
        )?;
    }
    Ok(())
}

fn stored_version(conn: &Connection) -> Result<i32> {
    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

// Values are JSON documents keyed by dotted setting name
fn create_settings(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
    "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(conn: &Connection) -> i32 {
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(version(&conn), schema_version_target());
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_settings_table_exists_after_migration() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES ('k', '1', 'now')",
            [],
        )
        .unwrap();
    }
}
