//! Database connection and settings operations

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

use crate::error::StorageError;
use crate::migrations::run_migrations;
use crate::Result;

/// A stored setting together with its last modification time.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingRecord {
    pub key: String,
    pub value: Value,
    pub updated_at: DateTime<Utc>,
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for better concurrent performance
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Read a setting.
    ///
    /// `Ok(None)` means the key was never written. A row whose text is not
    /// valid JSON is reported as [`StorageError::MalformedValue`] so callers
    /// can fall back to their own default.
    pub fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = self.with_connection(|conn| {
            let value = conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value)
        })?;

        match raw {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|source| StorageError::MalformedValue {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn set_setting(&self, key: &str, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let updated_at = Utc::now().to_rfc3339();
        self.with_connection(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![key, text, updated_at],
            )?;
            Ok(())
        })?;

        tracing::debug!(key = %key, "Stored setting");

        Ok(())
    }

    /// Write several settings atomically.
    pub fn set_settings(&self, entries: &[(&str, Value)]) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        let encoded = entries
            .iter()
            .map(|(key, value)| -> Result<(&str, String)> {
                Ok((*key, serde_json::to_string(value)?))
            })
            .collect::<Result<Vec<_>>>()?;

        self.transaction(|conn| {
            for (key, text) in &encoded {
                conn.execute(
                    "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![key, text, updated_at],
                )?;
            }
            Ok(())
        })
    }

    pub fn remove_setting(&self, key: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    /// All settings with a parseable value, ordered by key.
    pub fn list_settings(&self) -> Result<Vec<SettingRecord>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT key, value, updated_at FROM settings ORDER BY key")?;

            let records: Vec<SettingRecord> = stmt
                .query_map([], |row| {
                    let key: String = row.get(0)?;
                    let text: String = row.get(1)?;
                    let updated_str: String = row.get(2)?;
                    Ok((key, text, updated_str))
                })?
                .filter_map(|r| r.ok())
                .filter_map(|(key, text, updated_str)| {
                    let value = match serde_json::from_str(&text) {
                        Ok(value) => value,
                        Err(e) => {
                            tracing::warn!(key = %key, error = %e, "Skipping malformed setting");
                            return None;
                        }
                    };
                    let updated_at = DateTime::parse_from_rfc3339(&updated_str)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now());
                    Some(SettingRecord {
                        key,
                        value,
                        updated_at,
                    })
                })
                .collect();

            Ok(records)
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            let count: i32 =
                conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?;
            assert_eq!(count, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_setting_values() {
        let db = Database::open_in_memory().unwrap();

        assert_eq!(db.get_setting("geolocation.enabled").unwrap(), None);

        db.set_setting("geolocation.enabled", &json!(false)).unwrap();
        db.set_setting("geolocation.blur.coords", &json!("@1.5,2.5"))
            .unwrap();

        assert_eq!(
            db.get_setting("geolocation.enabled").unwrap(),
            Some(json!(false))
        );
        assert_eq!(
            db.get_setting("geolocation.blur.coords").unwrap(),
            Some(json!("@1.5,2.5"))
        );

        db.remove_setting("geolocation.enabled").unwrap();
        assert_eq!(db.get_setting("geolocation.enabled").unwrap(), None);
    }

    #[test]
    fn test_malformed_value_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value, updated_at) VALUES ('broken', '{not json', ?1)",
                [Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(
            db.get_setting("broken"),
            Err(StorageError::MalformedValue { .. })
        ));
        // Listing skips the broken row rather than failing
        assert!(db.list_settings().unwrap().is_empty());
    }

    #[test]
    fn test_set_settings_batch() {
        let db = Database::open_in_memory().unwrap();
        db.set_settings(&[
            ("geolocation.blur.type", json!("blur")),
            ("geolocation.blur.radius", json!(5)),
        ])
        .unwrap();

        let keys: Vec<String> = db
            .list_settings()
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["geolocation.blur.radius", "geolocation.blur.type"]);
    }
}
