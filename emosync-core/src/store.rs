//! Key/value persistence for durable client state.
//!
//! The credential and the last-known emotional state survive restarts
//! through a [`KvStore`]. Callers only ever see string keys and string
//! values, so the backing technology can change freely:
//!
//! - [`SqliteStore`]: durable, one row per key
//! - [`MemoryStore`]: process-local, for tests and ephemeral sessions
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS kv_entries (
//!     key        TEXT PRIMARY KEY,
//!     value      TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::Result;

/// Fixed storage keys.
pub mod keys {
    /// Raw bearer token (no scheme prefix).
    pub const RAW_TOKEN: &str = "auth.raw_token";
    /// Authorization scheme.
    pub const TOKEN_SCHEME: &str = "auth.token_scheme";
    /// Backend user id.
    pub const USER_ID: &str = "auth.user_id";
    /// RFC 3339 expiry, when known.
    pub const EXPIRES_AT: &str = "auth.expires_at";
    /// JSON snapshot of the last emotional state.
    pub const LAST_EMOTION: &str = "state.last_emotion";
}

/// String-keyed durable storage.
pub trait KvStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Backend failure.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write (upsert) a value.
    ///
    /// # Errors
    /// Backend failure.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a value. Returns `true` if something was removed.
    ///
    /// # Errors
    /// Backend failure.
    fn remove(&self, key: &str) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.entries.lock().remove(key).is_some())
    }
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 / ITU-T V.42).
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SQLite backend
// ---------------------------------------------------------------------------

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_entries (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

/// SQLite-backed store.
///
/// ```no_run
/// # use emosync_core::store::{KvStore, SqliteStore};
/// # use emosync_core::config::StorageConfig;
/// let store = SqliteStore::open("emosync.db", &StorageConfig::default())?;
/// store.set("greeting", "hello")?;
/// assert_eq!(store.get("greeting")?.as_deref(), Some("hello"));
/// # Ok::<(), emosync_core::error::CoreError>(())
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
    checksum_enabled: bool,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("checksum_enabled", &self.checksum_enabled)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    /// Returns [`crate::CoreError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Client state store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            checksum_enabled: config.checksum_enabled,
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`crate::CoreError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            checksum_enabled: config.checksum_enabled,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run SQLite's integrity check.
    ///
    /// # Errors
    /// Returns [`crate::CoreError::Database`] if the check query fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT value, checksum FROM kv_entries WHERE key = ?1")?;
        let row: Option<(String, Option<String>)> = match stmt.query_row(params![key], |row| Ok((row.get(0)?, row.get(1)?))) {
            Ok(found) => Some(found),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        let Some((value, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(value.as_bytes());
                if expected != actual {
                    warn!(key, %expected, %actual, "Checksum mismatch, possible state corruption");
                }
            }
        }

        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let checksum = self.checksum_enabled.then(|| crc32_hex(value.as_bytes()));
        let now = Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO kv_entries (key, value, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![key, value, now, checksum],
        )?;
        debug!(key, bytes = value.len(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StorageConfig {
        StorageConfig {
            checksum_enabled: true,
            ..StorageConfig::default()
        }
    }

    fn exercise(store: &dyn KvStore) {
        assert_eq!(store.get("missing").expect("get"), None);
        store.set("k", "v1").expect("set");
        store.set("k", "v2").expect("upsert");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("v2"));
        assert!(store.remove("k").expect("remove"));
        assert!(!store.remove("k").expect("remove again"));
        assert_eq!(store.get("k").expect("get"), None);
    }

    #[test]
    fn memory_store_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn sqlite_store_contract() {
        exercise(&SqliteStore::open_in_memory(&config()).expect("open"));
    }

    #[test]
    fn checksum_mismatch_still_returns_value() {
        let store = SqliteStore::open_in_memory(&config()).expect("open");
        store.set("k", "payload").expect("set");
        store
            .conn
            .lock()
            .execute("UPDATE kv_entries SET checksum = 'deadbeef' WHERE key = 'k'", [])
            .expect("corrupt checksum");
        assert_eq!(store.get("k").expect("get").as_deref(), Some("payload"));
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.db");
        {
            let store = SqliteStore::open(&path, &config()).expect("open");
            store.set(keys::USER_ID, "user-7").expect("set");
            assert!(store.integrity_check().expect("check"));
        }
        let reopened = SqliteStore::open(&path, &config()).expect("reopen");
        assert_eq!(reopened.get(keys::USER_ID).expect("get").as_deref(), Some("user-7"));
    }

    #[test]
    fn crc32_basic() {
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}
