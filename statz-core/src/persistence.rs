//! Durable storage for cached statistics.
//!
//! The cache only talks to storage through the [`StatStore`] trait. The
//! bundled [`SqliteStore`] keeps one row per entity:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS entity_stats (
//!     entity_id  TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! `data` is the JSON list of [`RecordData`] rows. Records are rebuilt
//! through the [`SpecificationRegistry`] on load, so stored data that no
//! longer fits its specification is reported instead of cached.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};

use crate::catalog::SpecificationRegistry;
use crate::config::PersistenceConfig;
use crate::entity::EntityInfo;
use crate::error::{Result, StatzError};
use crate::record::RecordData;
use crate::types::EntityId;

/// A backend that durably keeps merged statistics.
pub trait StatStore: Send + Sync {
    /// Load the stored aggregate for `id`, if any.
    ///
    /// # Errors
    /// Backend or decoding failures.
    fn load(&self, id: EntityId) -> Result<Option<EntityInfo>>;

    /// Store (upsert) the aggregate for `id`.
    ///
    /// # Errors
    /// Backend or encoding failures.
    fn save(&self, id: EntityId, info: &EntityInfo) -> Result<()>;

    /// Delete the stored aggregate for `id`, returning whether one existed.
    ///
    /// # Errors
    /// Backend failures.
    fn delete(&self, id: EntityId) -> Result<bool>;
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    format!("{:08x}", !crc)
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entity_stats (
    entity_id  TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// [`StatStore`] backed by a single SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    registry: Arc<SpecificationRegistry>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns [`StatzError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: &PersistenceConfig,
        registry: Arc<SpecificationRegistry>,
    ) -> Result<Self> {
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

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Statistics store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            registry,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    /// Returns [`StatzError::Database`] on SQLite failures.
    pub fn open_in_memory(
        config: &PersistenceConfig,
        registry: Arc<SpecificationRegistry>,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            registry,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the underlying database.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// All entity ids with stored statistics.
    ///
    /// # Errors
    /// Returns [`StatzError::Database`] on SQLite failures.
    pub fn list_entities(&self) -> Result<Vec<EntityId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT entity_id FROM entity_stats")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut entities = Vec::new();
        for row in rows {
            let id_str = row?;
            match uuid::Uuid::parse_str(&id_str) {
                Ok(uuid) => entities.push(EntityId(uuid)),
                Err(_) => warn!(id = %id_str, "Skipping row with invalid UUID"),
            }
        }
        Ok(entities)
    }

    /// Number of stored entities.
    ///
    /// # Errors
    /// Returns [`StatzError::Database`] on SQLite failures.
    pub fn entity_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM entity_stats", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl StatStore for SqliteStore {
    fn load(&self, id: EntityId) -> Result<Option<EntityInfo>> {
        let start = Instant::now();
        let row: Option<(Vec<u8>, Option<String>)> = self
            .conn
            .lock()
            .prepare_cached("SELECT data, checksum FROM entity_stats WHERE entity_id = ?1")?
            .query_row(params![id.0.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(
                        entity = %id,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, stored statistics may be corrupt"
                    );
                }
            }
        }

        let rows: Vec<RecordData> =
            serde_json::from_slice(&data).map_err(|e| StatzError::Serialization(e.to_string()))?;
        let info = self.registry.info_from_data(rows)?;

        debug!(
            entity = %id,
            records = info.total_count(),
            elapsed_us = start.elapsed().as_micros(),
            "Loaded statistics"
        );
        Ok(Some(info))
    }

    fn save(&self, id: EntityId, info: &EntityInfo) -> Result<()> {
        let start = Instant::now();
        let json = serde_json::to_vec(&info.to_data())
            .map_err(|e| StatzError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));

        self.conn.lock().execute(
            "INSERT INTO entity_stats (entity_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![id.0.to_string(), json, Utc::now().to_rfc3339(), checksum],
        )?;

        debug!(
            entity = %id,
            records = info.total_count(),
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved statistics"
        );
        Ok(())
    }

    fn delete(&self, id: EntityId) -> Result<bool> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM entity_stats WHERE entity_id = ?1",
            params![id.0.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Location, StatType, Value};

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory(
            &PersistenceConfig::default(),
            Arc::new(SpecificationRegistry::with_defaults()),
        )
        .expect("in-memory store")
    }

    fn sample(store: &SqliteStore) -> EntityInfo {
        let reg = &store.registry;
        EntityInfo::from_records([
            reg.build(
                &StatType::BlocksPlaced,
                [
                    ("world", Value::Token("A".into())),
                    ("material", Value::Token("STONE".into())),
                    ("count", Value::Integer(5)),
                ],
            )
            .expect("record"),
            reg.build(
                &StatType::Deaths,
                [
                    ("world", Value::Token("A".into())),
                    ("cause", Value::Text("fall".into())),
                    ("location", Value::Location(Location::new("A", 1.0, 2.0, 3.0))),
                ],
            )
            .expect("record"),
        ])
    }

    #[test]
    fn round_trip_save_load() {
        let store = store();
        let id = EntityId::new();
        let info = sample(&store);

        store.save(id, &info).expect("save");
        let loaded = store.load(id).expect("load").expect("found");
        assert_eq!(loaded, info);
    }

    #[test]
    fn load_nonexistent_returns_none() {
        assert!(store().load(EntityId::new()).expect("load").is_none());
    }

    #[test]
    fn upsert_overwrites() {
        let store = store();
        let id = EntityId::new();
        store.save(id, &sample(&store)).expect("save");
        store.save(id, &EntityInfo::new()).expect("save");

        let loaded = store.load(id).expect("load").expect("found");
        assert!(loaded.is_empty());
        assert_eq!(store.entity_count().expect("count"), 1);
    }

    #[test]
    fn delete_and_list() {
        let store = store();
        let a = EntityId::new();
        let b = EntityId::new();
        store.save(a, &sample(&store)).expect("save");
        store.save(b, &sample(&store)).expect("save");

        let mut listed = store.list_entities().expect("list");
        listed.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(listed, expected);

        assert!(store.delete(a).expect("delete"));
        assert!(!store.delete(a).expect("delete again"));
        assert_eq!(store.entity_count().expect("count"), 1);
    }

    #[test]
    fn corrupt_checksum_still_loads() {
        let store = store();
        let id = EntityId::new();
        store.save(id, &sample(&store)).expect("save");
        store
            .conn
            .lock()
            .execute(
                "UPDATE entity_stats SET checksum = 'deadbeef' WHERE entity_id = ?1",
                params![id.0.to_string()],
            )
            .expect("tamper");

        assert!(store.load(id).expect("load").is_some());
    }

    #[test]
    fn file_based_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stats.db");
        let registry = Arc::new(SpecificationRegistry::with_defaults());
        let id = EntityId::new();

        {
            let store = SqliteStore::open(&path, &PersistenceConfig::default(), Arc::clone(&registry))
                .expect("open");
            store.save(id, &sample(&store)).expect("save");
        }

        let reopened =
            SqliteStore::open(&path, &PersistenceConfig::default(), registry).expect("reopen");
        assert!(reopened.load(id).expect("load").is_some());
        assert_eq!(reopened.db_path(), path.as_path());
    }

    #[test]
    fn crc32_basic() {
        assert_eq!(crc32_hex(b"123456789"), "cbf43926");
    }
}
