//! SQLite-based store implementation

use rollcall_api::{SessionSettings, Snapshot};
use rollcall_util::ParticipantId;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::{INSTRUCTORS_KEY, SETTINGS_KEY, SNAPSHOTS_KEY, Store, StoreError, StoreResult};

/// SQLite-backed key-value store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("store lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- One JSON document per logical record
            CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                value_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn read_record<T: DeserializeOwned>(conn: &Connection, key: &str) -> StoreResult<Option<T>> {
    let json: Option<String> = conn
        .query_row(
            "SELECT value_json FROM records WHERE key = ?",
            [key],
            |row| row.get(0),
        )
        .optional()?;

    match json {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

fn write_record<T: Serialize + ?Sized>(conn: &Connection, key: &str, value: &T) -> StoreResult<()> {
    let json = serde_json::to_string(value)?;

    conn.execute(
        r#"
        INSERT INTO records (key, value_json, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key)
        DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at
        "#,
        params![key, json, rollcall_util::now().to_rfc3339()],
    )?;

    debug!(key, bytes = json.len(), "Record written");
    Ok(())
}

fn record_exists(conn: &Connection, key: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM records WHERE key = ?", [key], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

impl Store for SqliteStore {
    fn load_instructors(&self) -> StoreResult<Vec<ParticipantId>> {
        let conn = self.conn()?;
        Ok(read_record(&conn, INSTRUCTORS_KEY)?.unwrap_or_default())
    }

    fn save_instructors(&self, instructors: &[ParticipantId]) -> StoreResult<()> {
        let conn = self.conn()?;
        write_record(&conn, INSTRUCTORS_KEY, instructors)
    }

    fn load_settings(&self) -> StoreResult<SessionSettings> {
        let conn = self.conn()?;
        read_record(&conn, SETTINGS_KEY)?
            .ok_or_else(|| StoreError::NotFound(SETTINGS_KEY.into()))
    }

    fn save_settings(&self, settings: &SessionSettings) -> StoreResult<()> {
        let conn = self.conn()?;
        write_record(&conn, SETTINGS_KEY, settings)
    }

    fn load_snapshots(&self) -> StoreResult<Vec<Snapshot>> {
        let conn = self.conn()?;
        Ok(read_record(&conn, SNAPSHOTS_KEY)?.unwrap_or_default())
    }

    fn save_snapshots(&self, snapshots: &[Snapshot]) -> StoreResult<()> {
        let conn = self.conn()?;
        write_record(&conn, SNAPSHOTS_KEY, snapshots)
    }

    fn prepare_for_startup(
        &self,
        defaults: &SessionSettings,
        seed_instructors: &[ParticipantId],
    ) -> StoreResult<()> {
        let conn = self.conn()?;

        if !record_exists(&conn, INSTRUCTORS_KEY)? {
            let mut seeded: Vec<ParticipantId> = Vec::with_capacity(seed_instructors.len());
            for id in seed_instructors {
                if !seeded.contains(id) {
                    seeded.push(*id);
                }
            }
            write_record(&conn, INSTRUCTORS_KEY, &seeded)?;
            info!(count = seeded.len(), "Instructor registry created");
        }

        if !record_exists(&conn, SETTINGS_KEY)? {
            write_record(&conn, SETTINGS_KEY, defaults)?;
            info!("Session settings created with defaults");
        }

        let discarded = read_record::<Vec<Snapshot>>(&conn, SNAPSHOTS_KEY)?
            .map(|s| s.len())
            .unwrap_or(0);
        write_record(&conn, SNAPSHOTS_KEY, &Vec::<Snapshot>::new())?;
        if discarded > 0 {
            info!(discarded, "Snapshots from the previous run discarded");
        }

        Ok(())
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}
