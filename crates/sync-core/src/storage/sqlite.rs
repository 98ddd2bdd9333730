//! SQLite-backed `StorageBackend`. Schema mirrors the persisted-state
//! layout in the external interfaces: four collections (`records`,
//! `pending_mutations`, `sync_cursors`, `snapshots`), indexed by
//! `(tenant_id)`, `(collection/type)`, and `(updated_at)` for records, and
//! by `(tenant_id, timestamp)`/`(collection)` for mutations.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::ids::{MutationId, TenantId};
use crate::types::{PendingMutation, Record, Snapshot, SyncCursor};

use super::traits::{ScanOptions, StorageBackend};

pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let backend = Self { conn: Mutex::new(conn) };
        backend.initialize()?;
        Ok(backend)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let backend = Self { conn: Mutex::new(conn) };
        backend.initialize()?;
        Ok(backend)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS records (
    tenant_id TEXT NOT NULL,
    collection TEXT NOT NULL,
    id TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted INTEGER NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (tenant_id, collection, id)
);
CREATE INDEX IF NOT EXISTS idx_records_tenant ON records(tenant_id);
CREATE INDEX IF NOT EXISTS idx_records_collection ON records(tenant_id, collection);
CREATE INDEX IF NOT EXISTS idx_records_updated_at ON records(tenant_id, updated_at);

CREATE TABLE IF NOT EXISTS pending_mutations (
    tenant_id TEXT NOT NULL,
    mutation_id TEXT NOT NULL,
    collection TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (tenant_id, mutation_id)
);
CREATE INDEX IF NOT EXISTS idx_mutations_tenant_seq ON pending_mutations(tenant_id, sequence);
CREATE INDEX IF NOT EXISTS idx_mutations_collection ON pending_mutations(tenant_id, collection);

CREATE TABLE IF NOT EXISTS terminal_failed_mutations (
    tenant_id TEXT NOT NULL,
    mutation_id TEXT NOT NULL,
    reason TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (tenant_id, mutation_id)
);

CREATE TABLE IF NOT EXISTS sync_cursors (
    tenant_id TEXT NOT NULL,
    collection TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (tenant_id, collection)
);

CREATE TABLE IF NOT EXISTS snapshots (
    tenant_id TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (tenant_id, entity_type)
);
"#,
        )?;
        Ok(())
    }
}

impl StorageBackend for SqliteBackend {
    fn get_record(&self, collection: &str, tenant_id: &TenantId, id: &str) -> Result<Option<Record>> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE tenant_id = ?1 AND collection = ?2 AND id = ?3",
                params![tenant_id.as_str(), collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match data {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    fn put_record(&self, record: &Record) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(record)?;
        conn.execute(
            "INSERT INTO records (tenant_id, collection, id, updated_at, deleted, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(tenant_id, collection, id) DO UPDATE SET
                updated_at = excluded.updated_at,
                deleted = excluded.deleted,
                data = excluded.data",
            params![
                record.tenant_id.as_str(),
                record.collection,
                record.id.as_str(),
                record.metadata.updated_at.to_rfc3339(),
                record.metadata.deleted as i64,
                data,
            ],
        )?;
        Ok(())
    }

    fn delete_record(&self, collection: &str, tenant_id: &TenantId, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM records WHERE tenant_id = ?1 AND collection = ?2 AND id = ?3",
            params![tenant_id.as_str(), collection, id],
        )?;
        Ok(())
    }

    fn scan_records(&self, collection: &str, options: &ScanOptions) -> Result<Vec<Record>> {
        let conn = self.conn.lock().unwrap();
        let tenant_filter = options.tenant_id.as_ref().map(|t| t.as_str().to_string());

        let mut sql = String::from("SELECT data FROM records WHERE collection = ?1");
        if tenant_filter.is_some() {
            sql.push_str(" AND tenant_id = ?2");
        }
        if !options.include_deleted {
            sql.push_str(" AND deleted = 0");
        }
        sql.push_str(" ORDER BY id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<String> = if let Some(tenant) = &tenant_filter {
            stmt.query_map(params![collection, tenant], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?
        } else {
            stmt.query_map(params![collection], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?
        };

        let offset = options.offset.unwrap_or(0);
        let mut records: Vec<Record> = Vec::new();
        for (i, json) in rows.into_iter().enumerate() {
            if i < offset {
                continue;
            }
            if let Some(limit) = options.limit {
                if records.len() >= limit {
                    break;
                }
            }
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }

    fn clear_collection(&self, collection: &str, tenant_id: &TenantId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM records WHERE tenant_id = ?1 AND collection = ?2",
            params![tenant_id.as_str(), collection],
        )?;
        conn.execute(
            "DELETE FROM pending_mutations WHERE tenant_id = ?1 AND collection = ?2",
            params![tenant_id.as_str(), collection],
        )?;
        Ok(())
    }

    fn append_mutation(&self, mutation: &PendingMutation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(mutation)?;
        conn.execute(
            "INSERT INTO pending_mutations (tenant_id, mutation_id, collection, sequence, timestamp, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                mutation.tenant_id.as_str(),
                mutation.mutation_id.as_str(),
                mutation.collection,
                mutation.sequence as i64,
                mutation.timestamp.to_rfc3339(),
                data,
            ],
        )?;
        Ok(())
    }

    fn pending_mutations(&self, tenant_id: &TenantId, limit: Option<usize>) -> Result<Vec<PendingMutation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT data FROM pending_mutations WHERE tenant_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows: Vec<String> = stmt
            .query_map(params![tenant_id.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let mut mutations = Vec::new();
        for json in rows {
            mutations.push(serde_json::from_str(&json)?);
            if let Some(limit) = limit {
                if mutations.len() >= limit {
                    break;
                }
            }
        }
        Ok(mutations)
    }

    fn remove_mutations_up_to(&self, tenant_id: &TenantId, mutation_id: &MutationId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let target_seq: Option<i64> = conn
            .query_row(
                "SELECT sequence FROM pending_mutations WHERE tenant_id = ?1 AND mutation_id = ?2",
                params![tenant_id.as_str(), mutation_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(seq) = target_seq {
            conn.execute(
                "DELETE FROM pending_mutations WHERE tenant_id = ?1 AND sequence <= ?2",
                params![tenant_id.as_str(), seq],
            )?;
        }
        Ok(())
    }

    fn update_mutation(&self, mutation: &PendingMutation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(mutation)?;
        conn.execute(
            "UPDATE pending_mutations SET data = ?1 WHERE tenant_id = ?2 AND mutation_id = ?3",
            params![data, mutation.tenant_id.as_str(), mutation.mutation_id.as_str()],
        )?;
        Ok(())
    }

    fn quarantine_mutation(&self, mutation: &PendingMutation, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(mutation)?;
        conn.execute(
            "INSERT INTO terminal_failed_mutations (tenant_id, mutation_id, reason, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(tenant_id, mutation_id) DO UPDATE SET reason = excluded.reason, data = excluded.data",
            params![mutation.tenant_id.as_str(), mutation.mutation_id.as_str(), reason, data],
        )?;
        conn.execute(
            "DELETE FROM pending_mutations WHERE tenant_id = ?1 AND mutation_id = ?2",
            params![mutation.tenant_id.as_str(), mutation.mutation_id.as_str()],
        )?;
        Ok(())
    }

    fn remove_mutation(&self, tenant_id: &TenantId, mutation_id: &MutationId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM pending_mutations WHERE tenant_id = ?1 AND mutation_id = ?2",
            params![tenant_id.as_str(), mutation_id.as_str()],
        )?;
        Ok(())
    }

    fn get_cursor(&self, tenant_id: &TenantId, collection: &str) -> Result<Option<SyncCursor>> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM sync_cursors WHERE tenant_id = ?1 AND collection = ?2",
                params![tenant_id.as_str(), collection],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match data {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    fn put_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(cursor)?;
        conn.execute(
            "INSERT INTO sync_cursors (tenant_id, collection, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, collection) DO UPDATE SET data = excluded.data",
            params![cursor.tenant_id.as_str(), cursor.collection, data],
        )?;
        Ok(())
    }

    fn put_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(snapshot)?;
        conn.execute(
            "INSERT INTO snapshots (tenant_id, entity_type, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, entity_type) DO UPDATE SET data = excluded.data",
            params![snapshot.tenant_id.as_str(), snapshot.entity_type, data],
        )?;
        Ok(())
    }

    fn get_snapshot(&self, tenant_id: &TenantId, entity_type: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().unwrap();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM snapshots WHERE tenant_id = ?1 AND entity_type = ?2",
                params![tenant_id.as_str(), entity_type],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match data {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN IMMEDIATE")?;
        drop(conn);

        match f() {
            Ok(()) => {
                let conn = self.conn.lock().unwrap();
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let conn = self.conn.lock().unwrap();
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}
