// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rusqlite::{Connection, Result, TransactionBehavior};
use rusqlite_migration::{M, Migrations};
use std::time::{SystemTime, UNIX_EPOCH};

use super::sql::{
    sql_delete_pending_derivation, sql_insert_events_batch, sql_select_events_after,
    sql_select_pending_derivations,
};
use super::{NewEvent, PendingDerivation, StorageOpenError, StoredEvent};

const MIGRATION_0001_SCHEMA: &str = include_str!("migrations/0001_schema.sql");

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: &str, synchronous: &str) -> std::result::Result<Self, StorageOpenError> {
        let conn = Self::open_connection_with_migrations(path, synchronous)?;
        Ok(Self { conn })
    }

    pub fn open_connection(
        path: &str,
        synchronous: &str,
    ) -> std::result::Result<Connection, StorageOpenError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", synchronous)?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Ok(conn)
    }

    pub fn open_connection_with_migrations(
        path: &str,
        synchronous: &str,
    ) -> std::result::Result<Connection, StorageOpenError> {
        let mut conn = Self::open_connection(path, synchronous)?;
        Self::run_migrations(&mut conn)?;
        Ok(conn)
    }

    pub fn run_migrations(conn: &mut Connection) -> std::result::Result<(), StorageOpenError> {
        Migrations::new(vec![M::up(MIGRATION_0001_SCHEMA)]).to_latest(conn)?;
        Ok(())
    }

    /// Writes a chunk of journal entries in one transaction.
    pub fn append_events(&mut self, events: &[NewEvent], at: SystemTime) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        sql_insert_events_batch(&tx, events, system_time_to_unix_ms(at))?;
        tx.commit()
    }

    pub fn load_events_after(&mut self, after_id: u64, limit: usize) -> Result<Vec<StoredEvent>> {
        sql_select_events_after(&self.conn, u64_to_i64(after_id), usize_to_i64(limit))
    }

    pub fn load_pending_derivations(&mut self, limit: usize) -> Result<Vec<PendingDerivation>> {
        sql_select_pending_derivations(&self.conn, usize_to_i64(limit))
    }

    pub fn resolve_pending_derivation(&mut self, tx_hash: &str) -> Result<bool> {
        Ok(sql_delete_pending_derivation(&self.conn, tx_hash)? > 0)
    }
}

fn system_time_to_unix_ms(value: SystemTime) -> i64 {
    let millis = value
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn temp_storage() -> (TempDir, Storage) {
        let dir = tempfile::Builder::new()
            .prefix("registrar-storage-")
            .tempdir()
            .expect("create temporary test directory");
        let path = dir.path().join("registrar.sqlite");
        let storage =
            Storage::open(path.to_string_lossy().as_ref(), "NORMAL").expect("open storage");
        (dir, storage)
    }

    fn event(log_type: &'static str, tx_hash: &str, pending: bool) -> NewEvent {
        NewEvent {
            log_type,
            tx_hash: Some(tx_hash.to_string()),
            payload_json: format!(r#"{{"txHash":"{tx_hash}"}}"#),
            pending_derivation: pending,
        }
    }

    #[test]
    fn appended_events_are_read_back_in_order() {
        let (_dir, mut storage) = temp_storage();
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);

        storage
            .append_events(
                &[event("ISCNFreeRegister", "AA", false), event("ISCNFreeRegister", "BB", false)],
                at,
            )
            .expect("append events");

        let events = storage.load_events_after(0, 10).expect("load events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tx_hash.as_deref(), Some("AA"));
        assert_eq!(events[1].tx_hash.as_deref(), Some("BB"));
        assert_eq!(events[0].created_at_ms, 1_700_000_000_123);

        let tail = storage.load_events_after(events[0].id, 10).expect("load tail");
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].id, events[1].id);
    }

    #[test]
    fn pending_derivations_are_deduplicated_and_resolvable() {
        let (_dir, mut storage) = temp_storage();

        storage
            .append_events(
                &[
                    event("ISCNDerivationMissing", "CC", true),
                    event("ISCNDerivationMissing", "CC", true),
                    event("ISCNFreeRegister", "DD", false),
                ],
                SystemTime::now(),
            )
            .expect("append events");

        let pending = storage.load_pending_derivations(10).expect("load pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].tx_hash, "CC");

        assert!(storage.resolve_pending_derivation("CC").expect("resolve"));
        assert!(!storage.resolve_pending_derivation("CC").expect("resolve again"));
        assert!(storage.load_pending_derivations(10).expect("load").is_empty());
    }

    #[test]
    fn reopening_keeps_schema_and_rows() {
        let dir = tempfile::Builder::new()
            .prefix("registrar-storage-reopen-")
            .tempdir()
            .expect("create temporary test directory");
        let path = dir.path().join("registrar.sqlite");
        let path = path.to_string_lossy().into_owned();

        {
            let mut storage = Storage::open(&path, "FULL").expect("open storage");
            storage
                .append_events(&[event("ISCNFreeRegister", "EE", false)], SystemTime::now())
                .expect("append");
        }
        let mut storage = Storage::open(&path, "NORMAL").expect("reopen storage");
        assert_eq!(storage.load_events_after(0, 10).expect("load").len(), 1);
    }
}
