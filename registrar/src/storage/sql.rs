// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rusqlite::{Connection, Result, Row, Transaction, params};

use super::{NewEvent, PendingDerivation, StoredEvent};

const SQL_INSERT_EVENT: &str = "INSERT INTO events (log_type, tx_hash, payload_json, created_at_ms) \
     VALUES (?1, ?2, ?3, ?4)";
const SQL_INSERT_PENDING_DERIVATION: &str = "INSERT OR IGNORE INTO pending_derivations (tx_hash, created_at_ms) \
     VALUES (?1, ?2)";
const SQL_SELECT_EVENTS_AFTER: &str = "SELECT id, log_type, tx_hash, payload_json, created_at_ms \
     FROM events WHERE id > ?1 ORDER BY id ASC LIMIT ?2";
const SQL_SELECT_PENDING_DERIVATIONS: &str = "SELECT tx_hash, created_at_ms FROM pending_derivations \
     ORDER BY created_at_ms ASC, tx_hash ASC LIMIT ?1";
const SQL_DELETE_PENDING_DERIVATION: &str = "DELETE FROM pending_derivations WHERE tx_hash = ?1";

pub(super) fn sql_insert_events_batch(
    tx: &Transaction<'_>,
    events: &[NewEvent],
    created_at_ms: i64,
) -> Result<()> {
    let mut insert_event = tx.prepare_cached(SQL_INSERT_EVENT)?;
    let mut insert_pending = tx.prepare_cached(SQL_INSERT_PENDING_DERIVATION)?;
    for event in events {
        insert_event.execute(params![
            event.log_type,
            event.tx_hash,
            event.payload_json,
            created_at_ms
        ])?;
        if event.pending_derivation
            && let Some(tx_hash) = event.tx_hash.as_deref()
        {
            insert_pending.execute(params![tx_hash, created_at_ms])?;
        }
    }
    Ok(())
}

pub(super) fn sql_select_events_after(
    conn: &Connection,
    after_id: i64,
    limit: i64,
) -> Result<Vec<StoredEvent>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_EVENTS_AFTER)?;
    let mapped = stmt.query_map(params![after_id, limit], convert_row_to_stored_event)?;
    mapped.collect()
}

pub(super) fn sql_select_pending_derivations(
    conn: &Connection,
    limit: i64,
) -> Result<Vec<PendingDerivation>> {
    let mut stmt = conn.prepare_cached(SQL_SELECT_PENDING_DERIVATIONS)?;
    let mapped = stmt.query_map(params![limit], |row| {
        Ok(PendingDerivation {
            tx_hash: row.get(0)?,
            created_at_ms: i64_to_u64(row.get(1)?),
        })
    })?;
    mapped.collect()
}

pub(super) fn sql_delete_pending_derivation(conn: &Connection, tx_hash: &str) -> Result<usize> {
    conn.execute(SQL_DELETE_PENDING_DERIVATION, params![tx_hash])
}

fn convert_row_to_stored_event(row: &Row<'_>) -> Result<StoredEvent> {
    Ok(StoredEvent {
        id: i64_to_u64(row.get(0)?),
        log_type: row.get(1)?,
        tx_hash: row.get(2)?,
        payload_json: row.get(3)?,
        created_at_ms: i64_to_u64(row.get(4)?),
    })
}

fn i64_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
