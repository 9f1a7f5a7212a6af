// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod db;
mod sql;

use serde::Serialize;
use thiserror::Error;

pub use db::Storage;

#[derive(Debug, Error)]
pub enum StorageOpenError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Migration(#[from] rusqlite_migration::Error),
}

/// Journal row ready to be written. `pending_derivation` marks a broadcast
/// whose derived id was never observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub log_type: &'static str,
    pub tx_hash: Option<String>,
    pub payload_json: String,
    pub pending_derivation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: u64,
    pub log_type: String,
    pub tx_hash: Option<String>,
    pub payload_json: String,
    pub created_at_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDerivation {
    pub tx_hash: String,
    pub created_at_ms: u64,
}
