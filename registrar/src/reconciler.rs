// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use registrar_core::IscnId;

use crate::ledger::RecordIndexer;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// `derived_id` is the indexer's string as returned, once it parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub derived_id: Option<String>,
    pub attempts: u32,
}

/// Polls the indexer until a broadcast tx shows its derived record id.
/// Running out of attempts is not an error: the tx may still land later.
pub struct ResultReconciler {
    indexer: Arc<dyn RecordIndexer>,
    policy: ReconcilePolicy,
}

impl ResultReconciler {
    pub fn new(indexer: Arc<dyn RecordIndexer>, policy: ReconcilePolicy) -> Self {
        Self { indexer, policy }
    }

    pub async fn await_derivation_default(&self, tx_hash: &str) -> ReconciliationResult {
        self.await_derivation(tx_hash, self.policy.max_attempts, self.policy.interval)
            .await
    }

    /// Sleeps `interval` between polls, never after the last one.
    pub async fn await_derivation(
        &self,
        tx_hash: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> ReconciliationResult {
        for attempt in 1..=max_attempts {
            match self.indexer.record_ids_by_tx(tx_hash).await {
                Ok(ids) => {
                    if let Some(derived_id) = first_well_formed(tx_hash, ids) {
                        info!(tx_hash, iscn_id = %derived_id, attempt, "derived record id found");
                        return ReconciliationResult {
                            derived_id: Some(derived_id),
                            attempts: attempt,
                        };
                    }
                    debug!(tx_hash, attempt, "derived record id not indexed yet");
                }
                Err(err) => {
                    warn!(tx_hash, attempt, error = %err, "indexer query failed");
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        ReconciliationResult {
            derived_id: None,
            attempts: max_attempts,
        }
    }
}

fn first_well_formed(tx_hash: &str, ids: Vec<String>) -> Option<String> {
    ids.into_iter().find_map(|raw| match IscnId::parse(&raw) {
        Ok(_) => Some(raw),
        Err(err) => {
            warn!(tx_hash, error = %err, "indexer returned malformed record id");
            None
        }
    })
}
