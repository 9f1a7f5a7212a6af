// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use registrar_core::{BroadcastResult, SignedTx, SignerData, SignerIdentity};

use super::{SequencerError, SequencerStats};
use crate::client::ServiceError;
use crate::ledger::{BroadcastError, Ledger};
use crate::sequence_cache::SequenceCache;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone)]
pub struct TxSequencerConfig {
    pub chain_id: String,
    /// Total broadcasts per submission, first attempt included.
    pub max_attempts: u32,
}

/// Serializes use of the shared signer: every submission gets a reserved
/// sequence, and a sequence mismatch is repaired by resyncing from the
/// ledger and rebuilding the tx.
pub struct TxSequencer {
    cache: Arc<SequenceCache>,
    ledger: Arc<dyn Ledger>,
    config: TxSequencerConfig,
    stats: Arc<SequencerStats>,
}

impl TxSequencer {
    pub fn new(cache: Arc<SequenceCache>, ledger: Arc<dyn Ledger>, config: TxSequencerConfig) -> Self {
        Self {
            cache,
            ledger,
            config,
            stats: Arc::new(SequencerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<SequencerStats> {
        self.stats.clone()
    }

    pub async fn identity(&self) -> Result<SignerIdentity, SequencerError> {
        self.cache
            .resolve_identity()
            .await
            .map_err(|source| SequencerError::Identity { source })
    }

    /// Builds and broadcasts one tx. `build` is called again with a fresh
    /// sequence after each mismatch, since a signature commits to its sequence.
    pub async fn submit<F, Fut>(&self, label: &str, build: F) -> Result<BroadcastResult, SequencerError>
    where
        F: Fn(SignerData) -> Fut + Send + Sync,
        Fut: Future<Output = Result<SignedTx, ServiceError>> + Send,
    {
        self.stats.on_submission();
        let result = self.submit_inner(label, &build).await;
        if result.is_err() {
            self.stats.on_failure();
        }
        result
    }

    async fn submit_inner<F, Fut>(&self, label: &str, build: &F) -> Result<BroadcastResult, SequencerError>
    where
        F: Fn(SignerData) -> Fut + Send + Sync,
        Fut: Future<Output = Result<SignedTx, ServiceError>> + Send,
    {
        let identity = self.identity().await?;
        let max_attempts = self.config.max_attempts.max(1);
        let mut reservation = self
            .cache
            .current_sequence()
            .await
            .map_err(|source| SequencerError::Sequence { source })?;

        let mut attempt = 1_u32;
        loop {
            let sequence = reservation.sequence;
            let signer_data = SignerData {
                account_number: identity.account_number,
                sequence,
                chain_id: self.config.chain_id.clone(),
            };
            let signed = build(signer_data)
                .await
                .map_err(|source| SequencerError::Build { sequence, source })?;

            let started_at = Instant::now();
            let outcome = self.ledger.broadcast(&signed).await;
            self.stats.on_broadcast(started_at.elapsed());

            match outcome {
                Ok(result) => {
                    self.stats.on_accepted();
                    info!(
                        label,
                        sequence,
                        attempt,
                        tx_hash = %result.transaction_hash,
                        "tx broadcast accepted"
                    );
                    return Ok(result);
                }
                Err(BroadcastError::SequenceMismatch { sent }) => {
                    self.stats.on_sequence_mismatch();
                    if attempt >= max_attempts {
                        warn!(label, sequence = sent, attempt, "sequence mismatch, giving up");
                        return Err(SequencerError::SequenceRetriesExhausted {
                            attempts: attempt,
                            last_sequence: sent,
                        });
                    }
                    reservation = self
                        .cache
                        .resync_sequence(reservation)
                        .await
                        .map_err(|source| SequencerError::Sequence { source })?;
                    self.stats.on_resync();
                    warn!(
                        label,
                        rejected_sequence = sent,
                        retry_sequence = reservation.sequence,
                        attempt,
                        "sequence mismatch, retrying"
                    );
                    attempt += 1;
                }
                Err(source) => {
                    warn!(label, sequence, attempt, error = %source, "tx broadcast failed");
                    return Err(SequencerError::Broadcast { sequence, source });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLedger, FakeSigner, ScriptedBroadcast};
    use std::collections::BTreeSet;

    fn sequencer(ledger: &Arc<FakeLedger>, max_attempts: u32) -> TxSequencer {
        let signer = Arc::new(FakeSigner::default());
        let cache = Arc::new(SequenceCache::new(ledger.clone(), signer));
        TxSequencer::new(
            cache,
            ledger.clone(),
            TxSequencerConfig {
                chain_id: "test-chain".to_string(),
                max_attempts,
            },
        )
    }

    fn build_tx(data: SignerData) -> impl Future<Output = Result<SignedTx, ServiceError>> + Send {
        async move {
            Ok(SignedTx {
                tx_bytes: format!("tx:{}:{}", data.chain_id, data.sequence).into_bytes(),
                sequence: data.sequence,
            })
        }
    }

    #[tokio::test]
    async fn happy_path_broadcasts_once_with_reserved_sequence() {
        let ledger = Arc::new(FakeLedger::new(7, 12));
        let sequencer = sequencer(&ledger, 3);

        let result = sequencer.submit("test", build_tx).await.expect("broadcast");

        assert_eq!(ledger.attempted_sequences(), vec![12]);
        assert_eq!(result.transaction_hash, FakeLedger::tx_hash_for(12));
        assert_eq!(sequencer.stats().snapshot().accepted, 1);
    }

    #[tokio::test]
    async fn mismatch_resyncs_and_retries_with_chain_sequence() {
        let ledger = Arc::new(FakeLedger::new(7, 5));
        ledger.script(ScriptedBroadcast::SequenceMismatch {
            chain_sequence: Some(8),
        });
        let sequencer = sequencer(&ledger, 3);

        let result = sequencer.submit("test", build_tx).await.expect("broadcast");

        assert_eq!(ledger.attempted_sequences(), vec![5, 8]);
        assert_eq!(ledger.accepted_sequences(), vec![8]);
        assert_eq!(result.transaction_hash, FakeLedger::tx_hash_for(8));
        let stats = sequencer.stats().snapshot();
        assert_eq!(stats.sequence_mismatches, 1);
        assert_eq!(stats.resyncs, 1);
    }

    #[tokio::test]
    async fn persistent_mismatch_stops_at_attempt_ceiling() {
        let ledger = Arc::new(FakeLedger::new(7, 5));
        for _ in 0..5 {
            ledger.script(ScriptedBroadcast::SequenceMismatch {
                chain_sequence: None,
            });
        }
        let sequencer = sequencer(&ledger, 3);

        let err = sequencer.submit("test", build_tx).await.unwrap_err();

        assert!(matches!(
            err,
            SequencerError::SequenceRetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(ledger.attempted_sequences().len(), 3);
        assert_eq!(sequencer.stats().snapshot().failures, 1);
    }

    #[tokio::test]
    async fn other_rejections_are_not_retried() {
        let ledger = Arc::new(FakeLedger::new(7, 5));
        ledger.script(ScriptedBroadcast::Reject {
            code: 13,
            log: "insufficient fee".to_string(),
        });
        let sequencer = sequencer(&ledger, 3);

        let err = sequencer.submit("test", build_tx).await.unwrap_err();

        assert!(matches!(
            err,
            SequencerError::Broadcast {
                sequence: 5,
                source: BroadcastError::Rejected { code: 13, .. }
            }
        ));
        assert_eq!(ledger.attempted_sequences(), vec![5]);
    }

    #[tokio::test]
    async fn build_failure_is_reported_without_broadcast() {
        let ledger = Arc::new(FakeLedger::new(7, 5));
        let sequencer = sequencer(&ledger, 3);

        let err = sequencer
            .submit("test", |data: SignerData| async move {
                Err::<SignedTx, _>(ServiceError::Transport {
                    url: "signer".to_string(),
                    reason: format!("down at {}", data.sequence),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, SequencerError::Build { sequence: 5, .. }));
        assert!(ledger.attempted_sequences().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_mismatches_retry_with_distinct_sequences() {
        let ledger = Arc::new(FakeLedger::new(7, 10));
        for _ in 0..2 {
            ledger.script(ScriptedBroadcast::SequenceMismatch {
                chain_sequence: Some(20),
            });
        }
        let sequencer = Arc::new(sequencer(&ledger, 3));
        let slow_build = |data: SignerData| async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            build_tx(data).await
        };

        let (a, b) = tokio::join!(
            sequencer.submit("a", slow_build),
            sequencer.submit("b", slow_build)
        );
        let a = a.expect("first submission");
        let b = b.expect("second submission");

        assert_ne!(a.transaction_hash, b.transaction_hash);
        let attempted = ledger.attempted_sequences();
        let mut first_round = attempted[..2].to_vec();
        first_round.sort_unstable();
        let mut retries = attempted[2..].to_vec();
        retries.sort_unstable();
        assert_eq!(first_round, vec![10, 11]);
        assert_eq!(retries, vec![20, 21]);
        // Identity, first sequence, then a single resync for both mismatches.
        assert_eq!(ledger.account_queries(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_use_a_contiguous_sequence_range() {
        let ledger = Arc::new(FakeLedger::new(7, 100));
        let sequencer = Arc::new(sequencer(&ledger, 3));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let sequencer = sequencer.clone();
                tokio::spawn(async move { sequencer.submit("test", build_tx).await })
            })
            .collect();
        let mut hashes = BTreeSet::new();
        for handle in handles {
            let result = handle.await.expect("join").expect("broadcast");
            assert!(hashes.insert(result.transaction_hash));
        }

        let mut accepted = ledger.accepted_sequences();
        accepted.sort_unstable();
        assert_eq!(accepted, (100..120).collect::<Vec<_>>());
    }
}
