// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use registrar_core::SignerIdentity;

use crate::client::ServiceError;
use crate::ledger::{Ledger, TxSigner};

/// A reserved sequence number, tagged with the counter generation it was
/// taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub sequence: u64,
    generation: u64,
}

#[derive(Debug, Default)]
struct SequenceState {
    next: Option<u64>,
    /// Bumped on every resync from the ledger.
    generation: u64,
}

impl SequenceState {
    fn reserve(&mut self, sequence: u64) -> Reservation {
        self.next = Some(sequence.saturating_add(1));
        Reservation {
            sequence,
            generation: self.generation,
        }
    }
}

/// Process-wide view of the shared signer: its identity and the next
/// sequence number to hand out.
///
/// Every read of the next sequence reserves it, so two callers never receive
/// the same number from one cache state. The only way the counter moves
/// backwards is [`SequenceCache::resync_sequence`], which trusts the ledger
/// once per generation.
pub struct SequenceCache {
    ledger: Arc<dyn Ledger>,
    signer: Arc<dyn TxSigner>,
    identity: OnceCell<SignerIdentity>,
    state: Mutex<SequenceState>,
}

impl SequenceCache {
    pub fn new(ledger: Arc<dyn Ledger>, signer: Arc<dyn TxSigner>) -> Self {
        Self {
            ledger,
            signer,
            identity: OnceCell::new(),
            state: Mutex::new(SequenceState::default()),
        }
    }

    /// Concurrent first callers share one in-flight resolution. A failed
    /// resolution is not cached.
    pub async fn resolve_identity(&self) -> Result<SignerIdentity, ServiceError> {
        self.identity
            .get_or_try_init(|| async {
                let address = self.signer.address().await?;
                let account = self.ledger.account_info(&address).await?;
                info!(
                    address = %address,
                    account_number = account.account_number,
                    "resolved signer identity"
                );
                Ok::<_, ServiceError>(SignerIdentity {
                    address,
                    account_number: account.account_number,
                })
            })
            .await
            .cloned()
    }

    /// Returns the sequence to sign with and reserves it.
    pub async fn current_sequence(&self) -> Result<Reservation, ServiceError> {
        let identity = self.resolve_identity().await?;
        let mut state = self.state.lock().await;
        let sequence = match state.next {
            Some(sequence) => sequence,
            None => self.ledger.account_info(&identity.address).await?.sequence,
        };
        Ok(state.reserve(sequence))
    }

    /// Replaces a reservation the ledger rejected as stale.
    ///
    /// If nobody resynced since `stale` was taken, the counter is replaced
    /// with the ledger's view and the caller gets the chain sequence. If
    /// another caller already resynced, the ledger is not asked again and
    /// the next number from the corrected counter is reserved, so two
    /// concurrent resyncs never hand out the same number.
    pub async fn resync_sequence(&self, stale: Reservation) -> Result<Reservation, ServiceError> {
        let identity = self.resolve_identity().await?;
        let mut state = self.state.lock().await;
        if state.generation != stale.generation
            && let Some(next) = state.next
        {
            debug!(
                stale_sequence = stale.sequence,
                next, "counter already resynced, reserving next"
            );
            return Ok(state.reserve(next));
        }
        let chain_sequence = self.ledger.account_info(&identity.address).await?.sequence;
        warn!(
            cached_next = ?state.next,
            chain_sequence,
            "resynchronized signer sequence from ledger"
        );
        state.generation = state.generation.wrapping_add(1);
        Ok(state.reserve(chain_sequence))
    }

    /// Next number that would be handed out, without reserving it.
    #[cfg(test)]
    pub(crate) async fn peek(&self) -> Option<u64> {
        self.state.lock().await.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLedger, FakeSigner};
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn cache(ledger: &Arc<FakeLedger>) -> Arc<SequenceCache> {
        Arc::new(SequenceCache::new(
            ledger.clone(),
            Arc::new(FakeSigner::default()),
        ))
    }

    #[tokio::test]
    async fn concurrent_identity_resolution_queries_ledger_once() {
        let ledger = Arc::new(FakeLedger::new(11, 5).with_account_delay(Duration::from_millis(20)));
        let cache = cache(&ledger);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve_identity().await })
            })
            .collect();
        for handle in handles {
            let identity = handle.await.expect("join").expect("identity");
            assert_eq!(identity.account_number, 11);
            assert_eq!(identity.address, FakeSigner::ADDRESS);
        }
        assert_eq!(ledger.account_queries(), 1);
    }

    #[tokio::test]
    async fn failed_identity_resolution_is_retried() {
        let ledger = Arc::new(FakeLedger::new(11, 5));
        ledger.fail_account_queries(1);
        let cache = cache(&ledger);

        assert!(cache.resolve_identity().await.is_err());
        assert_eq!(
            cache.resolve_identity().await.expect("second try").account_number,
            11
        );
    }

    #[tokio::test]
    async fn reservations_are_unique_and_contiguous() {
        let ledger = Arc::new(FakeLedger::new(1, 40));
        let cache = cache(&ledger);

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.current_sequence().await })
            })
            .collect();
        let mut seen = BTreeSet::new();
        for handle in handles {
            let sequence = handle.await.expect("join").expect("sequence").sequence;
            assert!(seen.insert(sequence), "sequence {sequence} handed out twice");
        }
        assert_eq!(seen.into_iter().collect::<Vec<_>>(), (40..65).collect::<Vec<_>>());
        assert_eq!(cache.peek().await, Some(65));
    }

    #[tokio::test]
    async fn resync_overwrites_cache_and_reserves_corrected_number() {
        let ledger = Arc::new(FakeLedger::new(1, 5));
        let cache = cache(&ledger);

        assert_eq!(cache.current_sequence().await.expect("first").sequence, 5);
        let stale = cache.current_sequence().await.expect("second");
        assert_eq!(stale.sequence, 6);

        ledger.set_chain_sequence(9);
        let corrected = cache.resync_sequence(stale).await.expect("resync");
        assert_eq!(corrected.sequence, 9);
        assert_eq!(cache.current_sequence().await.expect("after resync").sequence, 10);

        ledger.set_chain_sequence(3);
        assert_eq!(cache.resync_sequence(corrected).await.expect("resync down").sequence, 3);
        assert_eq!(cache.peek().await, Some(4));
    }

    #[tokio::test]
    async fn concurrent_stale_reservations_resync_once() {
        let ledger = Arc::new(FakeLedger::new(1, 10));
        let cache = cache(&ledger);
        let first = cache.current_sequence().await.expect("first");
        let second = cache.current_sequence().await.expect("second");
        let queries_before = ledger.account_queries();

        ledger.set_chain_sequence(20);
        let (a, b) = tokio::join!(cache.resync_sequence(first), cache.resync_sequence(second));
        let mut retried = vec![a.expect("resync a").sequence, b.expect("resync b").sequence];
        retried.sort_unstable();

        assert_eq!(retried, vec![20, 21]);
        assert_eq!(ledger.account_queries(), queries_before + 1);
        assert_eq!(cache.peek().await, Some(22));
    }
}
