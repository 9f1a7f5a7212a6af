// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! In-memory ledger, signer, indexer, archive and publisher used by unit and
//! integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Notify;

use registrar_core::{
    AccountInfo, BroadcastResult, ContentDescriptor, FeeSchedule, SignedTx, SignerData,
};

use crate::archive::{ArchiveEntry, ArchiveEstimate, ArchiveFile, ArchiveService, ArchiveUpload};
use crate::client::ServiceError;
use crate::journal::{EventPublisher, RegistrarEvent};
use crate::ledger::{BroadcastError, Ledger, RecordIndexer, RecordTxEstimate, TxSigner};
use crate::reconciler::{ReconcilePolicy, ResultReconciler};
use crate::sequence_cache::SequenceCache;
use crate::tx_sequencer::{TxSequencer, TxSequencerConfig};
use crate::workflow::{Registrar, WorkflowConfig};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn unavailable(service: &str) -> ServiceError {
    ServiceError::Transport {
        url: format!("fake://{service}"),
        reason: "injected failure".to_string(),
    }
}

/// What the next broadcast does. With an empty script every broadcast is
/// accepted.
#[derive(Debug, Clone)]
pub enum ScriptedBroadcast {
    Accept,
    /// Rejects with a sequence mismatch, optionally moving the chain's
    /// account sequence first.
    SequenceMismatch { chain_sequence: Option<u64> },
    Reject { code: u32, log: String },
}

#[derive(Debug)]
struct LedgerState {
    account_number: u64,
    chain_sequence: u64,
    attempted: Vec<u64>,
    accepted: Vec<u64>,
    script: VecDeque<ScriptedBroadcast>,
    failing_account_queries: usize,
}

#[derive(Debug)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
    account_queries: AtomicUsize,
    account_delay: Duration,
}

impl FakeLedger {
    pub const GAS_WANTED: u64 = 200_000;
    pub const GAS_USED: u64 = 150_000;

    pub fn new(account_number: u64, chain_sequence: u64) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                account_number,
                chain_sequence,
                attempted: Vec::new(),
                accepted: Vec::new(),
                script: VecDeque::new(),
                failing_account_queries: 0,
            }),
            account_queries: AtomicUsize::new(0),
            account_delay: Duration::ZERO,
        }
    }

    pub fn with_account_delay(mut self, delay: Duration) -> Self {
        self.account_delay = delay;
        self
    }

    pub fn tx_hash_for(sequence: u64) -> String {
        format!("{sequence:064X}")
    }

    pub fn script(&self, step: ScriptedBroadcast) {
        lock(&self.state).script.push_back(step);
    }

    pub fn set_chain_sequence(&self, sequence: u64) {
        lock(&self.state).chain_sequence = sequence;
    }

    pub fn fail_account_queries(&self, count: usize) {
        lock(&self.state).failing_account_queries = count;
    }

    pub fn account_queries(&self) -> usize {
        self.account_queries.load(Ordering::SeqCst)
    }

    pub fn attempted_sequences(&self) -> Vec<u64> {
        lock(&self.state).attempted.clone()
    }

    pub fn accepted_sequences(&self) -> Vec<u64> {
        lock(&self.state).accepted.clone()
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn account_info(&self, _address: &str) -> Result<AccountInfo, ServiceError> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        if !self.account_delay.is_zero() {
            tokio::time::sleep(self.account_delay).await;
        }
        let mut state = lock(&self.state);
        if state.failing_account_queries > 0 {
            state.failing_account_queries -= 1;
            return Err(unavailable("ledger"));
        }
        Ok(AccountInfo {
            account_number: state.account_number,
            sequence: state.chain_sequence,
        })
    }

    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastResult, BroadcastError> {
        let mut state = lock(&self.state);
        state.attempted.push(tx.sequence);
        match state.script.pop_front().unwrap_or(ScriptedBroadcast::Accept) {
            ScriptedBroadcast::Accept => {
                state.accepted.push(tx.sequence);
                state.chain_sequence = state.chain_sequence.max(tx.sequence + 1);
                Ok(BroadcastResult {
                    transaction_hash: Self::tx_hash_for(tx.sequence),
                    gas_wanted: Self::GAS_WANTED,
                    gas_used: Self::GAS_USED,
                })
            }
            ScriptedBroadcast::SequenceMismatch { chain_sequence } => {
                if let Some(chain_sequence) = chain_sequence {
                    state.chain_sequence = chain_sequence;
                }
                Err(BroadcastError::SequenceMismatch { sent: tx.sequence })
            }
            ScriptedBroadcast::Reject { code, log } => Err(BroadcastError::Rejected {
                codespace: "sdk".to_string(),
                code,
                log,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedCall {
    pub kind: &'static str,
    pub sequence: u64,
    pub target: Option<String>,
    pub amount: Option<Decimal>,
    pub memo: Option<String>,
}

#[derive(Debug)]
pub struct FakeSigner {
    calls: Mutex<Vec<SignedCall>>,
    last_payload: Mutex<Option<ContentDescriptor>>,
    estimate: RecordTxEstimate,
    fail_estimates: AtomicBool,
    ownership_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for FakeSigner {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            last_payload: Mutex::new(None),
            estimate: RecordTxEstimate {
                gas_fee_amount: Decimal::from(2_000_000_u64),
                record_fee_amount: Decimal::from(1_000_000_u64),
            },
            fail_estimates: AtomicBool::new(false),
            ownership_gate: Mutex::new(None),
        }
    }
}

impl FakeSigner {
    pub const ADDRESS: &'static str = "like1sharedsigner";

    pub fn with_estimate(mut self, gas_fee_amount: Decimal, record_fee_amount: Decimal) -> Self {
        self.estimate = RecordTxEstimate {
            gas_fee_amount,
            record_fee_amount,
        };
        self
    }

    pub fn fail_estimates(&self, fail: bool) {
        self.fail_estimates.store(fail, Ordering::SeqCst);
    }

    /// Ownership transfers wait for one `notify_one` on the returned gate
    /// before signing.
    pub fn hold_ownership_transfers(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.ownership_gate) = Some(gate.clone());
        gate
    }

    pub fn signed(&self) -> Vec<SignedCall> {
        lock(&self.calls).clone()
    }

    pub fn last_record_payload(&self) -> Option<ContentDescriptor> {
        lock(&self.last_payload).clone()
    }

    fn sign(&self, call: SignedCall) -> SignedTx {
        let sequence = call.sequence;
        let tx_bytes = format!("{}:{}", call.kind, sequence).into_bytes();
        lock(&self.calls).push(call);
        SignedTx { tx_bytes, sequence }
    }

    fn check_estimates(&self) -> Result<(), ServiceError> {
        if self.fail_estimates.load(Ordering::SeqCst) {
            return Err(unavailable("signer"));
        }
        Ok(())
    }
}

#[async_trait]
impl TxSigner for FakeSigner {
    async fn address(&self) -> Result<String, ServiceError> {
        Ok(Self::ADDRESS.to_string())
    }

    async fn sign_create_record(
        &self,
        payload: &ContentDescriptor,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError> {
        *lock(&self.last_payload) = Some(payload.clone());
        Ok(self.sign(SignedCall {
            kind: "create_record",
            sequence: signer.sequence,
            target: None,
            amount: None,
            memo: None,
        }))
    }

    async fn sign_change_ownership(
        &self,
        new_owner: &str,
        _record_id: &str,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError> {
        let gate = lock(&self.ownership_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.sign(SignedCall {
            kind: "change_ownership",
            sequence: signer.sequence,
            target: Some(new_owner.to_string()),
            amount: None,
            memo: None,
        }))
    }

    async fn sign_send(
        &self,
        to: &str,
        amount: Decimal,
        memo: &str,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError> {
        Ok(self.sign(SignedCall {
            kind: "send",
            sequence: signer.sequence,
            target: Some(to.to_string()),
            amount: Some(amount),
            memo: Some(memo.to_string()),
        }))
    }

    async fn estimate_record_tx(
        &self,
        _payload: &ContentDescriptor,
    ) -> Result<RecordTxEstimate, ServiceError> {
        self.check_estimates()?;
        Ok(self.estimate)
    }

    async fn estimate_record_fee(
        &self,
        _payload: &ContentDescriptor,
    ) -> Result<Decimal, ServiceError> {
        self.check_estimates()?;
        Ok(self.estimate.record_fee_amount)
    }
}

/// Indexer that reveals published ids after a number of empty polls. In
/// deriving mode every tx hash yields [`FakeIndexer::derived_id_for`] at once.
#[derive(Debug, Default)]
pub struct FakeIndexer {
    published: Mutex<HashMap<String, (u32, Vec<String>)>>,
    polls: Mutex<HashMap<String, u32>>,
    failing_polls: AtomicUsize,
    deriving: bool,
}

impl FakeIndexer {
    pub fn deriving() -> Self {
        Self {
            deriving: true,
            ..Self::default()
        }
    }

    pub fn derived_id_for(tx_hash: &str) -> String {
        format!("iscn://likecoin-chain/{}/1", tx_hash.to_ascii_lowercase())
    }

    pub fn publish_after(&self, tx_hash: &str, empty_polls: u32, ids: Vec<String>) {
        lock(&self.published).insert(tx_hash.to_string(), (empty_polls, ids));
    }

    pub fn fail_polls(&self, count: usize) {
        self.failing_polls.store(count, Ordering::SeqCst);
    }

    pub fn polls(&self, tx_hash: &str) -> u32 {
        lock(&self.polls).get(tx_hash).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RecordIndexer for FakeIndexer {
    async fn record_ids_by_tx(&self, tx_hash: &str) -> Result<Vec<String>, ServiceError> {
        let poll = {
            let mut polls = lock(&self.polls);
            let count = polls.entry(tx_hash.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if self
            .failing_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(unavailable("indexer"));
        }
        if let Some((empty_polls, ids)) = lock(&self.published).get(tx_hash) {
            return Ok(if poll > *empty_polls {
                ids.clone()
            } else {
                Vec::new()
            });
        }
        if self.deriving {
            return Ok(vec![Self::derived_id_for(tx_hash)]);
        }
        Ok(Vec::new())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<RegistrarEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<RegistrarEvent> {
        lock(&self.events).clone()
    }

    pub fn log_types(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(RegistrarEvent::log_type).collect()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: RegistrarEvent) {
        lock(&self.events).push(event);
    }
}

#[derive(Debug)]
pub struct FakeArchive {
    hash: String,
    estimate: ArchiveEstimate,
    fail_uploads: AtomicBool,
    calls: AtomicUsize,
    uploaded_with: Mutex<Vec<String>>,
}

impl FakeArchive {
    pub fn new(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            estimate: ArchiveEstimate::default(),
            fail_uploads: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            uploaded_with: Mutex::new(Vec::new()),
        }
    }

    pub fn with_estimate(mut self, estimate: ArchiveEstimate) -> Self {
        self.estimate = estimate;
        self
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Archive ids passed along with the last upload.
    pub fn uploaded_with(&self) -> Vec<String> {
        lock(&self.uploaded_with).clone()
    }
}

#[async_trait]
impl ArchiveService for FakeArchive {
    async fn content_hash(&self, _files: &[ArchiveFile]) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.hash.clone())
    }

    async fn estimate(
        &self,
        _files: &[ArchiveFile],
        _deduplicate: bool,
    ) -> Result<ArchiveEstimate, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.estimate.clone())
    }

    async fn upload(
        &self,
        _files: &[ArchiveFile],
        existing: &[ArchiveEntry],
        _deduplicate: bool,
    ) -> Result<ArchiveUpload, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(unavailable("archive"));
        }
        *lock(&self.uploaded_with) = existing.iter().map(|entry| entry.archive_id.clone()).collect();
        Ok(ArchiveUpload {
            archive_id: format!("ar-{}", self.hash),
            entries: Vec::new(),
        })
    }

    async fn pin(&self, _files: &[ArchiveFile]) -> Result<(), ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A [`Registrar`] wired to fakes, with a fast reconcile policy.
pub struct TestHarness {
    pub ledger: Arc<FakeLedger>,
    pub signer: Arc<FakeSigner>,
    pub indexer: Arc<FakeIndexer>,
    pub publisher: Arc<RecordingPublisher>,
    pub registrar: Arc<Registrar>,
    archive: Option<Arc<FakeArchive>>,
}

impl TestHarness {
    pub const ACCOUNT_NUMBER: u64 = 7;
    pub const INITIAL_SEQUENCE: u64 = 10;
    pub const ARCHIVE_TARGET: &'static str = "like1archivetarget";

    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    pub fn ledger_hash(&self, sequence: u64) -> String {
        FakeLedger::tx_hash_for(sequence)
    }

    pub fn archive(&self) -> Option<Arc<FakeArchive>> {
        self.archive.clone()
    }
}

#[derive(Default)]
pub struct TestHarnessBuilder {
    indexer: Option<FakeIndexer>,
    archive: Option<FakeArchive>,
    estimate: Option<(Decimal, Decimal)>,
    chain_upgrading: bool,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl TestHarnessBuilder {
    pub fn indexer(mut self, indexer: FakeIndexer) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn archive(mut self, archive: FakeArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Gas fee and record fee returned by the signer's estimates.
    pub fn estimate(mut self, gas_fee_amount: Decimal, record_fee_amount: Decimal) -> Self {
        self.estimate = Some((gas_fee_amount, record_fee_amount));
        self
    }

    pub fn chain_upgrading(mut self, chain_upgrading: bool) -> Self {
        self.chain_upgrading = chain_upgrading;
        self
    }

    /// Replaces the recording publisher, e.g. with a real journal handle.
    pub fn publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn build(self) -> TestHarness {
        let ledger = Arc::new(FakeLedger::new(
            TestHarness::ACCOUNT_NUMBER,
            TestHarness::INITIAL_SEQUENCE,
        ));
        let signer = Arc::new(match self.estimate {
            Some((gas, record)) => FakeSigner::default().with_estimate(gas, record),
            None => FakeSigner::default(),
        });
        let indexer = Arc::new(self.indexer.unwrap_or_else(FakeIndexer::deriving));
        let recording = Arc::new(RecordingPublisher::default());
        let publisher: Arc<dyn EventPublisher> = match self.publisher {
            Some(publisher) => publisher,
            None => recording.clone(),
        };

        let cache = Arc::new(SequenceCache::new(ledger.clone(), signer.clone()));
        let sequencer = Arc::new(TxSequencer::new(
            cache,
            ledger.clone(),
            TxSequencerConfig {
                chain_id: "likecoin-testnet".to_string(),
                max_attempts: 3,
            },
        ));
        let reconciler = Arc::new(ResultReconciler::new(
            indexer.clone(),
            ReconcilePolicy {
                max_attempts: 3,
                interval: Duration::from_millis(1),
            },
        ));
        let config = WorkflowConfig {
            fee_schedule: FeeSchedule::default(),
            chain_upgrading: self.chain_upgrading,
            archive_target_address: Some(TestHarness::ARCHIVE_TARGET.to_string()),
        };

        let archive = self.archive.map(Arc::new);
        let mut registrar = Registrar::new(signer.clone(), sequencer, reconciler, publisher, config);
        if let Some(archive) = &archive {
            registrar = registrar.with_archive(archive.clone());
        }

        TestHarness {
            ledger,
            signer,
            indexer,
            publisher: recording,
            registrar: Arc::new(registrar),
            archive,
        }
    }
}
