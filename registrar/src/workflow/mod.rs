// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Request-level orchestration: validate, quote or broadcast, reconcile the
//! derived id, record costs, answer, then hand ownership over in the
//! background.

mod error;
mod registration;
mod transfer;
mod upload;

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use registrar_core::FeeSchedule;

use crate::archive::ArchiveService;
use crate::fee_estimator::FeeEstimator;
use crate::journal::EventPublisher;
use crate::ledger::TxSigner;
use crate::reconciler::ResultReconciler;
use crate::tx_sequencer::TxSequencer;

pub use error::{WorkflowError, error_chain};
pub use registration::{
    QuoteResponse, Registration, RegistrationOutcome, RegistrationReceipt, RegistrationRequest,
    RegistrationState, UploadContext,
};
pub use upload::UploadRequest;

#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    pub fee_schedule: FeeSchedule,
    pub chain_upgrading: bool,
    /// Recipient of archive payments.
    pub archive_target_address: Option<String>,
}

pub struct Registrar {
    signer: Arc<dyn TxSigner>,
    sequencer: Arc<TxSequencer>,
    reconciler: Arc<ResultReconciler>,
    estimator: FeeEstimator,
    publisher: Arc<dyn EventPublisher>,
    archive: Option<Arc<dyn ArchiveService>>,
    config: WorkflowConfig,
    next_request_id: AtomicU64,
}

impl Registrar {
    pub fn new(
        signer: Arc<dyn TxSigner>,
        sequencer: Arc<TxSequencer>,
        reconciler: Arc<ResultReconciler>,
        publisher: Arc<dyn EventPublisher>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            estimator: FeeEstimator::new(signer.clone(), config.fee_schedule.clone()),
            signer,
            sequencer,
            reconciler,
            publisher,
            archive: None,
            config,
            next_request_id: AtomicU64::new(1),
        }
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArchiveService>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn has_archive(&self) -> bool {
        self.archive.is_some()
    }

    pub fn sequencer(&self) -> &Arc<TxSequencer> {
        &self.sequencer
    }
}
