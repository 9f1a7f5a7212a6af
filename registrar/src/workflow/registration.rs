// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use std::sync::atomic::Ordering;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use registrar_core::{BroadcastResult, ContentDescriptor, SignerData, ValidationError};

use super::transfer::OwnershipTransfer;
use super::{Registrar, WorkflowError};
use crate::journal::{LikeAmount, RegistrarEvent};
use crate::tx_sequencer::SequencerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Validating,
    Estimating,
    SubmittingRecord,
    ReconcilingId,
    Responded,
    TransferringOwnership,
    Done,
    Failed,
}

/// Archive results folded into a registration by the upload flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadContext {
    pub archive_id: Option<String>,
    pub ipfs_hash: Option<String>,
    /// Display units, added to quotes.
    pub upload_price: Option<Decimal>,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub metadata: Value,
    /// Receives ownership after registration when `claim` is set.
    pub owner_wallet: Option<String>,
    pub requester: String,
    pub provider: Option<String>,
    pub claim: bool,
    pub estimate: bool,
    pub upload: UploadContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteResponse {
    #[serde(rename = "LIKE")]
    pub like: f64,
    #[serde(skip)]
    pub total: Decimal,
}

impl QuoteResponse {
    fn new(total: Decimal) -> Self {
        let total = total.normalize();
        Self {
            like: total.to_f64().unwrap_or_default(),
            total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    pub tx_hash: String,
    pub iscn_id: Option<String>,
    #[serde(rename = "arweaveId", skip_serializing_if = "Option::is_none")]
    pub archive_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipfs_hash: Option<String>,
}

#[derive(Debug)]
pub struct Registration {
    pub receipt: RegistrationReceipt,
    /// Detached ownership transfer, if one was started. Dropping the handle
    /// does not cancel it.
    pub transfer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
pub enum RegistrationOutcome {
    Quote(QuoteResponse),
    Registered(Registration),
}

impl Registrar {
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<RegistrationOutcome, WorkflowError> {
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        trace_state(request_id, RegistrationState::Validating);
        let descriptor = build_descriptor(&request).inspect_err(|_| {
            trace_state(request_id, RegistrationState::Failed);
        })?;

        if request.estimate {
            trace_state(request_id, RegistrationState::Estimating);
            let quote = self.estimator.estimate(&descriptor).await.map_err(|source| {
                trace_state(request_id, RegistrationState::Failed);
                WorkflowError::Downstream {
                    service: "signer",
                    source,
                }
            })?;
            let total = quote.total_display() + request.upload.upload_price.unwrap_or_default();
            trace_state(request_id, RegistrationState::Responded);
            return Ok(RegistrationOutcome::Quote(QuoteResponse::new(total)));
        }

        if self.config.chain_upgrading {
            trace_state(request_id, RegistrationState::Failed);
            return Err(WorkflowError::ChainUpgrading);
        }

        trace_state(request_id, RegistrationState::SubmittingRecord);
        let (record_fee, broadcast) = tokio::join!(
            self.signer.estimate_record_fee(&descriptor),
            self.submit_record(&descriptor)
        );
        let broadcast = broadcast.map_err(|source| {
            trace_state(request_id, RegistrationState::Failed);
            WorkflowError::Broadcast { source }
        })?;
        let record_fee = record_fee
            .inspect_err(|err| {
                warn!(tx_hash = %broadcast.transaction_hash, error = %err, "record fee estimate failed")
            })
            .ok();
        let tx_hash = broadcast.transaction_hash.clone();

        trace_state(request_id, RegistrationState::ReconcilingId);
        let reconciled = self.reconciler.await_derivation_default(&tx_hash).await;
        let iscn_id = reconciled.derived_id;
        match (&iscn_id, tx_hash.is_empty()) {
            (Some(iscn_id), _) => info!(%tx_hash, %iscn_id, "record registered"),
            (None, false) => {
                warn!(%tx_hash, attempts = reconciled.attempts, "cannot find derived record id for tx");
                self.publisher.publish(RegistrarEvent::DerivationMissing {
                    tx_hash: tx_hash.clone(),
                });
            }
            (None, true) => error!("cannot find derived record id nor tx hash"),
        }

        let total = self.publish_registered(&request, &broadcast, iscn_id.clone(), record_fee);

        let receipt = RegistrationReceipt {
            tx_hash,
            iscn_id: iscn_id.clone(),
            archive_id: request.upload.archive_id.clone(),
            ipfs_hash: request.upload.ipfs_hash.clone(),
        };
        trace_state(request_id, RegistrationState::Responded);

        let transfer = match (request.claim, iscn_id, request.owner_wallet) {
            (true, Some(iscn_id), Some(wallet)) => {
                trace_state(request_id, RegistrationState::TransferringOwnership);
                Some(self.spawn_transfer(OwnershipTransfer {
                    wallet,
                    iscn_id,
                    accrued_total: total,
                    provider: request.provider,
                }))
            }
            _ => {
                trace_state(request_id, RegistrationState::Done);
                None
            }
        };

        Ok(RegistrationOutcome::Registered(Registration { receipt, transfer }))
    }

    async fn submit_record(
        &self,
        descriptor: &ContentDescriptor,
    ) -> Result<BroadcastResult, SequencerError> {
        let signer = Arc::clone(&self.signer);
        let payload = descriptor.clone();
        self.sequencer
            .submit("create_record", move |data: SignerData| {
                let signer = Arc::clone(&signer);
                let payload = payload.clone();
                async move { signer.sign_create_record(&payload, &data).await }
            })
            .await
    }

    /// Returns the accrued base-unit cost so far.
    fn publish_registered(
        &self,
        request: &RegistrationRequest,
        broadcast: &BroadcastResult,
        iscn_id: Option<String>,
        record_fee: Option<Decimal>,
    ) -> Decimal {
        let gas_fee = self.config.fee_schedule.gas_fee(broadcast.gas_wanted);
        let total = gas_fee + record_fee.unwrap_or_default();
        self.publisher.publish(RegistrarEvent::RecordRegistered {
            tx_hash: broadcast.transaction_hash.clone(),
            iscn_id,
            record_fee: record_fee.map(LikeAmount::from_base_units),
            gas_fee: LikeAmount::from_base_units(gas_fee),
            total: LikeAmount::from_base_units(total),
            gas_used: broadcast.gas_used,
            gas_wanted: broadcast.gas_wanted,
            requester: request.requester.clone(),
            provider: request.provider.clone(),
        });
        total
    }
}

pub(super) fn build_descriptor(
    request: &RegistrationRequest,
) -> Result<ContentDescriptor, ValidationError> {
    let notes = request
        .owner_wallet
        .clone()
        .unwrap_or_else(|| request.requester.clone());
    let mut descriptor = ContentDescriptor::from_metadata(&request.metadata)?.with_record_notes(notes);
    if let Some(archive_id) = &request.upload.archive_id {
        descriptor.push_fingerprint(format!("ar://{archive_id}"));
    }
    if let Some(ipfs_hash) = &request.upload.ipfs_hash {
        descriptor.push_fingerprint(format!("ipfs://{ipfs_hash}"));
    }
    Ok(descriptor)
}

pub(super) fn trace_state(request_id: u64, state: RegistrationState) {
    debug!(request_id, state = ?state, "registration state");
}
