// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use registrar_core::{FeeSchedule, SignerData};

use super::{Registrar, error_chain};
use crate::journal::{EventPublisher, LikeAmount, RegistrarEvent};
use crate::ledger::TxSigner;
use crate::tx_sequencer::TxSequencer;

/// Everything the background transfer needs, moved out of the request.
/// The signer identity is shared through the sequencer's cache.
#[derive(Debug, Clone)]
pub(super) struct OwnershipTransfer {
    pub wallet: String,
    pub iscn_id: String,
    /// Base-unit cost already spent on the registration.
    pub accrued_total: Decimal,
    pub provider: Option<String>,
}

impl Registrar {
    pub(super) fn spawn_transfer(&self, transfer: OwnershipTransfer) -> JoinHandle<()> {
        tokio::spawn(run_ownership_transfer(
            Arc::clone(&self.signer),
            Arc::clone(&self.sequencer),
            Arc::clone(&self.publisher),
            self.config.fee_schedule.clone(),
            transfer,
        ))
    }
}

async fn run_ownership_transfer(
    signer: Arc<dyn TxSigner>,
    sequencer: Arc<TxSequencer>,
    publisher: Arc<dyn EventPublisher>,
    schedule: FeeSchedule,
    transfer: OwnershipTransfer,
) {
    let build = {
        let wallet = transfer.wallet.clone();
        let iscn_id = transfer.iscn_id.clone();
        move |data: SignerData| {
            let signer = Arc::clone(&signer);
            let wallet = wallet.clone();
            let iscn_id = iscn_id.clone();
            async move { signer.sign_change_ownership(&wallet, &iscn_id, &data).await }
        }
    };

    match sequencer.submit("change_ownership", build).await {
        Ok(result) => {
            let gas_fee = schedule.gas_fee(result.gas_used);
            let total = transfer.accrued_total + gas_fee;
            info!(
                iscn_id = %transfer.iscn_id,
                wallet = %transfer.wallet,
                tx_hash = %result.transaction_hash,
                "record ownership transferred"
            );
            publisher.publish(RegistrarEvent::OwnershipTransferred {
                tx_hash: result.transaction_hash,
                iscn_id: transfer.iscn_id,
                wallet: transfer.wallet,
                gas_fee: LikeAmount::from_base_units(gas_fee),
                total: LikeAmount::from_base_units(total),
                gas_used: result.gas_used,
                gas_wanted: result.gas_wanted,
                provider: transfer.provider,
            });
        }
        Err(err) => {
            let error = error_chain(&err);
            warn!(
                iscn_id = %transfer.iscn_id,
                wallet = %transfer.wallet,
                error = %error,
                "record ownership transfer failed"
            );
            publisher.publish(RegistrarEvent::OwnershipTransferFailed {
                iscn_id: transfer.iscn_id,
                wallet: transfer.wallet,
                error,
            });
        }
    }
}
