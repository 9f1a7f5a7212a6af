// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Seams to the chain: account queries, broadcast, the tx indexer and the
//! signing sidecar that holds the shared key.

mod error;
mod lcd;
mod signer;

use async_trait::async_trait;
use rust_decimal::Decimal;

use registrar_core::{AccountInfo, BroadcastResult, ContentDescriptor, SignedTx, SignerData};

use crate::client::ServiceError;

pub use error::{BroadcastError, ERR_WRONG_SEQUENCE, SDK_CODESPACE};
pub use lcd::LcdClient;
pub use signer::RemoteSigner;

#[async_trait]
pub trait Ledger: Send + Sync {
    async fn account_info(&self, address: &str) -> Result<AccountInfo, ServiceError>;

    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastResult, BroadcastError>;
}

#[async_trait]
pub trait RecordIndexer: Send + Sync {
    /// Derived record ids emitted by `tx_hash`. Empty while the tx is not
    /// indexed yet.
    async fn record_ids_by_tx(&self, tx_hash: &str) -> Result<Vec<String>, ServiceError>;
}

/// Base-unit fees for a record-creation tx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTxEstimate {
    pub gas_fee_amount: Decimal,
    pub record_fee_amount: Decimal,
}

#[async_trait]
pub trait TxSigner: Send + Sync {
    async fn address(&self) -> Result<String, ServiceError>;

    async fn sign_create_record(
        &self,
        payload: &ContentDescriptor,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError>;

    async fn sign_change_ownership(
        &self,
        new_owner: &str,
        record_id: &str,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError>;

    async fn sign_send(
        &self,
        to: &str,
        amount: Decimal,
        memo: &str,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError>;

    async fn estimate_record_tx(
        &self,
        payload: &ContentDescriptor,
    ) -> Result<RecordTxEstimate, ServiceError>;

    async fn estimate_record_fee(&self, payload: &ContentDescriptor)
    -> Result<Decimal, ServiceError>;
}
