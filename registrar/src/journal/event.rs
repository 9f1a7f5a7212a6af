// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

use registrar_core::fee::to_display;

/// Display-unit amount kept both exact and as a float for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LikeAmount {
    pub string: String,
    pub number: f64,
}

impl LikeAmount {
    pub fn from_display(amount: Decimal) -> Self {
        let amount = amount.normalize();
        Self {
            string: amount.to_string(),
            number: amount.to_f64().unwrap_or_default(),
        }
    }

    pub fn from_base_units(amount: Decimal) -> Self {
        Self::from_display(to_display(amount))
    }
}

/// Cost-accounting records. The serialized `logType` names are what
/// downstream reporting keys on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "logType")]
pub enum RegistrarEvent {
    #[serde(rename = "ISCNFreeRegister", rename_all = "camelCase")]
    RecordRegistered {
        tx_hash: String,
        iscn_id: Option<String>,
        #[serde(rename = "iscnLIKE")]
        record_fee: Option<LikeAmount>,
        #[serde(rename = "gasLIKE")]
        gas_fee: LikeAmount,
        #[serde(rename = "totalLIKE")]
        total: LikeAmount,
        gas_used: u64,
        gas_wanted: u64,
        requester: String,
        #[serde(rename = "fromProvider")]
        provider: Option<String>,
    },
    #[serde(rename = "ISCNDerivationMissing", rename_all = "camelCase")]
    DerivationMissing { tx_hash: String },
    #[serde(rename = "ISCNFreeRegisterTransfer", rename_all = "camelCase")]
    OwnershipTransferred {
        tx_hash: String,
        iscn_id: String,
        wallet: String,
        #[serde(rename = "gasLIKE")]
        gas_fee: LikeAmount,
        #[serde(rename = "totalLIKE")]
        total: LikeAmount,
        gas_used: u64,
        gas_wanted: u64,
        #[serde(rename = "fromProvider")]
        provider: Option<String>,
    },
    #[serde(rename = "ISCNFreeRegisterTransferFailed", rename_all = "camelCase")]
    OwnershipTransferFailed {
        iscn_id: String,
        wallet: String,
        error: String,
    },
    #[serde(rename = "arweaveFreeUpload", rename_all = "camelCase")]
    UploadPaid {
        tx_hash: String,
        ipfs_hash: String,
        key: String,
        archive_id: String,
        native_price: Option<String>,
        #[serde(rename = "arweaveLIKE")]
        price: LikeAmount,
        #[serde(rename = "gasLIKE")]
        gas_fee: LikeAmount,
        #[serde(rename = "totalLIKE")]
        total: LikeAmount,
        gas_used: u64,
        gas_wanted: u64,
        requester: String,
        #[serde(rename = "fromProvider")]
        provider: Option<String>,
    },
}

impl RegistrarEvent {
    pub fn log_type(&self) -> &'static str {
        match self {
            Self::RecordRegistered { .. } => "ISCNFreeRegister",
            Self::DerivationMissing { .. } => "ISCNDerivationMissing",
            Self::OwnershipTransferred { .. } => "ISCNFreeRegisterTransfer",
            Self::OwnershipTransferFailed { .. } => "ISCNFreeRegisterTransferFailed",
            Self::UploadPaid { .. } => "arweaveFreeUpload",
        }
    }

    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            Self::RecordRegistered { tx_hash, .. }
            | Self::DerivationMissing { tx_hash }
            | Self::OwnershipTransferred { tx_hash, .. }
            | Self::UploadPaid { tx_hash, .. } => Some(tx_hash.as_str()),
            Self::OwnershipTransferFailed { .. } => None,
        }
    }

    pub fn is_pending_derivation(&self) -> bool {
        matches!(self, Self::DerivationMissing { .. })
    }
}
