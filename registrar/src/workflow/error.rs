// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::error::Error as StdError;

use thiserror::Error;

use registrar_core::ValidationError;

use crate::client::ServiceError;
use crate::tx_sequencer::SequencerError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("chain is upgrading, registration is paused")]
    ChainUpgrading,
    #[error("{service} unavailable")]
    Downstream {
        service: &'static str,
        #[source]
        source: ServiceError,
    },
    #[error("transaction was not accepted")]
    Broadcast {
        #[source]
        source: SequencerError,
    },
    #[error("archive service is not configured")]
    ArchiveNotConfigured,
    #[error("cannot fetch archive id nor price")]
    ArchivePriceUnavailable,
    #[error("archive upload failed after payment tx {tx_hash}")]
    UploadAfterPayment {
        tx_hash: String,
        #[source]
        source: ServiceError,
    },
}

/// Renders an error and its sources as `outer: inner: ...`.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
