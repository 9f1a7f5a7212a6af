// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use thiserror::Error;

use crate::client::ServiceError;
use crate::ledger::BroadcastError;

#[derive(Debug, Error)]
pub enum SequencerError {
    #[error("cannot resolve signer identity")]
    Identity {
        #[source]
        source: ServiceError,
    },
    #[error("cannot obtain signer sequence")]
    Sequence {
        #[source]
        source: ServiceError,
    },
    #[error("cannot build transaction for sequence {sequence}")]
    Build {
        sequence: u64,
        #[source]
        source: ServiceError,
    },
    #[error("broadcast failed for sequence {sequence}")]
    Broadcast {
        sequence: u64,
        #[source]
        source: BroadcastError,
    },
    #[error("sequence mismatch persisted after {attempts} attempts (last sequence {last_sequence})")]
    SequenceRetriesExhausted { attempts: u32, last_sequence: u64 },
}
