// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod error;
mod sequencer;
mod stats;

pub use error::SequencerError;
pub use sequencer::{DEFAULT_MAX_ATTEMPTS, TxSequencer, TxSequencerConfig};
pub use stats::{SequencerStats, SequencerStatsSnapshot};
