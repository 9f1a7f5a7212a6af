// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("event journal input channel closed")]
    ChannelClosed,
    #[error("event journal shutdown requested")]
    ShutdownRequested,
    #[error("cannot append journal events")]
    AppendEvents {
        #[source]
        source: rusqlite::Error,
    },
}
