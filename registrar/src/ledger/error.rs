// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use thiserror::Error;

/// Codespace and code the Cosmos SDK uses for a wrong account sequence.
pub const SDK_CODESPACE: &str = "sdk";
pub const ERR_WRONG_SEQUENCE: u32 = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("account sequence mismatch for sequence {sent}")]
    SequenceMismatch { sent: u64 },
    #[error("transaction rejected ({codespace}/{code}): {log}")]
    Rejected {
        codespace: String,
        code: u32,
        log: String,
    },
    #[error("broadcast transport failure: {0}")]
    Transport(String),
}

impl BroadcastError {
    /// Maps a non-zero check result to an error using the structured code,
    /// never the log text.
    pub fn from_check_result(sent: u64, codespace: &str, code: u32, log: &str) -> Self {
        if codespace == SDK_CODESPACE && code == ERR_WRONG_SEQUENCE {
            return Self::SequenceMismatch { sent };
        }
        Self::Rejected {
            codespace: codespace.to_string(),
            code,
            log: log.to_string(),
        }
    }
}
