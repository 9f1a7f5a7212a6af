// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct SequencerStats {
    submissions: AtomicU64,
    broadcasts: AtomicU64,
    accepted: AtomicU64,
    sequence_mismatches: AtomicU64,
    resyncs: AtomicU64,
    failures: AtomicU64,
    broadcast_micros: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequencerStatsSnapshot {
    pub submissions: u64,
    pub broadcasts: u64,
    pub accepted: u64,
    pub sequence_mismatches: u64,
    pub resyncs: u64,
    pub failures: u64,
    pub avg_broadcast_ms: u64,
}

impl SequencerStats {
    pub(super) fn on_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn on_broadcast(&self, elapsed: Duration) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.broadcast_micros.fetch_add(micros, Ordering::Relaxed);
    }

    pub(super) fn on_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn on_sequence_mismatch(&self) {
        self.sequence_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn on_resync(&self) {
        self.resyncs.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn on_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SequencerStatsSnapshot {
        let broadcasts = self.broadcasts.load(Ordering::Relaxed);
        let total_micros = self.broadcast_micros.load(Ordering::Relaxed);
        SequencerStatsSnapshot {
            submissions: self.submissions.load(Ordering::Relaxed),
            broadcasts,
            accepted: self.accepted.load(Ordering::Relaxed),
            sequence_mismatches: self.sequence_mismatches.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            avg_broadcast_ms: total_micros
                .checked_div(broadcasts)
                .map(|micros| micros / 1_000)
                .unwrap_or(0),
        }
    }
}
