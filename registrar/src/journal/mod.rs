// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod error;
mod event;
mod writer;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

pub use error::JournalError;
pub use event::{LikeAmount, RegistrarEvent};
pub use writer::{EventJournal, JournalConfig, JournalStop};

/// Fire-and-forget sink for cost-accounting events. Publishing never blocks
/// and never fails the caller.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: RegistrarEvent);
}

#[derive(Debug, Clone)]
pub struct JournalHandle {
    tx: mpsc::Sender<RegistrarEvent>,
}

impl JournalHandle {
    fn new(tx: mpsc::Sender<RegistrarEvent>) -> Self {
        Self { tx }
    }
}

impl EventPublisher for JournalHandle {
    fn publish(&self, event: RegistrarEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(log_type = event.log_type(), "event journal full, dropping event");
            }
            Err(TrySendError::Closed(event)) => {
                warn!(log_type = event.log_type(), "event journal closed, dropping event");
            }
        }
    }
}
