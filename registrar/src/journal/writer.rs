// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::{JournalError, JournalHandle, RegistrarEvent};
use crate::storage::{NewEvent, Storage};

#[derive(Debug, Clone, Copy)]
pub struct JournalConfig {
    pub queue_capacity: usize,
    pub max_events_per_chunk: usize,
    pub idle_poll_interval: Duration,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_events_per_chunk: 64,
            idle_poll_interval: Duration::from_millis(5),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JournalStop {
    shutdown: Arc<AtomicBool>,
}

impl JournalStop {
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// Single writer for the event journal. Runs on a blocking thread and owns
/// the only write connection.
pub struct EventJournal {
    rx: mpsc::Receiver<RegistrarEvent>,
    stop: JournalStop,
    storage: Storage,
    config: JournalConfig,
}

impl EventJournal {
    pub fn new(storage: Storage, config: JournalConfig) -> (Self, JournalHandle) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let journal = Self {
            rx,
            stop: JournalStop::default(),
            storage,
            config,
        };
        (journal, JournalHandle::new(tx))
    }

    pub fn spawn(self) -> (JoinHandle<JournalError>, JournalStop) {
        let stop = self.stop.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut journal = self;
            match journal.run_forever() {
                Err(err) => err,
                Ok(()) => unreachable!("event journal run loop is expected to be non-terminating"),
            }
        });
        (handle, stop)
    }

    fn run_forever(&mut self) -> Result<(), JournalError> {
        let max_chunk = self.config.max_events_per_chunk.max(1);
        let mut chunk = Vec::with_capacity(max_chunk);

        while !self.stop.is_shutdown_requested() {
            dequeue_event_chunk(&mut self.rx, max_chunk, &mut chunk)?;
            if chunk.is_empty() {
                thread::sleep(self.config.idle_poll_interval);
                continue;
            }
            self.persist_chunk(&mut chunk)?;
        }

        // Flush what was already accepted before reporting shutdown.
        loop {
            match dequeue_event_chunk(&mut self.rx, max_chunk, &mut chunk) {
                Ok(()) if chunk.is_empty() => break,
                Ok(()) => self.persist_chunk(&mut chunk)?,
                Err(_) => break,
            }
        }
        Err(JournalError::ShutdownRequested)
    }

    fn persist_chunk(&mut self, chunk: &mut Vec<RegistrarEvent>) -> Result<(), JournalError> {
        let rows: Vec<NewEvent> = chunk.drain(..).filter_map(to_new_event).collect();
        self.storage
            .append_events(&rows, SystemTime::now())
            .map_err(|source| JournalError::AppendEvents { source })
    }
}

fn to_new_event(event: RegistrarEvent) -> Option<NewEvent> {
    match serde_json::to_string(&event) {
        Ok(payload_json) => Some(NewEvent {
            log_type: event.log_type(),
            tx_hash: event.tx_hash().map(str::to_string),
            payload_json,
            pending_derivation: event.is_pending_derivation(),
        }),
        Err(err) => {
            warn!(log_type = event.log_type(), error = %err, "cannot encode journal event");
            None
        }
    }
}

fn dequeue_event_chunk(
    rx: &mut mpsc::Receiver<RegistrarEvent>,
    max_chunk: usize,
    chunk: &mut Vec<RegistrarEvent>,
) -> Result<(), JournalError> {
    while chunk.len() < max_chunk {
        match rx.try_recv() {
            Ok(event) => chunk.push(event),
            Err(mpsc::error::TryRecvError::Empty) => return Ok(()),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                if chunk.is_empty() {
                    return Err(JournalError::ChannelClosed);
                }
                return Ok(());
            }
        }
    }
    Ok(())
}
