// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Registration service for ISCN records signed by one shared account.
//!
//! Flow: API -> workflow -> tx sequencer -> ledger, then the reconciler
//! polls the indexer for the derived record id and the journal persists
//! cost events. Ownership transfers run detached after the response.
pub mod api;
pub mod archive;
pub mod client;
pub mod config;
pub mod fee_estimator;
pub mod journal;
pub mod ledger;
pub mod reconciler;
pub mod sequence_cache;
pub mod storage;
pub mod testing;
pub mod tx_sequencer;
pub mod workflow;
