// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use registrar_core::FeeSchedule;

use crate::journal::JournalConfig;
use crate::reconciler::{self, ReconcilePolicy};
use crate::tx_sequencer::{self, TxSequencerConfig};
use crate::workflow::WorkflowConfig;

const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_DB_PATH: &str = "registrar.db";
const DEFAULT_SQLITE_SYNCHRONOUS: &str = "NORMAL";
const DEFAULT_CHAIN_ID: &str = "likecoin-mainnet-2";
const DEFAULT_JOURNAL_QUEUE_CAP: usize = 1024;
const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024; // 100 MiB, uploads carry files
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_addr: String,
    pub db_path: String,
    pub sqlite_synchronous: String,
    pub lcd_url: String,
    pub signer_url: String,
    pub archive_url: Option<String>,
    pub archive_target_address: Option<String>,
    pub chain_id: String,
    pub chain_upgrading: bool,
    pub fee_schedule: FeeSchedule,
    pub sequence_max_attempts: u32,
    pub reconcile: ReconcilePolicy,
    pub journal_queue_capacity: usize,
    pub max_body_bytes: usize,
    pub http_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `REGISTRAR_LCD_URL` and
    /// `REGISTRAR_SIGNER_URL` are required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let env = Env { lookup };
        let defaults = FeeSchedule::default();
        let gas_price = match env.get("REGISTRAR_GAS_PRICE") {
            Some(value) => Decimal::from_str(value.trim())
                .map_err(|err| format!("REGISTRAR_GAS_PRICE is not a decimal: {err}"))?,
            None => defaults.gas_price,
        };
        if gas_price.is_sign_negative() {
            return Err("REGISTRAR_GAS_PRICE must not be negative".to_string());
        }

        Ok(Self {
            http_addr: env.string("REGISTRAR_HTTP_ADDR", DEFAULT_HTTP_ADDR),
            db_path: env.string("REGISTRAR_DB_PATH", DEFAULT_DB_PATH),
            sqlite_synchronous: env.string(
                "REGISTRAR_SQLITE_SYNCHRONOUS",
                DEFAULT_SQLITE_SYNCHRONOUS,
            ),
            lcd_url: env.required("REGISTRAR_LCD_URL")?,
            signer_url: env.required("REGISTRAR_SIGNER_URL")?,
            archive_url: env.get("REGISTRAR_ARCHIVE_URL"),
            archive_target_address: env.get("REGISTRAR_ARCHIVE_TARGET_ADDRESS"),
            chain_id: env.string("REGISTRAR_CHAIN_ID", DEFAULT_CHAIN_ID),
            chain_upgrading: env.flag("REGISTRAR_CHAIN_UPGRADING"),
            fee_schedule: FeeSchedule {
                gas_price,
                transfer_gas: env.u64("REGISTRAR_TRANSFER_GAS", defaults.transfer_gas),
                change_ownership_gas: env.u64(
                    "REGISTRAR_CHANGE_OWNERSHIP_GAS",
                    defaults.change_ownership_gas,
                ),
            },
            sequence_max_attempts: env
                .u64(
                    "REGISTRAR_SEQUENCE_MAX_ATTEMPTS",
                    u64::from(tx_sequencer::DEFAULT_MAX_ATTEMPTS),
                )
                .clamp(1, u64::from(u32::MAX)) as u32,
            reconcile: ReconcilePolicy {
                max_attempts: env
                    .u64(
                        "REGISTRAR_DERIVATION_MAX_ATTEMPTS",
                        u64::from(reconciler::DEFAULT_MAX_ATTEMPTS),
                    )
                    .min(u64::from(u32::MAX)) as u32,
                interval: Duration::from_millis(env.u64(
                    "REGISTRAR_DERIVATION_INTERVAL_MS",
                    reconciler::DEFAULT_INTERVAL.as_millis() as u64,
                )),
            },
            journal_queue_capacity: env
                .usize("REGISTRAR_JOURNAL_QUEUE_CAP", DEFAULT_JOURNAL_QUEUE_CAP)
                .max(1),
            max_body_bytes: env.usize("REGISTRAR_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
            http_timeout: Duration::from_millis(
                env.u64("REGISTRAR_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS)
                    .max(1),
            ),
        })
    }

    pub fn sequencer_config(&self) -> TxSequencerConfig {
        TxSequencerConfig {
            chain_id: self.chain_id.clone(),
            max_attempts: self.sequence_max_attempts,
        }
    }

    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            fee_schedule: self.fee_schedule.clone(),
            chain_upgrading: self.chain_upgrading,
            archive_target_address: self.archive_target_address.clone(),
        }
    }

    pub fn journal_config(&self) -> JournalConfig {
        JournalConfig {
            queue_capacity: self.journal_queue_capacity,
            ..JournalConfig::default()
        }
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|value| !value.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, String> {
        self.get(key).ok_or_else(|| format!("{key} is required"))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn usize(&self, key: &str, default: usize) -> usize {
        self.get(key)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    fn u64(&self, key: &str, default: u64) -> u64 {
        self.get(key)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }
}
