// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use registrar_core::{AccountInfo, BroadcastResult, SignedTx};

use super::{BroadcastError, Ledger, RecordIndexer};
use crate::client::{JsonClient, ServiceError, de_u64_lenient};

const BROADCAST_MODE_SYNC: &str = "BROADCAST_MODE_SYNC";
const RECORD_EVENT_TYPE: &str = "iscn_record";
const RECORD_ID_ATTRIBUTE: &str = "iscn_id";
const GRPC_NOT_FOUND: u64 = 5;

/// Cosmos SDK REST (LCD) client. Serves both as ledger and as tx indexer.
#[derive(Debug, Clone)]
pub struct LcdClient {
    http: JsonClient,
}

impl LcdClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            http: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: Value,
}

#[derive(Debug, Serialize)]
struct BroadcastRequest<'a> {
    tx_bytes: String,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct TxEnvelope {
    tx_response: Option<TxResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct TxResponse {
    #[serde(default)]
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    codespace: String,
    #[serde(default)]
    raw_log: String,
    #[serde(default, deserialize_with = "de_u64_lenient")]
    gas_wanted: u64,
    #[serde(default, deserialize_with = "de_u64_lenient")]
    gas_used: u64,
    #[serde(default)]
    logs: Vec<AbciLog>,
    #[serde(default)]
    events: Vec<AbciEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct AbciLog {
    #[serde(default)]
    events: Vec<AbciEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct AbciEvent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    attributes: Vec<EventAttribute>,
}

#[derive(Debug, Default, Deserialize)]
struct EventAttribute {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct GrpcStatus {
    #[serde(default)]
    code: u64,
}

#[async_trait]
impl Ledger for LcdClient {
    async fn account_info(&self, address: &str) -> Result<AccountInfo, ServiceError> {
        let path = format!("/cosmos/auth/v1beta1/accounts/{address}");
        let response: AccountResponse =
            self.http
                .get_json(&path)
                .await?
                .ok_or_else(|| ServiceError::Status {
                    url: self.http.url(&path),
                    status: 404,
                    body: format!("account {address} not found"),
                })?;
        parse_account(&response.account).map_err(|reason| ServiceError::Decode {
            url: self.http.url(&path),
            reason,
        })
    }

    async fn broadcast(&self, tx: &SignedTx) -> Result<BroadcastResult, BroadcastError> {
        let request = BroadcastRequest {
            tx_bytes: general_purpose::STANDARD.encode(&tx.tx_bytes),
            mode: BROADCAST_MODE_SYNC,
        };
        let envelope: TxEnvelope = self
            .http
            .post_json("/cosmos/tx/v1beta1/txs", &request)
            .await
            .map_err(|err| BroadcastError::Transport(err.to_string()))?;
        let response = envelope
            .tx_response
            .ok_or_else(|| BroadcastError::Transport("broadcast response without tx_response".into()))?;
        check_tx_response(tx.sequence, response)
    }
}

#[async_trait]
impl RecordIndexer for LcdClient {
    async fn record_ids_by_tx(&self, tx_hash: &str) -> Result<Vec<String>, ServiceError> {
        let path = format!("/cosmos/tx/v1beta1/txs/{tx_hash}");
        let envelope: Option<TxEnvelope> = match self.http.get_json(&path).await {
            Ok(envelope) => envelope,
            // Older gateways report an unknown hash as a gRPC NotFound body.
            Err(ServiceError::Status { body, .. })
                if serde_json::from_str::<GrpcStatus>(&body)
                    .is_ok_and(|status| status.code == GRPC_NOT_FOUND) =>
            {
                None
            }
            Err(err) => return Err(err),
        };
        let Some(response) = envelope.and_then(|envelope| envelope.tx_response) else {
            debug!(tx_hash, "tx not indexed yet");
            return Ok(Vec::new());
        };
        if response.code != 0 {
            debug!(tx_hash, code = response.code, "tx failed on chain, no record derived");
            return Ok(Vec::new());
        }
        Ok(record_ids_from(&response))
    }
}

fn check_tx_response(sent: u64, response: TxResponse) -> Result<BroadcastResult, BroadcastError> {
    if response.code != 0 {
        return Err(BroadcastError::from_check_result(
            sent,
            &response.codespace,
            response.code,
            &response.raw_log,
        ));
    }
    Ok(BroadcastResult {
        transaction_hash: response.txhash,
        gas_wanted: response.gas_wanted,
        gas_used: response.gas_used,
    })
}

fn record_ids_from(response: &TxResponse) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    let events = response
        .logs
        .iter()
        .flat_map(|log| log.events.iter())
        .chain(response.events.iter());
    for event in events.filter(|event| event.kind == RECORD_EVENT_TYPE) {
        for attribute in &event.attributes {
            if attribute.key == RECORD_ID_ATTRIBUTE && !ids.contains(&attribute.value) {
                ids.push(attribute.value.clone());
            }
        }
    }
    ids
}

// Vesting accounts nest the base account one or two levels down.
fn parse_account(account: &Value) -> Result<AccountInfo, String> {
    let base = [
        Some(account),
        account.get("base_account"),
        account
            .get("base_vesting_account")
            .and_then(|vesting| vesting.get("base_account")),
    ]
    .into_iter()
    .flatten()
    .find(|candidate| candidate.get("account_number").is_some())
    .ok_or_else(|| "account without account_number".to_string())?;

    Ok(AccountInfo {
        account_number: u64_field(base, "account_number")?,
        sequence: u64_field(base, "sequence")?,
    })
}

fn u64_field(value: &Value, key: &str) -> Result<u64, String> {
    match value.get(key) {
        None | Some(Value::Null) => Ok(0),
        Some(Value::String(text)) => text
            .parse()
            .map_err(|_| format!("{key} is not an unsigned integer: {text}")),
        Some(Value::Number(number)) => number
            .as_u64()
            .ok_or_else(|| format!("{key} is not an unsigned integer: {number}")),
        Some(other) => Err(format!("{key} has unexpected type: {other}")),
    }
}
