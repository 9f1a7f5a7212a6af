// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use registrar_core::{ContentDescriptor, SignedTx, SignerData};

use super::{RecordTxEstimate, TxSigner};
use crate::client::{JsonClient, ServiceError};

/// Client for the signing sidecar that owns the shared key. The sidecar
/// builds and signs; sequence numbers always come from the caller.
#[derive(Debug, Clone)]
pub struct RemoteSigner {
    http: JsonClient,
}

impl RemoteSigner {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            http: JsonClient::new(base_url, timeout)?,
        })
    }

    async fn sign<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError> {
        let response: SignResponse = self.http.post_json(path, body).await?;
        let tx_bytes = general_purpose::STANDARD
            .decode(response.tx_bytes.as_bytes())
            .map_err(|err| ServiceError::Decode {
                url: self.http.url(path),
                reason: format!("txBytes is not base64: {err}"),
            })?;
        Ok(SignedTx {
            tx_bytes,
            sequence: signer.sequence,
        })
    }

    fn parse_amount(&self, path: &str, field: &str, value: &str) -> Result<Decimal, ServiceError> {
        Decimal::from_str(value).map_err(|err| ServiceError::Decode {
            url: self.http.url(path),
            reason: format!("{field} is not a decimal amount: {err}"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AddressResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignResponse {
    tx_bytes: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRecordRequest<'a> {
    payload: &'a ContentDescriptor,
    signer_data: &'a SignerData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangeOwnershipRequest<'a> {
    new_owner: &'a str,
    iscn_id: &'a str,
    signer_data: &'a SignerData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    to: &'a str,
    amount: String,
    memo: &'a str,
    signer_data: &'a SignerData,
}

#[derive(Debug, Serialize)]
struct EstimateRequest<'a> {
    payload: &'a ContentDescriptor,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordTxEstimateResponse {
    gas_fee: String,
    record_fee: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordFeeResponse {
    record_fee: String,
}

#[async_trait]
impl TxSigner for RemoteSigner {
    async fn address(&self) -> Result<String, ServiceError> {
        let response: AddressResponse =
            self.http
                .get_json("/address")
                .await?
                .ok_or_else(|| ServiceError::Status {
                    url: self.http.url("/address"),
                    status: 404,
                    body: "signer has no address".to_string(),
                })?;
        Ok(response.address)
    }

    async fn sign_create_record(
        &self,
        payload: &ContentDescriptor,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError> {
        let request = CreateRecordRequest {
            payload,
            signer_data: signer,
        };
        self.sign("/sign/create_record", &request, signer).await
    }

    async fn sign_change_ownership(
        &self,
        new_owner: &str,
        record_id: &str,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError> {
        let request = ChangeOwnershipRequest {
            new_owner,
            iscn_id: record_id,
            signer_data: signer,
        };
        self.sign("/sign/change_ownership", &request, signer).await
    }

    async fn sign_send(
        &self,
        to: &str,
        amount: Decimal,
        memo: &str,
        signer: &SignerData,
    ) -> Result<SignedTx, ServiceError> {
        let request = SendRequest {
            to,
            amount: amount.normalize().to_string(),
            memo,
            signer_data: signer,
        };
        self.sign("/sign/send", &request, signer).await
    }

    async fn estimate_record_tx(
        &self,
        payload: &ContentDescriptor,
    ) -> Result<RecordTxEstimate, ServiceError> {
        const PATH: &str = "/estimate/record_tx";
        let response: RecordTxEstimateResponse = self
            .http
            .post_json(PATH, &EstimateRequest { payload })
            .await?;
        Ok(RecordTxEstimate {
            gas_fee_amount: self.parse_amount(PATH, "gasFee", &response.gas_fee)?,
            record_fee_amount: self.parse_amount(PATH, "recordFee", &response.record_fee)?,
        })
    }

    async fn estimate_record_fee(
        &self,
        payload: &ContentDescriptor,
    ) -> Result<Decimal, ServiceError> {
        const PATH: &str = "/estimate/record_fee";
        let response: RecordFeeResponse = self
            .http
            .post_json(PATH, &EstimateRequest { payload })
            .await?;
        self.parse_amount(PATH, "recordFee", &response.record_fee)
    }
}
