// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failure talking to one of the external HTTP services (ledger node, signer,
/// archive).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("{url} returned status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("cannot decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

#[derive(Debug, Clone)]
pub(crate) struct JsonClient {
    base_url: String,
    client: reqwest::Client,
}

impl JsonClient {
    pub(crate) fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ServiceError::Transport {
                url: base_url.to_string(),
                reason: format!("cannot build http client: {err}"),
            })?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `Ok(None)` on 404.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<Option<T>, ServiceError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| ServiceError::Transport {
                url: url.clone(),
                reason: err.to_string(),
            })?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_response(url, response).await.map(Some)
    }

    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| ServiceError::Transport {
                url: url.clone(),
                reason: err.to_string(),
            })?;
        decode_response(url, response).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    url: String,
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::Status {
            url,
            status: status.as_u16(),
            body,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|err| ServiceError::Decode {
            url,
            reason: err.to_string(),
        })
}

/// Cosmos REST encodes 64-bit integers as strings.
pub(crate) fn de_u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    use serde::de::Error as _;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(0),
        serde_json::Value::Number(number) => number
            .as_u64()
            .ok_or_else(|| D::Error::custom(format!("not an unsigned integer: {number}"))),
        serde_json::Value::String(text) if text.is_empty() => Ok(0),
        serde_json::Value::String(text) => text
            .parse()
            .map_err(|_| D::Error::custom(format!("not an unsigned integer: {text}"))),
        other => Err(D::Error::custom(format!(
            "expected integer or string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_keeps_base_url_without_trailing_slash() {
        let client =
            JsonClient::new("http://localhost:1317/", Duration::from_secs(5)).expect("build client");
        assert_eq!(client.url("/cosmos/tx"), "http://localhost:1317/cosmos/tx");
    }

    #[test]
    fn lenient_u64_accepts_strings_numbers_and_null() {
        #[derive(serde::Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "de_u64_lenient")]
            value: u64,
        }
        let parse = |raw: &str| serde_json::from_str::<Wrapper>(raw).map(|w| w.value);
        assert_eq!(parse(r#"{"value":"42"}"#).expect("string"), 42);
        assert_eq!(parse(r#"{"value":7}"#).expect("number"), 7);
        assert_eq!(parse(r#"{"value":null}"#).expect("null"), 0);
        assert!(parse(r#"{"value":"-1"}"#).is_err());
    }
}
