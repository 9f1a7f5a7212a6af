// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Permanent-storage and content-addressed pinning services used by the
//! upload flow.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::client::{JsonClient, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    pub key: String,
    pub archive_id: String,
}

/// `price` is in display units. `existing_id` is set when the exact content
/// is already archived and no payment is needed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArchiveEstimate {
    pub key: String,
    pub existing_id: Option<String>,
    pub price: Option<Decimal>,
    pub native_price: Option<String>,
    pub existing_entries: Vec<ArchiveEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveUpload {
    pub archive_id: String,
    pub entries: Vec<ArchiveEntry>,
}

#[async_trait]
pub trait ArchiveService: Send + Sync {
    async fn content_hash(&self, files: &[ArchiveFile]) -> Result<String, ServiceError>;

    async fn estimate(
        &self,
        files: &[ArchiveFile],
        deduplicate: bool,
    ) -> Result<ArchiveEstimate, ServiceError>;

    async fn upload(
        &self,
        files: &[ArchiveFile],
        existing: &[ArchiveEntry],
        deduplicate: bool,
    ) -> Result<ArchiveUpload, ServiceError>;

    async fn pin(&self, files: &[ArchiveFile]) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
pub struct HttpArchiveClient {
    http: JsonClient,
}

impl HttpArchiveClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            http: JsonClient::new(base_url, timeout)?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireFile<'a> {
    name: &'a str,
    content_type: &'a str,
    data: String,
}

fn wire_files(files: &[ArchiveFile]) -> Vec<WireFile<'_>> {
    files
        .iter()
        .map(|file| WireFile {
            name: &file.name,
            content_type: &file.content_type,
            data: general_purpose::STANDARD.encode(&file.data),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct FilesRequest<'a> {
    files: Vec<WireFile<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EstimateRequest<'a> {
    files: Vec<WireFile<'a>>,
    deduplicate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    files: Vec<WireFile<'a>>,
    existing: &'a [ArchiveEntry],
    deduplicate: bool,
}

#[derive(Debug, Deserialize)]
struct HashResponse {
    hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateResponse {
    #[serde(default)]
    key: String,
    #[serde(default)]
    archive_id: Option<String>,
    #[serde(default)]
    like: Option<String>,
    #[serde(default)]
    ar: Option<String>,
    #[serde(default)]
    list: Vec<ArchiveEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    archive_id: String,
    #[serde(default)]
    list: Vec<ArchiveEntry>,
}

#[derive(Debug, Deserialize)]
struct AckResponse {}

#[async_trait]
impl ArchiveService for HttpArchiveClient {
    async fn content_hash(&self, files: &[ArchiveFile]) -> Result<String, ServiceError> {
        let request = FilesRequest {
            files: wire_files(files),
        };
        let response: HashResponse = self.http.post_json("/hash", &request).await?;
        Ok(response.hash)
    }

    async fn estimate(
        &self,
        files: &[ArchiveFile],
        deduplicate: bool,
    ) -> Result<ArchiveEstimate, ServiceError> {
        let request = EstimateRequest {
            files: wire_files(files),
            deduplicate,
        };
        let response: EstimateResponse = self.http.post_json("/estimate", &request).await?;
        let price = response
            .like
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .map_err(|err| ServiceError::Decode {
                url: self.http.url("/estimate"),
                reason: format!("price is not a decimal amount: {err}"),
            })?;
        Ok(ArchiveEstimate {
            key: response.key,
            existing_id: response.archive_id.filter(|id| !id.is_empty()),
            price,
            native_price: response.ar,
            existing_entries: response.list,
        })
    }

    async fn upload(
        &self,
        files: &[ArchiveFile],
        existing: &[ArchiveEntry],
        deduplicate: bool,
    ) -> Result<ArchiveUpload, ServiceError> {
        let request = UploadRequest {
            files: wire_files(files),
            existing,
            deduplicate,
        };
        let response: UploadResponse = self.http.post_json("/upload", &request).await?;
        Ok(ArchiveUpload {
            archive_id: response.archive_id,
            entries: response.list,
        })
    }

    async fn pin(&self, files: &[ArchiveFile]) -> Result<(), ServiceError> {
        let request = FilesRequest {
            files: wire_files(files),
        };
        let _: AckResponse = self.http.post_json("/pin", &request).await?;
        Ok(())
    }
}
