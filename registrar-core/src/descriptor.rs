// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("metadata must be a JSON object")]
    InvalidMetadata,
    #[error("contentFingerprints must be an array")]
    FingerprintsShouldBeArray,
    #[error("stakeholders must be an array")]
    StakeholdersShouldBeArray,
    #[error("keywords must be an array")]
    KeywordsShouldBeArray,
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidMetadata => "INVALID_METADATA",
            Self::FingerprintsShouldBeArray => "FINGERPRINTS_SHOULD_BE_ARRAY",
            Self::StakeholdersShouldBeArray => "STAKEHOLDERS_SHOULD_BE_ARRAY",
            Self::KeywordsShouldBeArray => "KEYWORDS_SHOULD_BE_ARRAY",
        }
    }
}

/// Record payload handed to the signer. Only the fields below survive parsing;
/// anything else in the submitted metadata is dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDescriptor {
    pub content_fingerprints: Vec<Value>,
    pub stakeholders: Vec<Value>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_info: Option<Value>,
    pub keywords: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_published: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_notes: Option<String>,
}

impl ContentDescriptor {
    /// Accepts either a JSON object or a string holding one. `null` yields an
    /// empty descriptor.
    pub fn from_metadata(metadata: &Value) -> Result<Self, ValidationError> {
        match metadata {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Self::from_object(map),
            Value::String(raw) => {
                let parsed: Value =
                    serde_json::from_str(raw).map_err(|_| ValidationError::InvalidMetadata)?;
                match parsed {
                    Value::Object(map) => Self::from_object(&map),
                    Value::Null => Ok(Self::default()),
                    _ => Err(ValidationError::InvalidMetadata),
                }
            }
            _ => Err(ValidationError::InvalidMetadata),
        }
    }

    fn from_object(map: &Map<String, Value>) -> Result<Self, ValidationError> {
        Ok(Self {
            content_fingerprints: array_field(
                map,
                "contentFingerprints",
                ValidationError::FingerprintsShouldBeArray,
            )?,
            stakeholders: array_field(
                map,
                "stakeholders",
                ValidationError::StakeholdersShouldBeArray,
            )?,
            kind: optional_field(map, "type"),
            name: optional_field(map, "name"),
            description: optional_field(map, "description"),
            usage_info: optional_field(map, "usageInfo"),
            keywords: array_field(map, "keywords", ValidationError::KeywordsShouldBeArray)?,
            date_published: optional_field(map, "datePublished"),
            url: optional_field(map, "url"),
            record_notes: None,
        })
    }

    pub fn with_record_notes(mut self, notes: impl Into<String>) -> Self {
        self.record_notes = Some(notes.into());
        self
    }

    pub fn push_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.content_fingerprints
            .push(Value::String(fingerprint.into()));
    }
}

// Missing means empty; present but not an array is rejected, `null` included.
fn array_field(
    map: &Map<String, Value>,
    key: &str,
    err: ValidationError,
) -> Result<Vec<Value>, ValidationError> {
    match map.get(key) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(err),
    }
}

fn optional_field(map: &Map<String, Value>, key: &str) -> Option<Value> {
    map.get(key).filter(|value| !value.is_null()).cloned()
}
