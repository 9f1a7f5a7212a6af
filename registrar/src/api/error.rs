// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::workflow::{WorkflowError, error_chain};

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { code: &'static str, message: String },
    #[error("{0}")]
    ChainUpgrading(String),
    #[error("{0}")]
    BroadcastFailed(String),
    #[error("{0}")]
    DownstreamUnavailable(String),
    #[error("{0}")]
    ArchivePriceUnavailable(String),
    #[error("{0}")]
    UploadAfterPayment(String),
    #[error("{0}")]
    InternalError(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } | Self::ChainUpgrading(_) => StatusCode::BAD_REQUEST,
            Self::BroadcastFailed(_) | Self::UploadAfterPayment(_) => StatusCode::BAD_GATEWAY,
            Self::DownstreamUnavailable(_) | Self::ArchivePriceUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest { code, .. } => *code,
            Self::ChainUpgrading(_) => "CHAIN_UPGRADING",
            Self::BroadcastFailed(_) => "BROADCAST_FAILED",
            Self::DownstreamUnavailable(_) => "DOWNSTREAM_UNAVAILABLE",
            Self::ArchivePriceUnavailable(_) => "CANNOT_FETCH_ARWEAVE_ID_NOR_PRICE",
            Self::UploadAfterPayment(_) => "UPLOAD_FAILED_AFTER_PAYMENT",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(value: WorkflowError) -> Self {
        let message = error_chain(&value);
        match value {
            WorkflowError::Validation(err) => Self::BadRequest {
                code: err.code(),
                message,
            },
            WorkflowError::ChainUpgrading => Self::ChainUpgrading(message),
            WorkflowError::Broadcast { .. } => Self::BroadcastFailed(message),
            WorkflowError::Downstream { .. } | WorkflowError::ArchiveNotConfigured => {
                Self::DownstreamUnavailable(message)
            }
            WorkflowError::ArchivePriceUnavailable => Self::ArchivePriceUnavailable(message),
            WorkflowError::UploadAfterPayment { .. } => Self::UploadAfterPayment(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            ok: false,
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registrar_core::ValidationError;

    #[test]
    fn validation_errors_keep_their_codes() {
        let err = ApiError::from(WorkflowError::Validation(
            ValidationError::KeywordsShouldBeArray,
        ));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "KEYWORDS_SHOULD_BE_ARRAY");
    }

    #[test]
    fn price_unavailable_is_a_downstream_failure_with_its_own_code() {
        let err = ApiError::from(WorkflowError::ArchivePriceUnavailable);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "CANNOT_FETCH_ARWEAVE_ID_NOR_PRICE");
    }

    #[test]
    fn upload_after_payment_message_names_the_tx() {
        let err = ApiError::from(WorkflowError::UploadAfterPayment {
            tx_hash: "ABC123".to_string(),
            source: crate::client::ServiceError::Transport {
                url: "archive".to_string(),
                reason: "timeout".to_string(),
            },
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(err.to_string().contains("ABC123"));
    }
}
