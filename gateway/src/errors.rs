// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use portal_codec::VaultError;
use serde_json::json;

use crate::resolver::ResolveError;
use crate::upstream::UpstreamError;

/// Every failure that reaches a caller is one of these.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AppError {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("rate limited, retry after {0} ms")]
    RateLimited(u64),
    #[error("upstream rejected the login envelope")]
    CipherMismatch,
    /// Carries per-candidate detail only when diagnostics are enabled.
    #[error("upstream unavailable")]
    UpstreamUnavailable(Option<Vec<String>>),
    #[error("upstream timeout")]
    UpstreamTimeout,
    #[error("vault decryption failed")]
    VaultDecryptionFailed,
    #[error("internal server error")]
    InternalServerError,
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl AppError {
    /// Maps a resolver failure, keeping candidate detail only on the diagnostic path.
    pub fn from_resolve(error: ResolveError, diagnostics: bool) -> Self {
        match error {
            ResolveError::Unavailable { failures, .. } => AppError::UpstreamUnavailable(
                diagnostics.then(|| failures.iter().map(ToString::to_string).collect()),
            ),
            ResolveError::Timeout { .. } => AppError::UpstreamTimeout,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, "Unauthenticated".to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            Self::ValidationError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            Self::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "Payload too large".to_string(),
            ),
            Self::RateLimited(_) => (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string()),
            Self::CipherMismatch => (
                StatusCode::BAD_GATEWAY,
                "Upstream rejected the login payload".to_string(),
            ),
            Self::UpstreamUnavailable(_) => {
                (StatusCode::BAD_GATEWAY, "Upstream unavailable".to_string())
            }
            Self::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, "Upstream timeout".to_string()),
            Self::VaultDecryptionFailed => (
                StatusCode::UNAUTHORIZED,
                "Stored credential unreadable, sign in again".to_string(),
            ),
            Self::InternalServerError | Self::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            ),
        };

        let mut body = json!({"code": status.as_u16(), "message": message});
        match self {
            Self::RateLimited(retry_after_ms) => {
                body["retry_after_ms"] = json!(retry_after_ms);
                let retry_after_secs = retry_after_ms.div_ceil(1000).max(1);
                let mut response = (status, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                return response;
            }
            Self::UpstreamUnavailable(Some(details)) => body["details"] = json!(details),
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl From<UpstreamError> for AppError {
    fn from(source: UpstreamError) -> Self {
        match source {
            UpstreamError::Timeout => AppError::UpstreamTimeout,
            UpstreamError::CipherMismatch => {
                tracing::error!("[gateway] upstream rejected the login envelope, check the cipher secret and digest");
                AppError::CipherMismatch
            }
            UpstreamError::Rejected(_) => AppError::Unauthenticated,
            UpstreamError::Unavailable(_) => {
                tracing::warn!("{:?}", source);
                AppError::UpstreamUnavailable(None)
            }
            UpstreamError::Cipher(_) => {
                tracing::error!("{:?}", source);
                AppError::InternalServerError
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!("[gateway] rejected request body: {}", rejection.body_text());
        let message = match rejection {
            JsonRejection::MissingJsonContentType(_) => "expected an application/json body",
            JsonRejection::JsonSyntaxError(_) => "request body is not valid JSON",
            JsonRejection::JsonDataError(_) => "request body has missing or mistyped fields",
            rejection if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return AppError::PayloadTooLarge;
            }
            _ => "request body could not be read",
        };
        AppError::ValidationError(message.to_string())
    }
}

impl From<ResolveError> for AppError {
    fn from(source: ResolveError) -> Self {
        AppError::from_resolve(source, false)
    }
}

impl From<VaultError> for AppError {
    fn from(source: VaultError) -> Self {
        match source {
            VaultError::DecryptionFailed => AppError::VaultDecryptionFailed,
            VaultError::Entropy | VaultError::Encrypt => {
                tracing::error!("{:?}", source);
                AppError::InternalServerError
            }
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(_source: serde_json::Error) -> Self {
        tracing::error!("{:?}", _source);
        AppError::InternalServerError
    }
}

impl From<anyhow::Error> for AppError {
    fn from(_source: anyhow::Error) -> Self {
        tracing::error!("{:?}", _source);
        AppError::InternalServerError
    }
}

impl From<std::io::Error> for AppError {
    fn from(_source: std::io::Error) -> Self {
        tracing::error!("{:?}", _source);
        AppError::InternalServerError
    }
}
