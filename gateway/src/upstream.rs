// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Single-endpoint calls to the upstream portal: the cipher login exchange
//! and the lightweight session probe.
//!
//! # Login Exchange
//!
//! 1. Serialize `{"username", "password"}` and seal it with the [`PayloadCipher`]
//! 2. POST `{"param": "<base64 envelope>"}` to the auth endpoint
//! 3. Normalize the response body and read the token and identity claims
//!
//! A rejection that mentions padding or base64 means the verifier could not
//! open the envelope. That is a configuration fault, so it is reported as
//! [`UpstreamError::CipherMismatch`] and never retried.

use std::time::Duration;

use async_trait::async_trait;
use portal_codec::{CipherError, PayloadCipher, normalize};
use serde_json::{Value, json};
use zeroize::Zeroizing;

use crate::constants::{
    CIPHER_REJECTION_MARKERS, IDENTITY_CLAIMS, MAX_UPSTREAM_BODY_SIZE, TOKEN_CLAIMS, USER_AGENT,
};
use crate::errors::AppError;
use crate::models::TokenPair;
use crate::session::{SessionProbe, Verdict};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("upstream call timed out")]
    Timeout,
    #[error("upstream could not open the cipher envelope")]
    CipherMismatch,
    #[error("upstream rejected the request with status {0}")]
    Rejected(u16),
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Unavailable(source.without_url().to_string())
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BodyError {
    #[error("upstream body exceeds {0} bytes")]
    TooLarge(usize),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl From<BodyError> for UpstreamError {
    fn from(source: BodyError) -> Self {
        match source {
            BodyError::TooLarge(_) => UpstreamError::Unavailable(source.to_string()),
            BodyError::Transport(err) => UpstreamError::from(err),
        }
    }
}

/// Reads the body of `response`, failing once it grows past `limit` bytes.
pub async fn read_body(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>, BodyError> {
    let declared_too_large = response
        .content_length()
        .is_some_and(|len| len > u64::try_from(limit).unwrap_or(u64::MAX));
    if declared_too_large {
        return Err(BodyError::TooLarge(limit));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len().saturating_add(chunk.len()) > limit {
            return Err(BodyError::TooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Builds the HTTP client shared by every upstream call.
///
/// Every request inherits `timeout`; expiry cancels the request.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| AppError::ConfigError(e.to_string()))
}

/// Returns the first claim in `keys` that holds a non-empty string or a number.
pub fn string_claim(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| match value.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .next()
}

fn is_cipher_rejection(body: &[u8]) -> bool {
    let body = String::from_utf8_lossy(body).to_lowercase();
    CIPHER_REJECTION_MARKERS
        .iter()
        .any(|marker| body.contains(marker))
}

pub struct UpstreamClient {
    http: reqwest::Client,
    auth_url: String,
    probe_url: String,
    cipher: PayloadCipher,
    cipher_secret: Zeroizing<String>,
}

impl UpstreamClient {
    pub fn new(
        http: reqwest::Client,
        auth_url: String,
        probe_url: String,
        cipher: PayloadCipher,
        cipher_secret: String,
    ) -> Self {
        Self {
            http,
            auth_url,
            probe_url,
            cipher,
            cipher_secret: Zeroizing::new(cipher_secret),
        }
    }

    /// Performs the cipher login exchange and returns the issued token pair.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::CipherMismatch`] - the verifier could not open the envelope
    /// - [`UpstreamError::Rejected`] - the upstream refused the credentials
    /// - [`UpstreamError::Timeout`] - the call exceeded the upstream timeout
    /// - [`UpstreamError::Unavailable`] - transport failure, 5xx, an oversized body, or a 2xx
    ///   without token and identity
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, UpstreamError> {
        let plaintext = Zeroizing::new(
            json!({"username": username, "password": password}).to_string(),
        );
        let param = self.cipher.encode(&plaintext, &self.cipher_secret)?;

        let response = self
            .http
            .post(&self.auth_url)
            .json(&json!({ "param": param }))
            .send()
            .await?;
        let status = response.status();
        let body = read_body(response, MAX_UPSTREAM_BODY_SIZE).await?;

        tracing::debug!("[gateway] login exchange answered with {}", status);

        if status.is_success()
            && let Ok(value) = normalize(&body)
            && let (Some(token), Some(identity)) = (
                string_claim(&value, TOKEN_CLAIMS),
                string_claim(&value, IDENTITY_CLAIMS),
            )
        {
            return Ok(TokenPair::new(token, identity));
        }

        if is_cipher_rejection(&body) {
            return Err(UpstreamError::CipherMismatch);
        }

        if status.is_success() {
            tracing::warn!("[gateway] login exchange succeeded without a token pair");
            return Err(UpstreamError::Unavailable(
                "login response carried no token pair".to_string(),
            ));
        }

        if status.is_server_error() {
            return Err(UpstreamError::Unavailable(format!("status {}", status)));
        }

        Err(UpstreamError::Rejected(status.as_u16()))
    }
}

#[async_trait]
impl SessionProbe for UpstreamClient {
    #[tracing::instrument(skip_all)]
    async fn probe(&self, token: &str) -> Result<Verdict, UpstreamError> {
        let response = match self.http.get(&self.probe_url).bearer_auth(token).send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return Err(UpstreamError::Timeout),
            Err(err) => {
                tracing::warn!("[gateway] session probe failed: {}", err.without_url());
                return Ok(Verdict::Invalid);
            }
        };

        if !response.status().is_success() {
            tracing::debug!("[gateway] session probe answered {}", response.status());
            return Ok(Verdict::Invalid);
        }

        let body = match read_body(response, MAX_UPSTREAM_BODY_SIZE).await {
            Ok(body) => body,
            Err(BodyError::Transport(err)) if err.is_timeout() => {
                return Err(UpstreamError::Timeout);
            }
            Err(err) => {
                tracing::warn!("[gateway] session probe body unreadable: {}", err);
                return Ok(Verdict::Invalid);
            }
        };

        let verdict = normalize(&body)
            .ok()
            .filter(Value::is_object)
            .and_then(|value| string_claim(&value, IDENTITY_CLAIMS))
            .map_or(Verdict::Invalid, Verdict::ValidUser);

        Ok(verdict)
    }
}
