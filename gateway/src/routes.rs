// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! HTTP route handlers for the portal gateway API.
//!
//! | Method | Path | Handler | Description |
//! |--------|------|---------|-------------|
//! | GET | `/health` | [`health`] | Health check endpoint |
//! | POST | `/auth/login` | [`login`] | Cipher login exchange |
//! | GET | `/grades` | [`grades`] | Grade history |
//! | GET | `/evaluations` | [`evaluations`] | Pending evaluations |
//! | POST | `/evaluations/submit` | [`submit_evaluation`] | Submit evaluation answers |
//! | DELETE | `/automation` | [`disable_automation`] | Stop scheduled automation |
//! | POST | `/automation/run` | [`run_automation`] | Run automation now |
//!
//! Every route except `/health` and `/auth/login` requires
//! `Authorization: Bearer <token>` together with `X-Portal-Identity`.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use serde_json::{Value, json};
use validator::Validate;

use crate::application::AppState;
use crate::constants::IDENTITY_HEADER;
use crate::errors::AppError;
use crate::models::{
    AutomationReport, AutomationStatus, LoginRequest, LoginResponse, SubmitEvaluationRequest,
    TokenPair,
};
use crate::rate_limit::{RateLimitDecision, RateLimitNamespace};
use crate::resolver::Capability;

/// Health check endpoint.
///
/// # Response
///
/// ```json
/// {"status": "ok"}
/// ```
pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Reads the caller's token pair from the request headers.
///
/// Both halves are required; a missing or malformed header is
/// [`AppError::Unauthenticated`].
pub fn token_pair(headers: &HeaderMap) -> Result<TokenPair, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    let identity = headers
        .get(IDENTITY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|identity| !identity.is_empty())
        .ok_or(AppError::Unauthenticated)?;

    Ok(TokenPair::new(token, identity))
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<TokenPair, AppError> {
    let pair = token_pair(headers)?;
    state.sessions.authenticate(&pair).await?;
    Ok(pair)
}

fn ensure_allowed(decision: &RateLimitDecision) -> Result<(), AppError> {
    if decision.allowed {
        Ok(())
    } else {
        Err(AppError::RateLimited(decision.retry_after_ms.unwrap_or(1)))
    }
}

/// Exchanges a username and password for an upstream token pair.
///
/// # Request Flow
///
/// 1. Validate the [`LoginRequest`]
/// 2. Check and consume a `login` rate-limit slot for the username
/// 3. Perform the cipher login exchange
/// 4. Clear the username's window on success
/// 5. With `remember`, store the password in the credential vault
///
/// # Errors
///
/// - [`AppError::ValidationError`] - the body is not a valid [`LoginRequest`]
/// - [`AppError::RateLimited`] - too many attempts for this username
/// - [`AppError::CipherMismatch`] - the upstream could not open the envelope
/// - [`AppError::Unauthenticated`] - the upstream refused the credentials
#[tracing::instrument(skip_all)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(request) = payload?;
    request.validate().map_err(|e| {
        tracing::debug!("[gateway] login validation failed: {}", e);
        AppError::ValidationError(e.to_string())
    })?;

    let key = request.limiter_key();
    ensure_allowed(&state.rate_limiter.check(RateLimitNamespace::Login, &key).await?)?;
    state
        .rate_limiter
        .increment(RateLimitNamespace::Login, &key)
        .await?;

    let pair = state
        .upstream
        .login(&request.username, &request.password)
        .await?;

    state
        .rate_limiter
        .reset(RateLimitNamespace::Login, &key)
        .await?;

    if request.remember {
        state
            .credentials
            .capture(&pair.identity, &request.username, &request.password)
            .await?;
    }

    tracing::info!("[gateway] login succeeded");

    Ok(Json(LoginResponse {
        token: pair.token.clone(),
        identity: pair.identity.clone(),
        automation_enabled: request.remember,
    }))
}

async fn resolve(
    state: &AppState,
    capability: Capability,
    pair: &TokenPair,
    body: Option<&Value>,
) -> Result<Json<Value>, AppError> {
    state
        .resolver
        .invoke(capability, pair, body)
        .await
        .map(Json)
        .map_err(|err| AppError::from_resolve(err, state.options.diagnostics))
}

#[tracing::instrument(skip_all)]
pub async fn grades(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let pair = authenticate(&state, &headers).await?;
    resolve(&state, Capability::Grades, &pair, None).await
}

#[tracing::instrument(skip_all)]
pub async fn evaluations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    let pair = authenticate(&state, &headers).await?;
    resolve(&state, Capability::Evaluations, &pair, None).await
}

/// Submits evaluation answers through the resolver.
///
/// The rate limit is checked before the body is parsed and validated, but a
/// slot is consumed only once the body is valid, so a typo does not cost an
/// attempt.
#[tracing::instrument(skip_all)]
pub async fn submit_evaluation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<SubmitEvaluationRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let pair = authenticate(&state, &headers).await?;

    ensure_allowed(
        &state
            .rate_limiter
            .check(RateLimitNamespace::Submit, &pair.identity)
            .await?,
    )?;

    let Json(request) = payload?;
    request.validate().map_err(|e| {
        tracing::debug!("[gateway] submission validation failed: {}", e);
        AppError::ValidationError(e.to_string())
    })?;

    state
        .rate_limiter
        .increment(RateLimitNamespace::Submit, &pair.identity)
        .await?;

    let body = request.upstream_body();
    resolve(&state, Capability::SubmitEvaluation, &pair, Some(&body)).await
}

#[tracing::instrument(skip_all)]
pub async fn disable_automation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AutomationStatus>, AppError> {
    let pair = authenticate(&state, &headers).await?;

    if !state.credentials.disable(&pair.identity).await? {
        tracing::debug!("[gateway] no stored credential to disable");
    }

    Ok(Json(AutomationStatus {
        identity: pair.identity.clone(),
        enabled: false,
    }))
}

#[tracing::instrument(skip_all)]
pub async fn run_automation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AutomationReport>, AppError> {
    let pair = authenticate(&state, &headers).await?;

    ensure_allowed(
        &state
            .rate_limiter
            .check(RateLimitNamespace::Automation, &pair.identity)
            .await?,
    )?;
    state
        .rate_limiter
        .increment(RateLimitNamespace::Automation, &pair.identity)
        .await?;

    let report = state.automation.run_for(&pair.identity).await?;
    Ok(Json(report))
}
