// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Multi-host, multi-version endpoint resolution.
//!
//! The upstream serves the same logical capability from several
//! host/version combinations, and which ones work depends on the account.
//! Some combinations answer 404; others answer 200 with the HTML login page.
//!
//! # Algorithm
//!
//! For a [`Capability`], the [`CandidateTable`] holds a fixed, ordered list of
//! [`EndpointCandidate`]s. The resolver:
//!
//! 1. Calls the next candidate with the caller's bearer token
//! 2. Rejects non-2xx statuses and HTML bodies
//! 3. Normalizes the body with [`portal_codec::normalize`]
//! 4. Accepts the candidate only if the value has the capability's [`ExpectedShape`]
//! 5. Returns the first accepted value; later candidates are never called
//!
//! Exhausting the list yields one [`ResolveError::Unavailable`] holding every
//! candidate failure. A timeout stops resolution with [`ResolveError::Timeout`],
//! and so does running out of the resolver's overall time budget, which keeps
//! a walk over slow candidates inside the gateway's request timeout.
//!
//! Payload encoding is not negotiated here: cipher parameters are pinned in
//! configuration, and this module only walks hosts and versions.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use portal_codec::normalize;
use reqwest::Method;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::constants::{
    MAX_UPSTREAM_BODY_SIZE, REQUEST_TIMEOUT, RESPONSE_MARGIN, UPSTREAM_IDENTITY_HEADER,
};
use crate::models::TokenPair;
use crate::upstream::{BodyError, read_body};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Grades,
    Evaluations,
    SubmitEvaluation,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Grades => "grades",
            Capability::Evaluations => "evaluations",
            Capability::SubmitEvaluation => "submit_evaluation",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Capability::Grades | Capability::Evaluations => Method::GET,
            Capability::SubmitEvaluation => Method::POST,
        }
    }

    pub fn expected_shape(&self) -> ExpectedShape {
        match self {
            Capability::Grades | Capability::Evaluations => ExpectedShape::Collection,
            Capability::SubmitEvaluation => ExpectedShape::Document,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedShape {
    /// A JSON array, or an object wrapping one under `data`.
    Collection,
    /// A JSON object that is not an error report.
    Document,
}

impl ExpectedShape {
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ExpectedShape::Collection => {
                value.is_array() || value.get("data").is_some_and(Value::is_array)
            }
            ExpectedShape::Document => value
                .as_object()
                .is_some_and(|map| !map.contains_key("error") && !map.contains_key("errors")),
        }
    }
}

/// One `(host, apiVersion, path)` combination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    pub host: String,
    pub api_version: String,
    pub path: String,
}

impl EndpointCandidate {
    pub fn new(
        host: impl Into<String>,
        api_version: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            api_version: api_version.into(),
            path: path.into(),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.host.trim_end_matches('/'),
            self.api_version.trim_matches('/'),
            self.path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for EndpointCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Base URLs of the upstream servers the default tables refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamHosts {
    pub primary: String,
    pub secondary: String,
    pub legacy: String,
}

/// Ordered candidates per capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateTable {
    entries: HashMap<Capability, Vec<EndpointCandidate>>,
}

impl CandidateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, capability: Capability, candidates: Vec<EndpointCandidate>) -> Self {
        self.entries.insert(capability, candidates);
        self
    }

    pub fn candidates(&self, capability: Capability) -> &[EndpointCandidate] {
        self.entries
            .get(&capability)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The orderings observed against the portal.
    ///
    /// - grades: the secondary v2 host is the only one that serves history for
    ///   every account; the primary v2 route is gated by a feature flag
    /// - evaluations: primary v2 first, the legacy v1 listing as last resort
    /// - submission: primary v2 accepts answers for current terms, the legacy
    ///   route for older forms
    pub fn portal_defaults(hosts: &UpstreamHosts) -> Self {
        Self::new()
            .with(
                Capability::Grades,
                vec![
                    EndpointCandidate::new(&hosts.secondary, "v2", "students/me/grades/history"),
                    EndpointCandidate::new(&hosts.primary, "v2", "students/me/grades/history"),
                    EndpointCandidate::new(&hosts.primary, "v1", "grades/history"),
                    EndpointCandidate::new(&hosts.legacy, "v1", "Grades/GetHistory"),
                ],
            )
            .with(
                Capability::Evaluations,
                vec![
                    EndpointCandidate::new(&hosts.primary, "v2", "evaluations/pending"),
                    EndpointCandidate::new(&hosts.secondary, "v2", "evaluations/pending"),
                    EndpointCandidate::new(&hosts.legacy, "v1", "Evaluation/List"),
                ],
            )
            .with(
                Capability::SubmitEvaluation,
                vec![
                    EndpointCandidate::new(&hosts.primary, "v2", "evaluations/answers"),
                    EndpointCandidate::new(&hosts.legacy, "v1", "Evaluation/Submit"),
                    EndpointCandidate::new(&hosts.secondary, "v2", "evaluations/answers"),
                ],
            )
    }
}

/// Why a candidate was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    Status(u16),
    HtmlBody,
    BodyTooLarge,
    UnexpectedShape,
    Decode(String),
    Transport(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Status(code) => write!(f, "status {}", code),
            FailureReason::HtmlBody => f.write_str("html body"),
            FailureReason::BodyTooLarge => f.write_str("body too large"),
            FailureReason::UnexpectedShape => f.write_str("unexpected shape"),
            FailureReason::Decode(detail) => write!(f, "decode: {}", detail),
            FailureReason::Transport(detail) => write!(f, "transport: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFailure {
    pub candidate: EndpointCandidate,
    pub reason: FailureReason,
}

impl fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.candidate, self.reason)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no candidate served {capability}")]
    Unavailable {
        capability: Capability,
        failures: Vec<CandidateFailure>,
    },
    #[error("{capability} timed out at {candidate}")]
    Timeout {
        capability: Capability,
        candidate: EndpointCandidate,
    },
}

enum AttemptError {
    TimedOut,
    Failed(FailureReason),
}

impl From<reqwest::Error> for AttemptError {
    fn from(source: reqwest::Error) -> Self {
        if source.is_timeout() {
            AttemptError::TimedOut
        } else {
            AttemptError::Failed(FailureReason::Transport(source.without_url().to_string()))
        }
    }
}

impl From<BodyError> for AttemptError {
    fn from(source: BodyError) -> Self {
        match source {
            BodyError::TooLarge(_) => AttemptError::Failed(FailureReason::BodyTooLarge),
            BodyError::Transport(err) => AttemptError::from(err),
        }
    }
}

fn looks_like_html(body: &[u8]) -> bool {
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'<')
}

pub struct EndpointResolver {
    http: reqwest::Client,
    table: CandidateTable,
    budget: Duration,
}

impl EndpointResolver {
    pub fn new(http: reqwest::Client, table: CandidateTable) -> Self {
        Self {
            http,
            table,
            budget: REQUEST_TIMEOUT.saturating_sub(RESPONSE_MARGIN),
        }
    }

    /// Caps the total time one [`invoke`](Self::invoke) may spend across all candidates.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn table(&self) -> &CandidateTable {
        &self.table
    }

    /// Invokes `capability`, walking its candidates in order.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Unavailable`] - every candidate failed or answered with the wrong shape
    /// - [`ResolveError::Timeout`] - a candidate exceeded the upstream timeout, or the
    ///   candidate in flight when the budget ran out
    #[tracing::instrument(skip_all, fields(capability = %capability))]
    pub async fn invoke(
        &self,
        capability: Capability,
        auth: &TokenPair,
        body: Option<&Value>,
    ) -> Result<Value, ResolveError> {
        let candidates = self.table.candidates(capability);
        let mut failures = Vec::with_capacity(candidates.len());
        let deadline = tokio::time::Instant::now() + self.budget;

        for candidate in candidates {
            let attempt = self.attempt(capability, candidate, auth, body);
            let outcome = tokio::time::timeout_at(deadline, attempt)
                .await
                .unwrap_or(Err(AttemptError::TimedOut));

            match outcome {
                Ok(value) => {
                    tracing::debug!("[gateway] {} served by {}", capability, candidate);
                    return Ok(value);
                }
                Err(AttemptError::TimedOut) => {
                    tracing::warn!("[gateway] {} timed out at {}", capability, candidate);
                    return Err(ResolveError::Timeout {
                        capability,
                        candidate: candidate.clone(),
                    });
                }
                Err(AttemptError::Failed(reason)) => {
                    tracing::debug!("[gateway] {} rejected {}: {}", capability, candidate, reason);
                    failures.push(CandidateFailure {
                        candidate: candidate.clone(),
                        reason,
                    });
                }
            }
        }

        tracing::warn!(
            "[gateway] {} unavailable after {} candidates",
            capability,
            failures.len()
        );

        Err(ResolveError::Unavailable {
            capability,
            failures,
        })
    }

    async fn attempt(
        &self,
        capability: Capability,
        candidate: &EndpointCandidate,
        auth: &TokenPair,
        body: Option<&Value>,
    ) -> Result<Value, AttemptError> {
        let mut request = self
            .http
            .request(capability.method(), candidate.url())
            .bearer_auth(&auth.token)
            .header(UPSTREAM_IDENTITY_HEADER, &auth.identity)
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Failed(FailureReason::Status(status.as_u16())));
        }

        let html_content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("text/html"));
        let bytes = read_body(response, MAX_UPSTREAM_BODY_SIZE).await?;

        if html_content_type || looks_like_html(&bytes) {
            return Err(AttemptError::Failed(FailureReason::HtmlBody));
        }

        let value = normalize(&bytes)
            .map_err(|err| AttemptError::Failed(FailureReason::Decode(err.to_string())))?;

        if !capability.expected_shape().accepts(&value) {
            return Err(AttemptError::Failed(FailureReason::UnexpectedShape));
        }

        Ok(value)
    }
}
