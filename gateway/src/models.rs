// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;
use zeroize::ZeroizeOnDrop;

use crate::constants::{
    MAX_ANSWER_LENGTH, MAX_ANSWERS_COUNT, MAX_EVALUATION_ID_LENGTH, MAX_PASSWORD_LENGTH,
    MAX_QUESTION_ID_LENGTH, MAX_USERNAME_LENGTH,
};

/// An upstream bearer token and the identity it was issued to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct TokenPair {
    pub token: String,
    pub identity: String,
}

impl TokenPair {
    pub fn new(token: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            identity: identity.into(),
        }
    }
}

// Custom Debug implementation to prevent accidental logging of sensitive data
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("token", &"[REDACTED]")
            .field("identity", &self.identity)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize, Validate, ZeroizeOnDrop)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = "MAX_USERNAME_LENGTH"))]
    pub username: String,

    #[validate(length(min = 1, max = "MAX_PASSWORD_LENGTH"))]
    pub password: String,

    /// Keep an encrypted copy of the password for scheduled automation.
    #[serde(default)]
    #[zeroize(skip)]
    pub remember: bool,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("remember", &self.remember)
            .finish()
    }
}

impl LoginRequest {
    /// The key this login is rate limited under.
    pub fn limiter_key(&self) -> String {
        self.username.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub identity: String,
    pub automation_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitEvaluationRequest {
    #[validate(length(min = 1, max = "MAX_EVALUATION_ID_LENGTH"))]
    #[validate(custom(function = "validate_identifier"))]
    pub evaluation_id: String,

    #[validate(length(min = 1, max = "MAX_ANSWERS_COUNT"))]
    #[validate(nested)]
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Answer {
    #[validate(length(min = 1, max = "MAX_QUESTION_ID_LENGTH"))]
    #[validate(custom(function = "validate_identifier"))]
    pub question_id: String,

    #[validate(length(max = "MAX_ANSWER_LENGTH"))]
    pub value: String,
}

impl SubmitEvaluationRequest {
    /// The body the upstream evaluation endpoints accept.
    pub fn upstream_body(&self) -> Value {
        let answers: Vec<Value> = self
            .answers
            .iter()
            .map(|answer| json!({"questionId": answer.question_id, "value": answer.value}))
            .collect();
        json!({"evaluationId": self.evaluation_id, "answers": answers})
    }
}

/// Upstream identifiers are alphanumeric with `-` and `_`
fn validate_identifier(value: &str) -> Result<(), validator::ValidationError> {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_identifier"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationStatus {
    pub identity: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationReport {
    pub identity: String,
    pub pending_evaluations: usize,
    pub ran_at: DateTime<Utc>,
}
