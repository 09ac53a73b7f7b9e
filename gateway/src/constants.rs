// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::time::Duration;

pub const MAX_BODY_SIZE: usize = 1024 * 1024; // 1 MB
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 8_000;
/// Time reserved for writing the response once upstream calls are done
pub const RESPONSE_MARGIN: Duration = Duration::from_secs(2);
/// Raw upstream bodies are read up to this size, before any inflation
pub const MAX_UPSTREAM_BODY_SIZE: usize = 4 * 1024 * 1024;
/// Upper bound for every configured window, TTL and interval (ten years)
pub const MAX_CONFIG_SECS: u64 = 10 * 365 * 24 * 60 * 60;
pub const USER_AGENT: &str = concat!("portal-gateway/", env!("CARGO_PKG_VERSION"));

/// Header carrying the identity that accompanies a caller's bearer token
pub const IDENTITY_HEADER: &str = "x-portal-identity";
/// Header the upstream expects next to the bearer token
pub const UPSTREAM_IDENTITY_HEADER: &str = "x-user-id";

// Session cache
pub const SESSION_TTL_SECS: u64 = 30; // upstream tokens live ~55 minutes
pub const SESSION_SWEEP_THRESHOLD: usize = 1024;

// Rate limiter windows are swept once this many keys are tracked
pub const RATE_LIMIT_SWEEP_THRESHOLD: usize = 10_000;

/// Fragments of upstream error bodies that mean the login envelope was not
/// understood (wrong shared secret or wrong key derivation digest)
pub const CIPHER_REJECTION_MARKERS: &[&str] = &[
    "padding",
    "base-64",
    "base64",
    "length of the data to decrypt",
    "block size",
];

// Identity claims, in lookup order
pub const TOKEN_CLAIMS: &[&str] = &["access_token", "accessToken", "token"];
pub const IDENTITY_CLAIMS: &[&str] = &["user_id", "userId", "id"];

// Automation
pub const AUTOMATION_INTERVAL_SECS: u64 = 6 * 60 * 60;
pub const AUTOMATION_JITTER_MS: u64 = 2_000;

// Validation constants for caller requests
pub const MAX_USERNAME_LENGTH: u64 = 128;
pub const MAX_PASSWORD_LENGTH: u64 = 256;
pub const MAX_EVALUATION_ID_LENGTH: u64 = 64;
pub const MAX_QUESTION_ID_LENGTH: u64 = 64;
pub const MAX_ANSWER_LENGTH: u64 = 4096;
pub const MAX_ANSWERS_COUNT: u64 = 200;
