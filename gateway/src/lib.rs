// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # Portal Gateway
//!
//! A compatibility gateway in front of a legacy student portal.
//!
//! ## Architecture
//!
//! ```text
//! Client -> HTTP API -> Gateway (this crate) -> primary / secondary / legacy hosts
//!                          |
//!                          +-> session cache (probe endpoint)
//!                          +-> rate limiter
//!                          +-> credential vault (automation)
//! ```
//!
//! The gateway hides three upstream quirks from clients:
//!
//! - **Cipher login**: credentials travel as a PBKDF2 + AES-CBC envelope
//! - **Endpoint drift**: the same capability lives on different hosts and API
//!   versions depending on the account
//! - **Compressed payloads**: some hosts wrap JSON as base64(gzip(json))
//!
//! ## Modules
//!
//! - [`application`]: state wiring and the Axum router with body limits and timeouts
//! - [`automation`]: scheduled runs on behalf of enrolled users
//! - [`configuration`]: CLI argument parsing with clap
//! - [`constants`]: configuration constants for the application
//! - [`credentials`]: encrypted-at-rest storage of automation credentials
//! - [`errors`]: application error types with HTTP response mapping
//! - [`models`]: request/response types with validation
//! - [`rate_limit`]: fixed-window limiter with separate check and increment
//! - [`resolver`]: ordered multi-host endpoint fallback
//! - [`routes`]: HTTP route handlers
//! - [`session`]: bearer token validation with a TTL cache
//! - [`store`]: pluggable key-value store and clock
//! - [`upstream`]: login exchange and session probe
//!
//! ## Usage
//!
//! ```bash
//! PORTAL_CIPHER_SECRET=... PORTAL_VAULT_SECRET=... portal-gateway --port 8080
//! ```
//!
//! ## Security Considerations
//!
//! - Passwords, tokens and shared secrets are redacted from `Debug` output
//! - Vault plaintext is zeroized on drop
//! - Upstream bodies are never relayed in error responses
//! - Per-candidate failure detail is only exposed with `--diagnostics`

pub mod application;
pub mod automation;
pub mod configuration;
pub mod constants;
pub mod credentials;
pub mod errors;
pub mod models;
pub mod rate_limit;
pub mod resolver;
pub mod routes;
pub mod session;
pub mod store;
pub mod upstream;
