// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # Portal Codec
//!
//! Stateless byte-level transforms used by the portal gateway.
//!
//! ## Modules
//!
//! - [`cipher`]: PBKDF2 + AES-256-CBC envelope accepted by the upstream login verifier
//! - [`vault`]: at-rest encryption of automation credentials under a process key
//! - [`decoder`]: normalization of plain and base64-gzip enveloped JSON responses
//! - [`errors`]: error types for the three transforms

pub mod cipher;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod utils;
pub mod vault;

pub use cipher::{CipherEnvelope, KdfDigest, PayloadCipher};
pub use decoder::{Payload, normalize};
pub use errors::{CipherError, DecodeError, VaultError};
pub use vault::{CredentialVault, EncryptedSecret};
