// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

/// Failures of the wire-compatible payload cipher.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("random source unavailable")]
    Entropy,
    #[error("unable to encrypt payload")]
    Encrypt,
    #[error("envelope is not valid base64")]
    Encoding,
    #[error("envelope too short: {0} bytes")]
    Truncated(usize),
    #[error("ciphertext length {0} is not a multiple of the block size")]
    Misaligned(usize),
    #[error("unable to decrypt envelope")]
    Decrypt,
    #[error("plaintext is not valid utf-8")]
    Utf8,
}

/// Failures of the credential vault.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("random source unavailable")]
    Entropy,
    #[error("unable to encrypt secret")]
    Encrypt,
    /// The stored pair cannot be read with the current key; the credential
    /// has to be captured again.
    #[error("vault decryption failed")]
    DecryptionFailed,
}

/// Failures while normalizing an upstream response body.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The upstream answered without a body.
    #[error("upstream returned no data")]
    Empty,
    #[error("body is not valid json: {0}")]
    Json(String),
    #[error("envelope payload is not valid base64")]
    EnvelopeEncoding,
    #[error("envelope payload could not be decompressed: {0}")]
    EnvelopeCompression(String),
    #[error("envelope payload exceeds {0} bytes once decompressed")]
    EnvelopeTooLarge(u64),
    #[error("envelope payload is not valid json: {0}")]
    EnvelopeJson(String),
}
