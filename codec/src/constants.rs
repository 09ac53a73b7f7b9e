// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::num::NonZeroU32;

pub const SALT_LEN: usize = 16;
pub const IV_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const BLOCK_LEN: usize = 16;

/// Header length of a cipher envelope on the wire (salt followed by iv)
pub const ENVELOPE_HEADER_LEN: usize = SALT_LEN + IV_LEN;

/// Iteration count accepted by the upstream verifier
pub const DEFAULT_KDF_ITERATIONS: NonZeroU32 = match NonZeroU32::new(1000) {
    Some(iterations) => iterations,
    None => unreachable!(),
};

/// Name of the single field wrapping a base64 gzip payload
pub const ENVELOPE_FIELD: &str = "result";

/// Maximum inflated size of an enveloped payload (16 MB) to bound gzip bombs
pub const MAX_DECOMPRESSED_SIZE: u64 = 16 * 1024 * 1024;
