// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Normalization of upstream response bodies.
//!
//! Depending on the server, the upstream answers either with the JSON payload
//! itself or with an envelope of the form
//!
//! ```json
//! {"result": "<base64(gzip(json))>"}
//! ```
//!
//! Both shapes are classified into a [`Payload`] and then reduced to a single
//! [`serde_json::Value`].

use std::io::Read;

use flate2::read::GzDecoder;
use serde_json::Value;

use crate::constants::{ENVELOPE_FIELD, MAX_DECOMPRESSED_SIZE};
use crate::errors::DecodeError;
use crate::utils::base64_decode;

/// The two response shapes served by the upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Plain(Value),
    /// Base64 text of a gzip-compressed JSON document.
    Enveloped(String),
}

impl Payload {
    pub fn classify(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }

        let value: Value =
            serde_json::from_slice(raw).map_err(|err| DecodeError::Json(err.to_string()))?;

        match value {
            Value::Object(mut map) if map.len() == 1 && map.contains_key(ENVELOPE_FIELD) => {
                match map.remove(ENVELOPE_FIELD) {
                    Some(Value::String(encoded)) => Ok(Payload::Enveloped(encoded)),
                    Some(other) => {
                        map.insert(ENVELOPE_FIELD.to_string(), other);
                        Ok(Payload::Plain(Value::Object(map)))
                    }
                    None => Ok(Payload::Plain(Value::Object(map))),
                }
            }
            value => Ok(Payload::Plain(value)),
        }
    }

    pub fn into_value(self) -> Result<Value, DecodeError> {
        match self {
            Payload::Plain(value) => Ok(value),
            Payload::Enveloped(encoded) => {
                let compressed = base64_decode(&encoded).ok_or(DecodeError::EnvelopeEncoding)?;
                let inflated = inflate(&compressed)?;
                serde_json::from_slice(&inflated)
                    .map_err(|err| DecodeError::EnvelopeJson(err.to_string()))
            }
        }
    }
}

fn inflate(compressed: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut inflated = Vec::new();
    GzDecoder::new(compressed)
        .take(MAX_DECOMPRESSED_SIZE + 1)
        .read_to_end(&mut inflated)
        .map_err(|err| DecodeError::EnvelopeCompression(err.to_string()))?;

    if inflated.len() as u64 > MAX_DECOMPRESSED_SIZE {
        return Err(DecodeError::EnvelopeTooLarge(MAX_DECOMPRESSED_SIZE));
    }

    Ok(inflated)
}

/// Reduces either upstream shape to one JSON value.
pub fn normalize(raw: &[u8]) -> Result<Value, DecodeError> {
    Payload::classify(raw)?.into_value()
}
