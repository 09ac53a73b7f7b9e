// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Wire-compatible payload cipher for the upstream authentication call.
//!
//! The upstream verifier only accepts envelopes built exactly like this:
//!
//! 1. A fresh 16 byte salt is stretched with PBKDF2 into a 32 byte key
//! 2. A fresh 16 byte iv seeds AES-256-CBC with PKCS7 padding
//! 3. The UTF-8 plaintext is encrypted
//! 4. `salt ‖ iv ‖ ciphertext` is base64 encoded
//!
//! # Wire Format
//!
//! ```text
//! +-----------+---------+------------------------+
//! | salt (16) | iv (16) | ciphertext (16 * k)    |
//! +-----------+---------+------------------------+
//! ```
//!
//! The PBKDF2 digest is not observable from the outside; it is configured
//! through [`KdfDigest`] and pinned with an integration test against the
//! live verifier.

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use aws_lc_rs::pbkdf2;
use data_encoding::BASE64;
use zeroize::Zeroizing;

use crate::constants::{
    BLOCK_LEN, DEFAULT_KDF_ITERATIONS, ENVELOPE_HEADER_LEN, IV_LEN, KEY_LEN, SALT_LEN,
};
use crate::errors::CipherError;
use crate::utils::{aes_cbc_decrypt, aes_cbc_encrypt, base64_decode, random_bytes};

/// Digest used by PBKDF2 when stretching the shared secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KdfDigest {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl KdfDigest {
    fn algorithm(self) -> pbkdf2::Algorithm {
        match self {
            KdfDigest::Sha1 => pbkdf2::PBKDF2_HMAC_SHA1,
            KdfDigest::Sha256 => pbkdf2::PBKDF2_HMAC_SHA256,
            KdfDigest::Sha512 => pbkdf2::PBKDF2_HMAC_SHA512,
        }
    }
}

impl FromStr for KdfDigest {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(KdfDigest::Sha1),
            "sha256" | "sha-256" => Ok(KdfDigest::Sha256),
            "sha512" | "sha-512" => Ok(KdfDigest::Sha512),
            other => Err(format!("unsupported kdf digest: {other}")),
        }
    }
}

impl fmt::Display for KdfDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KdfDigest::Sha1 => "sha1",
            KdfDigest::Sha256 => "sha256",
            KdfDigest::Sha512 => "sha512",
        };
        f.write_str(name)
    }
}

/// The salt, iv and ciphertext produced for one authentication call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherEnvelope {
    pub salt: [u8; SALT_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl CipherEnvelope {
    pub fn to_wire(&self) -> String {
        let mut bytes = Vec::with_capacity(ENVELOPE_HEADER_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.salt);
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.ciphertext);
        BASE64.encode(&bytes)
    }

    pub fn from_wire(wire: &str) -> Result<Self, CipherError> {
        let bytes = base64_decode(wire).ok_or(CipherError::Encoding)?;

        // at least one padded block must follow the header
        if bytes.len() < ENVELOPE_HEADER_LEN + BLOCK_LEN {
            return Err(CipherError::Truncated(bytes.len()));
        }

        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (iv, ciphertext) = rest.split_at(IV_LEN);

        if ciphertext.len() % BLOCK_LEN != 0 {
            return Err(CipherError::Misaligned(ciphertext.len()));
        }

        Ok(Self {
            salt: salt.try_into().map_err(|_| CipherError::Truncated(bytes.len()))?,
            iv: iv.try_into().map_err(|_| CipherError::Truncated(bytes.len()))?,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Stateless encoder for the upstream authentication payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadCipher {
    digest: KdfDigest,
    iterations: NonZeroU32,
}

impl Default for PayloadCipher {
    fn default() -> Self {
        Self::new(KdfDigest::default(), DEFAULT_KDF_ITERATIONS)
    }
}

impl PayloadCipher {
    pub fn new(digest: KdfDigest, iterations: NonZeroU32) -> Self {
        Self { digest, iterations }
    }

    pub fn digest(&self) -> KdfDigest {
        self.digest
    }

    pub fn iterations(&self) -> NonZeroU32 {
        self.iterations
    }

    fn derive_key(&self, shared_secret: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2::derive(
            self.digest.algorithm(),
            self.iterations,
            salt,
            shared_secret.as_bytes(),
            key.as_mut_slice(),
        );
        key
    }

    /// Encrypts `plaintext` into a fresh [`CipherEnvelope`].
    ///
    /// Every call draws a new salt and iv, so identical plaintexts never
    /// produce identical envelopes.
    pub fn seal(&self, plaintext: &str, shared_secret: &str) -> Result<CipherEnvelope, CipherError> {
        let salt: [u8; SALT_LEN] = random_bytes().map_err(|_| CipherError::Entropy)?;
        let iv: [u8; IV_LEN] = random_bytes().map_err(|_| CipherError::Entropy)?;

        // an all-zero draw means the random source is broken
        if salt.iter().all(|b| *b == 0) && iv.iter().all(|b| *b == 0) {
            return Err(CipherError::Entropy);
        }

        let key = self.derive_key(shared_secret, &salt);
        let ciphertext =
            aes_cbc_encrypt(&key, iv, plaintext.as_bytes()).map_err(|_| CipherError::Encrypt)?;

        Ok(CipherEnvelope {
            salt,
            iv,
            ciphertext,
        })
    }

    /// Encrypts `plaintext` and returns the base64 wire string.
    pub fn encode(&self, plaintext: &str, shared_secret: &str) -> Result<String, CipherError> {
        Ok(self.seal(plaintext, shared_secret)?.to_wire())
    }

    /// Re-derives the key from the embedded salt and decrypts the envelope.
    pub fn decode(&self, wire: &str, shared_secret: &str) -> Result<String, CipherError> {
        let envelope = CipherEnvelope::from_wire(wire)?;
        let key = self.derive_key(shared_secret, &envelope.salt);

        let plaintext = aes_cbc_decrypt(&key, envelope.iv, &envelope.ciphertext)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Utf8)
    }
}
