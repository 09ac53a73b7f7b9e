// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Reversible at-rest encryption for automation credentials.
//!
//! Unlike the payload cipher, the key is derived once per process: the
//! vault secret is hashed with SHA-256 and the resulting 32 byte key is
//! shared by every entry. Each entry carries its own random iv.
//!
//! # Security
//!
//! - The derived key is zeroized on drop
//! - Decrypted secrets are returned as [`Zeroizing`] strings and are never cached
//! - A corrupted entry yields [`VaultError::DecryptionFailed`] instead of panicking

use std::fmt;

use aws_lc_rs::digest;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::constants::{IV_LEN, KEY_LEN};
use crate::errors::VaultError;
use crate::utils::{aes_cbc_decrypt, aes_cbc_encrypt, hex_decode, random_bytes};

/// The persisted form of a vaulted secret: two opaque hex strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub iv: String,
    pub ciphertext: String,
}

#[derive(ZeroizeOnDrop)]
struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    fn derive(secret: &str) -> Self {
        let hash = digest::digest(&digest::SHA256, secret.as_bytes());
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(hash.as_ref());
        Self(key)
    }
}

pub struct CredentialVault {
    key: VaultKey,
}

// Custom Debug implementation to prevent accidental logging of key material
impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CredentialVault {
    pub fn new(secret: &str) -> Self {
        Self {
            key: VaultKey::derive(secret),
        }
    }

    /// Encrypts `plaintext` under the process key with a fresh iv.
    pub fn seal(&self, plaintext: &str) -> Result<EncryptedSecret, VaultError> {
        let iv: [u8; IV_LEN] = random_bytes().map_err(|_| VaultError::Entropy)?;
        let ciphertext =
            aes_cbc_encrypt(&self.key.0, iv, plaintext.as_bytes()).map_err(|_| VaultError::Encrypt)?;

        Ok(EncryptedSecret {
            iv: HEXLOWER.encode(&iv),
            ciphertext: HEXLOWER.encode(&ciphertext),
        })
    }

    /// Decrypts a stored secret.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::DecryptionFailed`] if:
    /// - either field is not valid hex
    /// - the iv is not 16 bytes
    /// - the padding does not verify (wrong key or corrupted ciphertext)
    /// - the plaintext is not valid UTF-8
    pub fn open(&self, secret: &EncryptedSecret) -> Result<Zeroizing<String>, VaultError> {
        let iv: [u8; IV_LEN] = hex_decode(&secret.iv)
            .and_then(|iv| iv.try_into().ok())
            .ok_or(VaultError::DecryptionFailed)?;
        let ciphertext = hex_decode(&secret.ciphertext).ok_or(VaultError::DecryptionFailed)?;

        let plaintext = aes_cbc_decrypt(&self.key.0, iv, &ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::DecryptionFailed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let vault = CredentialVault::new("process-secret");
        for plaintext in ["", "p1", "pässwörd with unicode", &"x".repeat(100)] {
            let sealed = vault.seal(plaintext).unwrap();
            assert_eq!(vault.open(&sealed).unwrap().as_str(), plaintext);
        }
    }

    #[test]
    fn test_seal_uses_fresh_iv() {
        let vault = CredentialVault::new("process-secret");
        let first = vault.seal("same").unwrap();
        let second = vault.seal("same").unwrap();
        assert_ne!(first.iv, second.iv);
        assert_ne!(first.ciphertext, second.ciphertext);
    }

    #[test]
    fn test_sealed_fields_are_hex() {
        let vault = CredentialVault::new("process-secret");
        let sealed = vault.seal("p1").unwrap();
        assert_eq!(sealed.iv.len(), IV_LEN * 2);
        assert_eq!(sealed.ciphertext.len() % 32, 0);
        assert!(sealed.iv.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_is_shared_across_instances() {
        let sealed = CredentialVault::new("process-secret").seal("p1").unwrap();
        let opened = CredentialVault::new("process-secret").open(&sealed).unwrap();
        assert_eq!(opened.as_str(), "p1");
    }

    #[test]
    fn test_wrong_key_fails() {
        let sealed = CredentialVault::new("process-secret").seal("p1").unwrap();
        let result = CredentialVault::new("rotated-secret").open(&sealed);
        // a wrong key either breaks the padding or produces different bytes
        assert!(result.map(|p| p.as_str() != "p1").unwrap_or(true));
    }

    #[test]
    fn test_malformed_entries_fail_cleanly() {
        let vault = CredentialVault::new("process-secret");
        let sealed = vault.seal("p1").unwrap();

        let cases = [
            EncryptedSecret {
                iv: "zz".to_string(),
                ciphertext: sealed.ciphertext.clone(),
            },
            EncryptedSecret {
                iv: "00ff".to_string(),
                ciphertext: sealed.ciphertext.clone(),
            },
            EncryptedSecret {
                iv: sealed.iv.clone(),
                ciphertext: "abc".to_string(),
            },
            EncryptedSecret {
                iv: sealed.iv.clone(),
                ciphertext: "00".repeat(15),
            },
        ];

        for case in cases {
            assert_eq!(vault.open(&case), Err(VaultError::DecryptionFailed));
        }
    }

    #[test]
    fn test_debug_redacts_key() {
        let vault = CredentialVault::new("process-secret");
        assert!(format!("{vault:?}").contains("[REDACTED]"));
    }
}
