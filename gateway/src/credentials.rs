// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Encrypted-at-rest storage of portal passwords for scheduled automation.
//!
//! A password is only stored when the caller opts in at login. The record
//! holds the vault's hex `iv` and `ciphertext`, never the plaintext. A record
//! that can no longer be opened (rotated vault secret, corrupted row) is
//! reported as [`AppError::VaultDecryptionFailed`] and is never returned as
//! garbage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portal_codec::{CredentialVault, EncryptedSecret};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::errors::AppError;
use crate::store::Clock;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultRecord {
    pub identity: String,
    pub username: String,
    pub iv: String,
    pub ciphertext: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl VaultRecord {
    fn secret(&self) -> EncryptedSecret {
        EncryptedSecret {
            iv: self.iv.clone(),
            ciphertext: self.ciphertext.clone(),
        }
    }
}

impl fmt::Debug for VaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultRecord")
            .field("identity", &self.identity)
            .field("username", &self.username)
            .field("ciphertext", &"[REDACTED]")
            .field("enabled", &self.enabled)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Persistence for [`VaultRecord`]s, keyed by identity.
#[async_trait]
pub trait CredentialRepository: Send + Sync {
    async fn upsert(&self, record: VaultRecord) -> anyhow::Result<()>;

    async fn find(&self, identity: &str) -> anyhow::Result<Option<VaultRecord>>;

    /// Returns false when no record exists for `identity`.
    async fn set_enabled(&self, identity: &str, enabled: bool) -> anyhow::Result<bool>;

    async fn list_enabled(&self) -> anyhow::Result<Vec<VaultRecord>>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialRepository {
    records: RwLock<BTreeMap<String, VaultRecord>>,
}

impl MemoryCredentialRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialRepository for MemoryCredentialRepository {
    async fn upsert(&self, record: VaultRecord) -> anyhow::Result<()> {
        self.records
            .write()
            .await
            .insert(record.identity.clone(), record);
        Ok(())
    }

    async fn find(&self, identity: &str) -> anyhow::Result<Option<VaultRecord>> {
        Ok(self.records.read().await.get(identity).cloned())
    }

    async fn set_enabled(&self, identity: &str, enabled: bool) -> anyhow::Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(identity) {
            Some(record) => {
                record.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_enabled(&self) -> anyhow::Result<Vec<VaultRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|record| record.enabled)
            .cloned()
            .collect())
    }
}

/// Plaintext username and password recovered from a record.
pub struct RevealedCredential {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl fmt::Debug for RevealedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RevealedCredential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

pub struct CredentialStore {
    vault: CredentialVault,
    repository: Arc<dyn CredentialRepository>,
    clock: Arc<dyn Clock>,
}

impl CredentialStore {
    pub fn new(
        vault: CredentialVault,
        repository: Arc<dyn CredentialRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            vault,
            repository,
            clock,
        }
    }

    /// Encrypts `password` and stores it as the enabled record for `identity`.
    #[tracing::instrument(skip(self, password))]
    pub async fn capture(
        &self,
        identity: &str,
        username: &str,
        password: &str,
    ) -> Result<(), AppError> {
        let secret = self.vault.seal(password)?;
        self.repository
            .upsert(VaultRecord {
                identity: identity.to_string(),
                username: username.to_string(),
                iv: secret.iv,
                ciphertext: secret.ciphertext,
                enabled: true,
                updated_at: self.clock.now(),
            })
            .await?;

        tracing::info!("[gateway] captured credential for automation");
        Ok(())
    }

    /// Decrypts the stored credential for `identity`.
    ///
    /// # Errors
    ///
    /// - [`AppError::ValidationError`] - no enabled record exists
    /// - [`AppError::VaultDecryptionFailed`] - the record cannot be opened with the current key
    #[tracing::instrument(skip(self))]
    pub async fn reveal(&self, identity: &str) -> Result<RevealedCredential, AppError> {
        let record = self
            .repository
            .find(identity)
            .await?
            .filter(|record| record.enabled)
            .ok_or_else(|| AppError::ValidationError("automation is not enabled".to_string()))?;

        let password = self.vault.open(&record.secret()).map_err(|err| {
            tracing::warn!("[gateway] stored credential could not be decrypted");
            AppError::from(err)
        })?;

        Ok(RevealedCredential {
            username: record.username,
            password,
        })
    }

    /// Turns automation off for `identity`; returns false if nothing was stored.
    pub async fn disable(&self, identity: &str) -> Result<bool, AppError> {
        Ok(self.repository.set_enabled(identity, false).await?)
    }

    pub async fn enabled_identities(&self) -> Result<Vec<String>, AppError> {
        Ok(self
            .repository
            .list_enabled()
            .await?
            .into_iter()
            .map(|record| record.identity)
            .collect())
    }
}
