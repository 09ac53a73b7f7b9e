// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Scheduled work on behalf of users who opted in at login.
//!
//! Each run reveals the stored credential, performs a fresh cipher login and
//! lists pending evaluations through the resolver. A credential that no
//! longer decrypts disables automation for that identity until the user
//! signs in again with `remember` set.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::constants::AUTOMATION_JITTER_MS;
use crate::credentials::CredentialStore;
use crate::errors::AppError;
use crate::models::AutomationReport;
use crate::resolver::{Capability, EndpointResolver};
use crate::store::Clock;
use crate::upstream::UpstreamClient;

pub struct AutomationRunner {
    credentials: Arc<CredentialStore>,
    upstream: Arc<UpstreamClient>,
    resolver: Arc<EndpointResolver>,
    clock: Arc<dyn Clock>,
    diagnostics: bool,
}

fn count_items(value: &Value) -> usize {
    value
        .as_array()
        .or_else(|| value.get("data").and_then(Value::as_array))
        .map_or(0, Vec::len)
}

impl AutomationRunner {
    pub fn new(
        credentials: Arc<CredentialStore>,
        upstream: Arc<UpstreamClient>,
        resolver: Arc<EndpointResolver>,
        clock: Arc<dyn Clock>,
        diagnostics: bool,
    ) -> Self {
        Self {
            credentials,
            upstream,
            resolver,
            clock,
            diagnostics,
        }
    }

    /// Runs one automation pass for `identity`.
    ///
    /// # Errors
    ///
    /// - [`AppError::ValidationError`] - no enabled record for the identity
    /// - [`AppError::VaultDecryptionFailed`] - the record is unreadable; it is disabled
    /// - [`AppError::Unauthenticated`] - the stored password no longer logs in
    /// - [`AppError::Forbidden`] - the login returned a different identity
    /// - upstream failures as mapped from the login exchange and the resolver
    #[tracing::instrument(skip(self))]
    pub async fn run_for(&self, identity: &str) -> Result<AutomationReport, AppError> {
        let credential = match self.credentials.reveal(identity).await {
            Ok(credential) => credential,
            Err(AppError::VaultDecryptionFailed) => {
                self.credentials.disable(identity).await?;
                tracing::warn!("[gateway] disabled automation after a vault decryption failure");
                return Err(AppError::VaultDecryptionFailed);
            }
            Err(err) => return Err(err),
        };

        let pair = self
            .upstream
            .login(&credential.username, &credential.password)
            .await?;

        if pair.identity != identity {
            tracing::error!("[gateway] stored credential logged in as a different identity");
            return Err(AppError::Forbidden);
        }

        let evaluations = self
            .resolver
            .invoke(Capability::Evaluations, &pair, None)
            .await
            .map_err(|err| AppError::from_resolve(err, self.diagnostics))?;

        let report = AutomationReport {
            identity: identity.to_string(),
            pending_evaluations: count_items(&evaluations),
            ran_at: self.clock.now(),
        };

        tracing::info!(
            "[gateway] automation found {} pending evaluations",
            report.pending_evaluations
        );

        Ok(report)
    }

    /// Runs every enabled identity in turn, spacing calls with a random jitter.
    ///
    /// Failures are logged and skipped; the successful reports are returned.
    pub async fn run_all(&self) -> Result<Vec<AutomationReport>, AppError> {
        let identities = self.credentials.enabled_identities().await?;
        tracing::info!("[gateway] automation pass over {} identities", identities.len());

        let mut reports = Vec::with_capacity(identities.len());
        for identity in identities {
            let jitter = Duration::from_millis(fastrand::u64(0..=AUTOMATION_JITTER_MS));
            tokio::time::sleep(jitter).await;

            match self.run_for(&identity).await {
                Ok(report) => reports.push(report),
                Err(err) => tracing::warn!("[gateway] automation failed for {}: {}", identity, err),
            }
        }

        Ok(reports)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialRepository;
    use crate::resolver::CandidateTable;
    use crate::store::ManualClock;
    use portal_codec::{CredentialVault, PayloadCipher};
    use serde_json::json;

    fn runner(vault_secret: &str, repository: Arc<MemoryCredentialRepository>) -> AutomationRunner {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
        let http = reqwest::Client::new();
        let credentials = Arc::new(CredentialStore::new(
            CredentialVault::new(vault_secret),
            repository,
            clock.clone(),
        ));
        let upstream = Arc::new(UpstreamClient::new(
            http.clone(),
            "http://127.0.0.1:9/login".to_string(),
            "http://127.0.0.1:9/me".to_string(),
            PayloadCipher::default(),
            "secret".to_string(),
        ));
        let resolver = Arc::new(EndpointResolver::new(http, CandidateTable::new()));
        AutomationRunner::new(credentials, upstream, resolver, clock, false)
    }

    #[tokio::test]
    async fn test_unreadable_credential_disables_automation() {
        let repository = Arc::new(MemoryCredentialRepository::new());
        runner("old-secret", repository.clone())
            .credentials
            .capture("42", "alice", "hunter2")
            .await
            .unwrap();

        let rotated = runner("new-secret", repository);
        assert_eq!(
            rotated.run_for("42").await.unwrap_err(),
            AppError::VaultDecryptionFailed
        );
        assert!(rotated.credentials.enabled_identities().await.unwrap().is_empty());

        // the next attempt sees a disabled record, not another decryption failure
        assert!(matches!(
            rotated.run_for("42").await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_run_all_with_nobody_enrolled() {
        let runner = runner("secret", Arc::new(MemoryCredentialRepository::new()));
        assert!(runner.run_all().await.unwrap().is_empty());
    }

    #[test]
    fn test_count_items() {
        assert_eq!(count_items(&json!([1, 2, 3])), 3);
        assert_eq!(count_items(&json!({"data": [1]})), 1);
        assert_eq!(count_items(&json!({"status": "ok"})), 0);
    }
}
