// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Bearer token validation with a short-lived verdict cache.
//!
//! # Lifecycle
//!
//! ```text
//! unknown -> validating -> ValidUser(identity) | Invalid
//! ```
//!
//! A verdict is reused for the configured TTL (30 seconds by default, far
//! below the ~55 minute upstream token lifetime), which bounds how long a
//! revoked token keeps working locally. Expired verdicts are swept only when
//! the cache grows past a threshold; there is no background timer.
//!
//! Concurrent misses on the same token may each probe the upstream. The
//! redundant calls are harmless and no single-flight is attempted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::TokenPair;
use crate::store::{Clock, KeyValueStore};
use crate::upstream::UpstreamError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    ValidUser(String),
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCacheEntry {
    pub verdict: Verdict,
    pub inserted_at: DateTime<Utc>,
}

/// The upstream call used to decide whether a token is live.
///
/// Implementations report completed checks as a [`Verdict`] and return an
/// error only when the check itself could not complete (timeout).
#[async_trait]
pub trait SessionProbe: Send + Sync {
    async fn probe(&self, token: &str) -> Result<Verdict, UpstreamError>;
}

pub struct SessionValidator {
    store: Arc<dyn KeyValueStore<SessionCacheEntry>>,
    probe: Arc<dyn SessionProbe>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
    sweep_threshold: usize,
}

impl SessionValidator {
    pub fn new(
        store: Arc<dyn KeyValueStore<SessionCacheEntry>>,
        probe: Arc<dyn SessionProbe>,
        clock: Arc<dyn Clock>,
        ttl: TimeDelta,
        sweep_threshold: usize,
    ) -> Self {
        Self {
            store,
            probe,
            clock,
            ttl,
            sweep_threshold,
        }
    }

    /// Returns the verdict for `token`, probing the upstream on a cache miss.
    ///
    /// # Errors
    ///
    /// - [`AppError::UpstreamTimeout`] - the probe timed out; nothing is cached
    /// - [`AppError::InternalServerError`] - the cache store failed
    #[tracing::instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<Verdict, AppError> {
        let now = self.clock.now();

        if let Some(entry) = self.store.get(token).await?
            && now - entry.inserted_at < self.ttl
        {
            tracing::trace!("[gateway] session verdict served from cache");
            return Ok(entry.verdict);
        }

        let verdict = match self.probe.probe(token).await? {
            Verdict::ValidUser(identity) if identity.trim().is_empty() => Verdict::Invalid,
            verdict => verdict,
        };

        tracing::debug!(
            "[gateway] probed session, valid: {}",
            matches!(verdict, Verdict::ValidUser(_))
        );

        self.store
            .set(
                token,
                SessionCacheEntry {
                    verdict: verdict.clone(),
                    inserted_at: now,
                },
            )
            .await?;

        if self.store.len().await? > self.sweep_threshold {
            let ttl = self.ttl;
            let removed = self
                .store
                .sweep(&|entry| now - entry.inserted_at < ttl)
                .await?;
            tracing::debug!("[gateway] swept {} expired session verdicts", removed);
        }

        Ok(verdict)
    }

    /// Resolves a caller's token pair to the identity it belongs to.
    ///
    /// Both halves must be present. An invalid token is
    /// [`AppError::Unauthenticated`]; a valid token presented with someone
    /// else's identity is [`AppError::Forbidden`].
    pub async fn authenticate(&self, pair: &TokenPair) -> Result<String, AppError> {
        if pair.token.trim().is_empty() || pair.identity.trim().is_empty() {
            return Err(AppError::Unauthenticated);
        }

        match self.validate(&pair.token).await? {
            Verdict::ValidUser(identity) if identity == pair.identity => Ok(identity),
            Verdict::ValidUser(_) => {
                tracing::warn!("[gateway] token presented with a mismatched identity");
                Err(AppError::Forbidden)
            }
            Verdict::Invalid => Err(AppError::Unauthenticated),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts probes; tokens starting with "valid-" belong to the rest of the string.
    #[derive(Default)]
    struct FakeProbe {
        calls: AtomicUsize,
        timeout: bool,
    }

    #[async_trait]
    impl SessionProbe for FakeProbe {
        async fn probe(&self, token: &str) -> Result<Verdict, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.timeout {
                return Err(UpstreamError::Timeout);
            }
            Ok(match token.strip_prefix("valid-") {
                Some(identity) => Verdict::ValidUser(identity.to_string()),
                None => Verdict::Invalid,
            })
        }
    }

    fn validator(
        probe: Arc<FakeProbe>,
        sweep_threshold: usize,
    ) -> (SessionValidator, Arc<ManualClock>, Arc<MemoryStore<SessionCacheEntry>>) {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new());
        let validator = SessionValidator::new(
            store.clone(),
            probe,
            clock.clone(),
            TimeDelta::seconds(30),
            sweep_threshold,
        );
        (validator, clock, store)
    }

    #[tokio::test]
    async fn test_verdict_is_cached_within_ttl() {
        let probe = Arc::new(FakeProbe::default());
        let (validator, clock, _) = validator(probe.clone(), 1024);

        let verdict = validator.validate("valid-42").await.unwrap();
        assert_eq!(verdict, Verdict::ValidUser("42".to_string()));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        clock.advance(TimeDelta::seconds(29));
        validator.validate("valid-42").await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        clock.advance(TimeDelta::seconds(2));
        validator.validate("valid-42").await.unwrap();
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_verdict_is_cached() {
        let probe = Arc::new(FakeProbe::default());
        let (validator, _, _) = validator(probe.clone(), 1024);

        assert_eq!(validator.validate("revoked").await.unwrap(), Verdict::Invalid);
        assert_eq!(validator.validate("revoked").await.unwrap(), Verdict::Invalid);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_identity_is_invalid() {
        let probe = Arc::new(FakeProbe::default());
        let (validator, _, _) = validator(probe, 1024);
        assert_eq!(validator.validate("valid-").await.unwrap(), Verdict::Invalid);
    }

    #[tokio::test]
    async fn test_timeout_is_not_cached() {
        let probe = Arc::new(FakeProbe {
            timeout: true,
            ..FakeProbe::default()
        });
        let (validator, _, store) = validator(probe.clone(), 1024);

        assert_eq!(validator.validate("valid-42").await, Err(AppError::UpstreamTimeout));
        assert_eq!(store.len().await.unwrap(), 0);

        assert_eq!(validator.validate("valid-42").await, Err(AppError::UpstreamTimeout));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sweep_runs_above_threshold() {
        let probe = Arc::new(FakeProbe::default());
        let (validator, clock, store) = validator(probe, 2);

        validator.validate("valid-1").await.unwrap();
        validator.validate("valid-2").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);

        clock.advance(TimeDelta::seconds(31));
        validator.validate("valid-3").await.unwrap();
        // the two stale verdicts went, the fresh one stays
        assert_eq!(store.len().await.unwrap(), 1);
        assert!(store.get("valid-3").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let probe = Arc::new(FakeProbe::default());
        let (validator, _, _) = validator(probe, 1024);

        let pair = TokenPair::new("valid-42", "42");
        assert_eq!(validator.authenticate(&pair).await.unwrap(), "42");

        let pair = TokenPair::new("valid-42", "43");
        assert_eq!(validator.authenticate(&pair).await, Err(AppError::Forbidden));

        let pair = TokenPair::new("revoked", "42");
        assert_eq!(validator.authenticate(&pair).await, Err(AppError::Unauthenticated));

        let pair = TokenPair::new("valid-42", "");
        assert_eq!(validator.authenticate(&pair).await, Err(AppError::Unauthenticated));
    }
}
