// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Fixed-window rate limiting for caller-facing entry points.
//!
//! Windows are keyed by `(namespace, identity)`. Checking and consuming a
//! slot are separate calls: a handler first asks [`RateLimiter::check`],
//! runs whatever cheap validation it needs, and only calls
//! [`RateLimiter::increment`] once it commits to the limited action.
//!
//! A fixed window admits up to twice the configured rate across a window
//! boundary. That is acceptable for abuse dampening.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::RATE_LIMIT_SWEEP_THRESHOLD;
use crate::store::{Clock, KeyValueStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitNamespace {
    Login,
    Submit,
    Automation,
}

impl RateLimitNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitNamespace::Login => "login",
            RateLimitNamespace::Submit => "submit",
            RateLimitNamespace::Automation => "automation",
        }
    }
}

impl fmt::Display for RateLimitNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window: TimeDelta,
}

impl RateLimitPolicy {
    pub fn new(max_attempts: u32, window: TimeDelta) -> Self {
        Self {
            max_attempts,
            window,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicies {
    pub login: RateLimitPolicy,
    pub submit: RateLimitPolicy,
    pub automation: RateLimitPolicy,
}

impl RateLimitPolicies {
    pub fn get(&self, namespace: RateLimitNamespace) -> RateLimitPolicy {
        match namespace {
            RateLimitNamespace::Login => self.login,
            RateLimitNamespace::Submit => self.submit,
            RateLimitNamespace::Automation => self.automation,
        }
    }
}

/// Counter state of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitDecision {
    fn new(count: u32, reset_at: DateTime<Utc>, now: DateTime<Utc>, policy: RateLimitPolicy) -> Self {
        let allowed = count < policy.max_attempts;
        let retry_after_ms = (!allowed).then(|| {
            let millis = (reset_at - now).num_milliseconds().max(1);
            u64::try_from(millis).unwrap_or(1)
        });

        Self {
            allowed,
            remaining: policy.max_attempts.saturating_sub(count),
            reset_at,
            retry_after_ms,
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn KeyValueStore<RateLimitWindow>>,
    clock: Arc<dyn Clock>,
    policies: RateLimitPolicies,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn KeyValueStore<RateLimitWindow>>,
        clock: Arc<dyn Clock>,
        policies: RateLimitPolicies,
    ) -> Self {
        Self {
            store,
            clock,
            policies,
        }
    }

    fn key(namespace: RateLimitNamespace, identity: &str) -> String {
        format!("{}:{}", namespace, identity)
    }

    fn window_end(now: DateTime<Utc>, policy: RateLimitPolicy) -> DateTime<Utc> {
        now.checked_add_signed(policy.window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Reports whether one more attempt would be allowed, without consuming it.
    #[tracing::instrument(skip(self))]
    pub async fn check(
        &self,
        namespace: RateLimitNamespace,
        identity: &str,
    ) -> anyhow::Result<RateLimitDecision> {
        let now = self.clock.now();
        let policy = self.policies.get(namespace);
        let window = self.store.get(&Self::key(namespace, identity)).await?;

        let decision = match window {
            Some(window) if now <= window.reset_at => {
                RateLimitDecision::new(window.count, window.reset_at, now, policy)
            }
            // missing or expired windows count as fresh; nothing is written here
            _ => RateLimitDecision::new(0, Self::window_end(now, policy), now, policy),
        };

        if !decision.allowed {
            tracing::debug!("[gateway] {} rate limit reached", namespace);
        }

        Ok(decision)
    }

    /// Consumes one attempt, opening a new window if the old one expired.
    #[tracing::instrument(skip(self))]
    pub async fn increment(
        &self,
        namespace: RateLimitNamespace,
        identity: &str,
    ) -> anyhow::Result<RateLimitWindow> {
        let now = self.clock.now();
        let policy = self.policies.get(namespace);

        let window = self
            .store
            .update(&Self::key(namespace, identity), &|current| match current {
                Some(window) if now <= window.reset_at => RateLimitWindow {
                    count: window.count.saturating_add(1),
                    reset_at: window.reset_at,
                },
                _ => RateLimitWindow {
                    count: 1,
                    reset_at: Self::window_end(now, policy),
                },
            })
            .await?;

        if self.store.len().await? > RATE_LIMIT_SWEEP_THRESHOLD {
            let removed = self.store.sweep(&|window| now <= window.reset_at).await?;
            tracing::debug!("[gateway] swept {} expired rate limit windows", removed);
        }

        Ok(window)
    }

    /// Clears the window, e.g. after a successful login.
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self, namespace: RateLimitNamespace, identity: &str) -> anyhow::Result<()> {
        self.store.delete(&Self::key(namespace, identity)).await
    }
}
