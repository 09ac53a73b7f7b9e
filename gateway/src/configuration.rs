// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

use chrono::TimeDelta;
use clap::{ArgAction, Parser};
use portal_codec::KdfDigest;
use portal_codec::constants::DEFAULT_KDF_ITERATIONS;

use crate::constants::{
    AUTOMATION_INTERVAL_SECS, DEFAULT_UPSTREAM_TIMEOUT_MS, MAX_CONFIG_SECS, REQUEST_TIMEOUT,
    RESPONSE_MARGIN, SESSION_SWEEP_THRESHOLD, SESSION_TTL_SECS,
};
use crate::errors::AppError;
use crate::rate_limit::{RateLimitPolicies, RateLimitPolicy};
use crate::resolver::UpstreamHosts;

#[derive(Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct GatewayOptions {
    #[arg(long, default_value = "127.0.0.1", env("PORTAL_HTTP_HOST"))]
    pub host: String,
    #[arg(long, default_value = "8080", env("PORTAL_HTTP_PORT"))]
    pub port: u16,

    #[arg(long, default_value = "https://portal.example.edu/api/v1/auth/login", env("PORTAL_AUTH_URL"))]
    pub auth_url: String,
    #[arg(long, default_value = "https://portal.example.edu/api/v2/users/me", env("PORTAL_PROBE_URL"))]
    pub probe_url: String,
    #[arg(long, default_value = "https://portal.example.edu/api", env("PORTAL_PRIMARY_HOST"))]
    pub primary_host: String,
    #[arg(long, default_value = "https://portal2.example.edu/api", env("PORTAL_SECONDARY_HOST"))]
    pub secondary_host: String,
    #[arg(long, default_value = "https://legacy.example.edu/services", env("PORTAL_LEGACY_HOST"))]
    pub legacy_host: String,
    #[arg(long, default_value = "8000", env("PORTAL_UPSTREAM_TIMEOUT_MS"))]
    pub upstream_timeout_ms: u64,

    #[arg(long, default_value = "", env("PORTAL_CIPHER_SECRET"), hide_env_values = true)]
    pub cipher_secret: String,
    #[arg(long, default_value = "sha1", env("PORTAL_CIPHER_DIGEST"))]
    pub cipher_digest: KdfDigest,
    #[arg(long, default_value = "1000", env("PORTAL_CIPHER_ITERATIONS"))]
    pub cipher_iterations: NonZeroU32,
    #[arg(long, default_value = "", env("PORTAL_VAULT_SECRET"), hide_env_values = true)]
    pub vault_secret: String,

    #[arg(long, default_value = "30", env("PORTAL_SESSION_TTL_SECS"))]
    pub session_ttl_secs: u64,
    #[arg(long, default_value = "1024", env("PORTAL_SESSION_SWEEP_THRESHOLD"))]
    pub session_sweep_threshold: usize,

    #[arg(long, default_value = "5", env("PORTAL_LOGIN_MAX_ATTEMPTS"))]
    pub login_max_attempts: u32,
    #[arg(long, default_value = "900", env("PORTAL_LOGIN_WINDOW_SECS"))]
    pub login_window_secs: u64,
    #[arg(long, default_value = "10", env("PORTAL_SUBMIT_MAX_ATTEMPTS"))]
    pub submit_max_attempts: u32,
    #[arg(long, default_value = "60", env("PORTAL_SUBMIT_WINDOW_SECS"))]
    pub submit_window_secs: u64,
    #[arg(long, default_value = "3", env("PORTAL_AUTOMATION_MAX_ATTEMPTS"))]
    pub automation_max_attempts: u32,
    #[arg(long, default_value = "3600", env("PORTAL_AUTOMATION_WINDOW_SECS"))]
    pub automation_window_secs: u64,

    /// Attach per-candidate upstream failures to error bodies. Never enable in production.
    #[arg(long, default_value = "false", env("PORTAL_DIAGNOSTICS"), action = ArgAction::SetTrue)]
    pub diagnostics: bool,
    #[arg(long, default_value = "false", env("PORTAL_SKIP_AUTOMATION"), action = ArgAction::SetTrue)]
    pub skip_automation: bool,
    #[arg(long, default_value = "21600", env("PORTAL_AUTOMATION_INTERVAL_SECS"))]
    pub automation_interval_secs: u64,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        GatewayOptions {
            host: "127.0.0.1".to_string(),
            port: 8080,
            auth_url: "http://127.0.0.1:9000/api/v1/auth/login".to_string(),
            probe_url: "http://127.0.0.1:9000/api/v2/users/me".to_string(),
            primary_host: "http://127.0.0.1:9000/api".to_string(),
            secondary_host: "http://127.0.0.1:9000/api2".to_string(),
            legacy_host: "http://127.0.0.1:9000/services".to_string(),
            upstream_timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
            cipher_secret: "mySecretKeyHere".to_string(),
            cipher_digest: KdfDigest::default(),
            cipher_iterations: DEFAULT_KDF_ITERATIONS,
            vault_secret: "local-vault-secret".to_string(),
            session_ttl_secs: SESSION_TTL_SECS,
            session_sweep_threshold: SESSION_SWEEP_THRESHOLD,
            login_max_attempts: 5,
            login_window_secs: 900,
            submit_max_attempts: 10,
            submit_window_secs: 60,
            automation_max_attempts: 3,
            automation_window_secs: 3600,
            diagnostics: false,
            skip_automation: true,
            automation_interval_secs: AUTOMATION_INTERVAL_SECS,
        }
    }
}

// Custom Debug implementation to prevent accidental logging of the shared secrets
impl fmt::Debug for GatewayOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("auth_url", &self.auth_url)
            .field("probe_url", &self.probe_url)
            .field("primary_host", &self.primary_host)
            .field("secondary_host", &self.secondary_host)
            .field("legacy_host", &self.legacy_host)
            .field("upstream_timeout_ms", &self.upstream_timeout_ms)
            .field("cipher_secret", &"[REDACTED]")
            .field("cipher_digest", &self.cipher_digest)
            .field("cipher_iterations", &self.cipher_iterations)
            .field("vault_secret", &"[REDACTED]")
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("session_sweep_threshold", &self.session_sweep_threshold)
            .field("rate_limits", &self.rate_limit_policies())
            .field("diagnostics", &self.diagnostics)
            .field("skip_automation", &self.skip_automation)
            .field("automation_interval_secs", &self.automation_interval_secs)
            .finish()
    }
}

impl GatewayOptions {
    /// Rejects configurations the gateway cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.cipher_secret.is_empty() {
            return Err(AppError::ConfigError("cipher secret is required".to_string()));
        }
        if self.vault_secret.is_empty() {
            return Err(AppError::ConfigError("vault secret is required".to_string()));
        }
        if self.upstream_timeout_ms == 0 {
            return Err(AppError::ConfigError(
                "upstream timeout must be greater than zero".to_string(),
            ));
        }
        // a probe or login call plus at least one full candidate call must fit in a request
        if self.resolve_budget() < self.upstream_timeout() {
            return Err(AppError::ConfigError(format!(
                "upstream timeout must be at most {} ms",
                REQUEST_TIMEOUT.saturating_sub(RESPONSE_MARGIN).as_millis() / 2
            )));
        }

        let durations = [
            ("session-ttl-secs", self.session_ttl_secs),
            ("login-window-secs", self.login_window_secs),
            ("submit-window-secs", self.submit_window_secs),
            ("automation-window-secs", self.automation_window_secs),
            ("automation-interval-secs", self.automation_interval_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs > MAX_CONFIG_SECS) {
            return Err(AppError::ConfigError(format!(
                "{name} must be at most {MAX_CONFIG_SECS}"
            )));
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    /// Time the resolver may spend on one capability once the session probe
    /// (or login) has used its own upstream timeout.
    pub fn resolve_budget(&self) -> Duration {
        REQUEST_TIMEOUT
            .saturating_sub(RESPONSE_MARGIN)
            .saturating_sub(self.upstream_timeout())
    }

    pub fn session_ttl(&self) -> TimeDelta {
        seconds(self.session_ttl_secs)
    }

    pub fn upstream_hosts(&self) -> UpstreamHosts {
        UpstreamHosts {
            primary: self.primary_host.clone(),
            secondary: self.secondary_host.clone(),
            legacy: self.legacy_host.clone(),
        }
    }

    pub fn automation_interval(&self) -> Duration {
        Duration::from_secs(self.automation_interval_secs.min(MAX_CONFIG_SECS))
    }

    pub fn rate_limit_policies(&self) -> RateLimitPolicies {
        RateLimitPolicies {
            login: RateLimitPolicy::new(self.login_max_attempts, seconds(self.login_window_secs)),
            submit: RateLimitPolicy::new(self.submit_max_attempts, seconds(self.submit_window_secs)),
            automation: RateLimitPolicy::new(
                self.automation_max_attempts,
                seconds(self.automation_window_secs),
            ),
        }
    }
}

/// Converts configured seconds, clamped to [`MAX_CONFIG_SECS`] so the result
/// can be added to any realistic timestamp.
fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs.min(MAX_CONFIG_SECS))
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secrets() {
        let options = GatewayOptions::default();
        let debug = format!("{options:?}");
        assert!(!debug.contains("mySecretKeyHere"));
        assert!(!debug.contains("local-vault-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_validate_requires_secrets() {
        let options = GatewayOptions {
            cipher_secret: String::new(),
            ..GatewayOptions::default()
        };
        assert!(matches!(options.validate(), Err(AppError::ConfigError(_))));

        let options = GatewayOptions {
            vault_secret: String::new(),
            ..GatewayOptions::default()
        };
        assert!(matches!(options.validate(), Err(AppError::ConfigError(_))));

        assert!(GatewayOptions::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        let options = GatewayOptions::parse_from([
            "portal-gateway",
            "--cipher-secret",
            "s",
            "--vault-secret",
            "v",
            "--session-ttl-secs",
            "10000000000000000",
        ]);
        assert!(matches!(options.validate(), Err(AppError::ConfigError(_))));
        // accessors stay total even when validation is skipped
        assert_eq!(options.session_ttl(), TimeDelta::seconds(MAX_CONFIG_SECS as i64));

        let options = GatewayOptions {
            login_window_secs: u64::MAX,
            ..GatewayOptions::default()
        };
        assert!(matches!(options.validate(), Err(AppError::ConfigError(_))));
        let _ = options.rate_limit_policies();
    }

    #[test]
    fn test_resolve_budget_leaves_room_for_session_check() {
        let options = GatewayOptions::default();
        assert_eq!(options.resolve_budget(), Duration::from_secs(20));
        assert!(options.upstream_timeout() + options.resolve_budget() < REQUEST_TIMEOUT);

        let options = GatewayOptions {
            upstream_timeout_ms: 20_000,
            ..GatewayOptions::default()
        };
        assert!(matches!(options.validate(), Err(AppError::ConfigError(_))));

        let options = GatewayOptions {
            upstream_timeout_ms: 14_000,
            ..GatewayOptions::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_parse_from_args() {
        let options = GatewayOptions::parse_from([
            "portal-gateway",
            "--port",
            "9090",
            "--cipher-secret",
            "s",
            "--vault-secret",
            "v",
            "--cipher-digest",
            "sha256",
            "--diagnostics",
        ]);
        assert_eq!(options.port, 9090);
        assert_eq!(options.cipher_digest, KdfDigest::Sha256);
        assert!(options.diagnostics);
        assert!(!options.skip_automation);
        assert_eq!(options.session_ttl(), TimeDelta::seconds(30));
    }
}
