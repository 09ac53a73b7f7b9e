// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::serve::Serve;
use portal_codec::{CredentialVault, PayloadCipher};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::automation::AutomationRunner;
use crate::configuration::GatewayOptions;
use crate::constants::{MAX_BODY_SIZE, REQUEST_TIMEOUT};
use crate::credentials::{CredentialStore, MemoryCredentialRepository};
use crate::errors::AppError;
use crate::rate_limit::{RateLimitWindow, RateLimiter};
use crate::resolver::{CandidateTable, EndpointResolver};
use crate::routes;
use crate::session::{SessionCacheEntry, SessionValidator};
use crate::store::{Clock, MemoryStore, SystemClock};
use crate::upstream::{UpstreamClient, build_http_client};

pub struct AppState {
    pub options: GatewayOptions,
    pub rate_limiter: RateLimiter,
    pub sessions: SessionValidator,
    pub upstream: Arc<UpstreamClient>,
    pub resolver: Arc<EndpointResolver>,
    pub credentials: Arc<CredentialStore>,
    pub automation: Arc<AutomationRunner>,
}

impl AppState {
    /// Wires every component with in-process stores and the system clock.
    pub fn build(options: GatewayOptions) -> Result<Self, AppError> {
        options.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let http = build_http_client(options.upstream_timeout())?;

        let upstream = Arc::new(UpstreamClient::new(
            http.clone(),
            options.auth_url.clone(),
            options.probe_url.clone(),
            PayloadCipher::new(options.cipher_digest, options.cipher_iterations),
            options.cipher_secret.clone(),
        ));

        let resolver = Arc::new(
            EndpointResolver::new(
                http,
                CandidateTable::portal_defaults(&options.upstream_hosts()),
            )
            .with_budget(options.resolve_budget()),
        );

        let sessions = SessionValidator::new(
            Arc::new(MemoryStore::<SessionCacheEntry>::new()),
            upstream.clone(),
            clock.clone(),
            options.session_ttl(),
            options.session_sweep_threshold,
        );

        let rate_limiter = RateLimiter::new(
            Arc::new(MemoryStore::<RateLimitWindow>::new()),
            clock.clone(),
            options.rate_limit_policies(),
        );

        let credentials = Arc::new(CredentialStore::new(
            CredentialVault::new(&options.vault_secret),
            Arc::new(MemoryCredentialRepository::new()),
            clock.clone(),
        ));

        let automation = Arc::new(AutomationRunner::new(
            credentials.clone(),
            upstream.clone(),
            resolver.clone(),
            clock,
            options.diagnostics,
        ));

        Ok(Self {
            options,
            rate_limiter,
            sessions,
            upstream,
            resolver,
            credentials,
            automation,
        })
    }
}

/// Builds the router with the production middleware stack.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/auth/login", post(routes::login))
        .route("/grades", get(routes::grades))
        .route("/evaluations", get(routes::evaluations))
        .route("/evaluations/submit", post(routes::submit_evaluation))
        .route("/automation", delete(routes::disable_automation))
        .route("/automation/run", post(routes::run_automation))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct Application {
    port: u16,
    server: Serve<TcpListener, Router, Router>,
}

impl Application {
    pub async fn build(state: Arc<AppState>) -> Result<Self, std::io::Error> {
        let address = format!("{}:{}", state.options.host, state.options.port);
        let listener = TcpListener::bind(address).await?;
        let host = state.options.host.clone();
        let server = axum::serve(listener, create_router(state));
        let port = server.local_addr()?.port();

        tracing::info!("[gateway] listening at http://{}:{}", host, port);

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}
