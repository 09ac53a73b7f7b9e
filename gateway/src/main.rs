// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use clap::Parser;
use portal_gateway::application::{AppState, Application};
use portal_gateway::configuration::GatewayOptions;
use std::{io::Error, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    println!("[gateway] init");

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        // this needs to be set to remove duplicated information in the log.
        .with_current_span(false)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .init();

    // get configuration options from environment variables
    let options = GatewayOptions::parse();

    tracing::info!("[gateway] {:?}", &options);

    let state = Arc::new(AppState::build(options).map_err(|e| {
        tracing::error!("[gateway] unable to start: {}", e);
        Error::other(e.to_string())
    })?);

    if !state.options.skip_automation {
        let interval = state.options.automation_interval();
        tracing::info!("[gateway] running automation every {:#?}", interval);
        let automation = state.automation.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match automation.run_all().await {
                    Ok(reports) => tracing::debug!(
                        "[gateway] automation pass finished, {} succeeded",
                        reports.len()
                    ),
                    Err(e) => tracing::error!("[gateway] automation pass failed: {}", e),
                }
            }
        });
    } else {
        tracing::warn!("[gateway] skipping scheduled automation");
    }

    let application = Application::build(state).await?;

    application.run_until_stopped().await
}
