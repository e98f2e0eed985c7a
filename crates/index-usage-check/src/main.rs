// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, process::ExitCode, sync::Arc};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use index_usage::{build_transport, Config, Monitor};

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("NR_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or(DEFAULT_LOG_LEVEL.to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);
    let env_filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    #[cfg(feature = "fips")]
    if let Err(e) = rustls::crypto::default_fips_provider().install_default() {
        error!("Failed to set up fips provider: {e:?}");
        return ExitCode::FAILURE;
    }

    info!("Startup");

    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on index usage check startup: {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Loaded configuration: {config:?}");

    let transport = match build_transport(&config) {
        Ok(t) => t,
        Err(e) => {
            error!("Error building HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    match Monitor::new(config, transport).run().await {
        Ok(report) => {
            debug!("{report:?}");
            info!("We're done!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Index usage check failed: {e}");
            ExitCode::FAILURE
        }
    }
}
