// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use remote_config_client::{
    config::{platform::PlatformDefaults, Config},
    health::{HealthServer, HostReadiness},
    supervisor::Supervisor,
};

const AGENT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

#[tokio::main]
pub async fn main() {
    let defaults = PlatformDefaults::resolve();
    let config = Config::resolve(&defaults);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(config.log_level.env_filter_directives())
                .expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!(
        "Logging subsystem enabled, configuration loaded from {}",
        defaults.config_dir.display()
    );

    let readiness = HostReadiness::new();

    let remote_config = if config.remote_configuration_enabled {
        let supervisor = Supervisor::new(
            config.supervisor_config(),
            Arc::new(config.http_connector()),
        );
        Some(supervisor.start(config.security_policy()))
    } else {
        info!("remote configuration is turned off in the agent configuration");
        None
    };

    let mut health_server = HealthServer::new(readiness.clone());
    if let Some(handle) = &remote_config {
        health_server = health_server.with_remote_config(handle.status());
    }

    let shutdown = CancellationToken::new();
    let addr = SocketAddr::new(AGENT_HOST, config.health_port);
    let server = match HealthServer::bind(addr).await {
        Ok(listener) => {
            let shutdown = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = health_server.serve(listener, shutdown).await {
                    error!("health server stopped: {e}");
                }
            }))
        }
        Err(e) => {
            error!("{e}");
            None
        }
    };

    readiness.mark_ready();
    info!("remote configuration agent ready");

    wait_for_shutdown_signal().await;
    info!("shutting down");

    readiness.mark_not_ready();
    if let Some(handle) = remote_config {
        handle.stop().await;
    }
    shutdown.cancel();
    if let Some(server) = server {
        if let Err(e) = server.await {
            error!("health server task failed: {e}");
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!("unable to listen for SIGTERM: {e}");
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("unable to listen for ctrl-c: {e}");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("unable to listen for ctrl-c: {e}");
            }
        }
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("unable to listen for ctrl-c: {e}");
    }
}
