// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use remote_config_client::config::Config;
use remote_config_client::health::{HealthServer, HostReadiness};
use remote_config_client::status::SubsystemStatus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Running health server bound to an ephemeral loopback port.
pub struct HealthFixture {
    pub addr: SocketAddr,
    pub readiness: HostReadiness,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthFixture {
    pub async fn start(status: Option<SubsystemStatus>) -> Self {
        let readiness = HostReadiness::new();
        let mut server = HealthServer::new(readiness.clone());
        if let Some(status) = status {
            server = server.with_remote_config(status);
        }
        let listener = HealthServer::bind("127.0.0.1:0".parse().expect("loopback address"))
            .await
            .expect("bind health server");
        let addr = listener.local_addr().expect("local addr");
        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();
        let task = tokio::spawn(async move {
            server
                .serve(listener, serve_shutdown)
                .await
                .expect("health server exits cleanly");
        });

        Self {
            addr,
            readiness,
            shutdown,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.task.await.expect("health server task");
    }
}

/// Plain HTTP client for the health endpoints, bypassing any proxy settings.
pub fn health_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("health client")
}

/// Agent configuration with short timings so failures resolve quickly.
pub fn fast_config() -> Config {
    Config {
        site: "datadoghq.com".to_string(),
        hostname: "integration-host".to_string(),
        remote_configuration_request_timeout: Duration::from_secs(2),
        remote_configuration_backoff_base: Duration::from_millis(10),
        remote_configuration_backoff_max: Duration::from_millis(50),
        ..Config::default()
    }
}
