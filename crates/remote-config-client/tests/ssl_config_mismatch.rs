// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Host started with `skip_ssl_validation` but no remote configuration
//! override, or against a service that never answers: the subsystem disables
//! itself and the host stays ready.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{fast_config, health_client, HealthFixture};
use remote_config_client::config::Config;
use remote_config_client::diagnostics::{CLIENT_DISABLED, POLICY_MISMATCH, SERVICE_CREATE_FAILED};
use remote_config_client::supervisor::{DisableReason, HostHealth, SubsystemHealth, Supervisor};
use remote_config_client::test_support::{ScriptedConnector, ScriptedOutcome};
use remote_config_client::SessionState;
use serde_json::Value;
use tokio::time::Instant;
use tracing_test::traced_test;

/// How long `/ready` is polled after the subsystem has been disabled.
const READINESS_WINDOW: Duration = Duration::from_millis(600);
const READINESS_INTERVAL: Duration = Duration::from_millis(50);

/// Polls `/ready` for [`READINESS_WINDOW`], expecting `200` every time.
async fn assert_ready_throughout(client: &reqwest::Client, health: &HealthFixture) {
    let deadline = Instant::now() + READINESS_WINDOW;
    let mut checks = 0;
    while Instant::now() < deadline {
        let response = client
            .get(health.url("/ready"))
            .send()
            .await
            .expect("readiness request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        checks += 1;
        tokio::time::sleep(READINESS_INTERVAL).await;
    }
    assert!(checks > 1);
}

async fn remote_config_status(client: &reqwest::Client, health: &HealthFixture) -> Value {
    client
        .get(health.url("/remote-config/status"))
        .send()
        .await
        .expect("status request")
        .json()
        .await
        .expect("status body")
}

/// The policy mismatch disables remote configuration before any connection,
/// in diagnostic order, while `/ready` keeps answering `200`.
#[tokio::test]
#[traced_test]
async fn skip_ssl_without_override_disables_only_remote_config() {
    let config = Config {
        skip_ssl_validation: true,
        ..fast_config()
    };
    let connector = ScriptedConnector::always(ScriptedOutcome::snapshot("rc-ref", "v1"));

    let handle = Supervisor::new(config.supervisor_config(), Arc::new(connector.clone()))
        .start(config.security_policy());
    let health = HealthFixture::start(Some(handle.status())).await;
    health.readiness.mark_ready();

    let record = tokio::time::timeout(Duration::from_secs(5), handle.wait_until_disabled())
        .await
        .expect("subsystem disabled promptly");
    assert_eq!(record.subsystem_health(), SubsystemHealth::Disabled);
    assert_eq!(record.host_health(), HostHealth::Healthy);
    assert_eq!(record.disabled_reason(), Some(DisableReason::PolicyRejected));
    assert_eq!(handle.session().state, SessionState::PolicyRejected);
    assert_eq!(connector.connections(), 0, "no transport may be built");
    assert_eq!(connector.polls(), 0);

    let client = health_client();
    assert_ready_throughout(&client, &health).await;

    let status = remote_config_status(&client, &health).await;
    assert_eq!(status["subsystemHealth"], "disabled");
    assert_eq!(status["hostHealth"], "healthy");
    assert_eq!(status["disabledReason"], "policy_rejected");
    assert_eq!(status["lastError"], "policy_mismatch");

    logs_assert(|lines: &[&str]| {
        let position = |needle: &str| {
            lines
                .iter()
                .position(|line| line.contains(needle))
                .ok_or_else(|| format!("missing log line {needle:?}"))
        };
        let mismatch = position(POLICY_MISMATCH)?;
        let disabled = position(CLIENT_DISABLED)?;
        let create_failed = position(SERVICE_CREATE_FAILED)?;
        if !(mismatch < disabled && disabled < create_failed) {
            return Err(format!(
                "unexpected order: mismatch={mismatch} disabled={disabled} create_failed={create_failed}"
            ));
        }
        let disabling = lines
            .iter()
            .filter(|line| line.contains(CLIENT_DISABLED))
            .count();
        if disabling != 1 {
            return Err(format!("expected one disabling line, got {disabling}"));
        }
        Ok(())
    });

    handle.stop().await;
    health.shutdown().await;
}

/// A declared override turns the same settings into a working session.
#[tokio::test]
#[traced_test]
async fn declared_override_lets_the_client_connect() {
    let config = Config {
        skip_ssl_validation: true,
        remote_configuration_no_tls_validation: Some(true),
        ..fast_config()
    };
    let connector = ScriptedConnector::always(ScriptedOutcome::snapshot("rc-ref", "v1"));

    let handle = Supervisor::new(config.supervisor_config(), Arc::new(connector.clone()))
        .start(config.security_policy());
    let mut session = handle.status().session_receiver();
    tokio::time::timeout(
        Duration::from_secs(5),
        session.wait_for(|s| s.state == SessionState::Connected),
    )
    .await
    .expect("connected in time")
    .expect("session publisher alive");

    assert_eq!(handle.record().subsystem_health(), SubsystemHealth::Healthy);
    assert_eq!(connector.connections(), 1);
    assert!(!logs_contain(POLICY_MISMATCH));
    assert!(!logs_contain(CLIENT_DISABLED));

    handle.stop().await;
}

/// Giving up on an unreachable service disables the subsystem, not the host.
#[tokio::test]
#[traced_test]
async fn exhausted_retries_keep_the_host_ready() {
    let config = Config {
        remote_configuration_max_retries: 1,
        ..fast_config()
    };
    let connector = ScriptedConnector::always(ScriptedOutcome::refused());

    let handle = Supervisor::new(config.supervisor_config(), Arc::new(connector.clone()))
        .start(config.security_policy());
    let health = HealthFixture::start(Some(handle.status())).await;
    health.readiness.mark_ready();

    let record = tokio::time::timeout(Duration::from_secs(5), handle.wait_until_disabled())
        .await
        .expect("subsystem disabled promptly");
    assert_eq!(record.subsystem_health(), SubsystemHealth::Disabled);
    assert_eq!(record.host_health(), HostHealth::Healthy);
    assert_eq!(record.disabled_reason(), Some(DisableReason::RetriesExhausted));
    assert_eq!(handle.session().state, SessionState::Disabled);
    assert_eq!(connector.polls(), 2);

    let client = health_client();
    assert_ready_throughout(&client, &health).await;

    let status = remote_config_status(&client, &health).await;
    assert_eq!(status["subsystemHealth"], "disabled");
    assert_eq!(status["hostHealth"], "healthy");
    assert_eq!(status["disabledReason"], "retries_exhausted");
    assert_eq!(status["lastError"], "connect");
    assert_eq!(status["retryCount"], 2);

    assert!(logs_contain(CLIENT_DISABLED));
    assert!(!logs_contain(POLICY_MISMATCH));
    assert!(!logs_contain(SERVICE_CREATE_FAILED));

    handle.stop().await;
    health.shutdown().await;
}

/// `/ready` follows the host flag when remote configuration is off.
#[tokio::test]
async fn readiness_is_independent_of_remote_config() {
    let health = HealthFixture::start(None).await;
    let client = health_client();

    let response = client
        .get(health.url("/ready"))
        .send()
        .await
        .expect("readiness request");
    assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

    health.readiness.mark_ready();
    let response = client
        .get(health.url("/ready"))
        .send()
        .await
        .expect("readiness request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let status = remote_config_status(&client, &health).await;
    assert_eq!(status["enabled"], false);

    let response = client
        .get(health.url("/metrics"))
        .send()
        .await
        .expect("unknown path");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    health.shutdown().await;
}
