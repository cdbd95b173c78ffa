// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle owner of the remote configuration client inside a host process.
//!
//! Every client failure ends in [`SubsystemHealth::Disabled`]. Nothing the
//! client does is propagated to the host: [`Supervisor::start`] cannot fail,
//! and the host health recorded next to the subsystem health has a single
//! possible value.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::client::{ClientExit, ClientSession, ClientSettings, RemoteConfigClient, SessionState};
use crate::diagnostics;
use crate::endpoint::EndpointConnector;
use crate::error::RemoteConfigError;
use crate::policy::SecurityPolicy;
use crate::retry::RetryPolicy;
use crate::status::SubsystemStatus;

/// Time given to the client to wind down before its task is aborted.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsystemHealth {
    Healthy,
    Disabled,
}

/// Health of the host process as seen by this subsystem. The remote
/// configuration subsystem has no way to report anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostHealth {
    Healthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisableReason {
    PolicyRejected,
    RetriesExhausted,
    ConstructionFailed,
    Stopped,
    ClientAborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorRecord {
    subsystem_health: SubsystemHealth,
    host_health: HostHealth,
    disabled_reason: Option<DisableReason>,
}

impl SupervisorRecord {
    pub(crate) fn healthy() -> Self {
        Self {
            subsystem_health: SubsystemHealth::Healthy,
            host_health: HostHealth::Healthy,
            disabled_reason: None,
        }
    }

    pub(crate) fn disabled(reason: DisableReason) -> Self {
        Self {
            subsystem_health: SubsystemHealth::Disabled,
            host_health: HostHealth::Healthy,
            disabled_reason: Some(reason),
        }
    }

    pub fn subsystem_health(&self) -> SubsystemHealth {
        self.subsystem_health
    }

    pub fn host_health(&self) -> HostHealth {
        self.host_health
    }

    pub fn disabled_reason(&self) -> Option<DisableReason> {
        self.disabled_reason
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub client: ClientSettings,
    /// Retry ceiling and backoff applied while the service is unreachable.
    pub retry: RetryPolicy,
    pub stop_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            client: ClientSettings::default(),
            retry: RetryPolicy::default(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

pub struct Supervisor {
    config: SupervisorConfig,
    connector: Arc<dyn EndpointConnector>,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, connector: Arc<dyn EndpointConnector>) -> Self {
        Self { config, connector }
    }

    /// Builds the client and runs it in the background.
    ///
    /// Must be called from within a tokio runtime; without one the subsystem
    /// is recorded as disabled. The spawned tasks inherit the caller's span.
    pub fn start(self, policy: SecurityPolicy) -> SupervisorHandle {
        let Supervisor { config, connector } = self;
        let shutdown = CancellationToken::new();
        let (record_tx, record_rx) = watch::channel(SupervisorRecord::healthy());
        let record_tx = Arc::new(record_tx);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                let err = RemoteConfigError::Construction(format!("no async runtime available: {err}"));
                return SupervisorHandle::failed(&config, err, shutdown, record_tx, record_rx);
            }
        };

        let client = match RemoteConfigClient::new(config.client.clone(), &policy, connector) {
            Ok(client) => client,
            Err(err) => {
                return SupervisorHandle::failed(&config, err, shutdown, record_tx, record_rx);
            }
        };

        info!(
            endpoint = %client.session().endpoint,
            outcome = ?client.decision().outcome,
            max_retries = config.retry.max_retries,
            "starting remote configuration client"
        );
        let session_rx = client.subscribe();
        let task = runtime.spawn(
            supervise(client, config.retry, shutdown.clone(), Arc::clone(&record_tx))
                .in_current_span(),
        );

        SupervisorHandle {
            shutdown,
            task: Some(task),
            record_tx,
            status: SubsystemStatus::new(record_rx, session_rx),
            stop_timeout: config.stop_timeout,
        }
    }
}

async fn supervise(
    client: RemoteConfigClient,
    retry: RetryPolicy,
    shutdown: CancellationToken,
    record_tx: Arc<watch::Sender<SupervisorRecord>>,
) {
    // A separate task so a panic inside the client surfaces as a JoinError here.
    let run = tokio::spawn(client.run(retry, shutdown).in_current_span());

    let reason = match run.await {
        Ok(ClientExit::PolicyRejected { reason }) => {
            warn!("{}", diagnostics::CLIENT_DISABLED);
            error!(
                "{}: {}",
                diagnostics::SERVICE_CREATE_FAILED,
                RemoteConfigError::PolicyMismatch { reason }
            );
            DisableReason::PolicyRejected
        }
        Ok(ClientExit::RetriesExhausted {
            retry_count,
            last_error,
        }) => {
            warn!(retry_count, last_error = %last_error, "{}", diagnostics::CLIENT_DISABLED);
            DisableReason::RetriesExhausted
        }
        Ok(ClientExit::TransportUnavailable(err)) => {
            error!(
                "{}: {}",
                diagnostics::SERVICE_CREATE_FAILED,
                RemoteConfigError::Transport(err)
            );
            DisableReason::ConstructionFailed
        }
        Ok(ClientExit::Stopped) => {
            info!("remote configuration client stopped");
            DisableReason::Stopped
        }
        Err(err) => {
            error!(error = %err, "remote configuration client task failed");
            warn!("{}", diagnostics::CLIENT_DISABLED);
            DisableReason::ClientAborted
        }
    };

    record_tx.send_replace(SupervisorRecord::disabled(reason));
}

/// Control handle returned by [`Supervisor::start`]. Dropping it stops the client.
#[derive(Debug)]
pub struct SupervisorHandle {
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
    record_tx: Arc<watch::Sender<SupervisorRecord>>,
    status: SubsystemStatus,
    stop_timeout: Duration,
}

impl SupervisorHandle {
    fn failed(
        config: &SupervisorConfig,
        err: RemoteConfigError,
        shutdown: CancellationToken,
        record_tx: Arc<watch::Sender<SupervisorRecord>>,
        record_rx: watch::Receiver<SupervisorRecord>,
    ) -> Self {
        error!("{}: {}", diagnostics::SERVICE_CREATE_FAILED, err);
        record_tx.send_replace(SupervisorRecord::disabled(DisableReason::ConstructionFailed));

        let mut session = ClientSession::new(config.client.endpoint.clone());
        session.state = SessionState::Disabled;
        session.last_error = Some(err.kind());
        let (_, session_rx) = watch::channel(session);

        Self {
            shutdown,
            task: None,
            record_tx,
            status: SubsystemStatus::new(record_rx, session_rx),
            stop_timeout: config.stop_timeout,
        }
    }

    pub fn record(&self) -> SupervisorRecord {
        self.status.record()
    }

    pub fn session(&self) -> ClientSession {
        self.status.session()
    }

    /// Read-only view that outlives the handle, for health endpoints.
    pub fn status(&self) -> SubsystemStatus {
        self.status.clone()
    }

    /// Resolves once the subsystem is disabled, for whatever reason.
    pub async fn wait_until_disabled(&self) -> SupervisorRecord {
        self.status.wait_until_disabled().await
    }

    /// Cancels the client and waits for it to wind down.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "remote configuration supervisor task failed"),
            Err(_) => {
                warn!(
                    timeout = ?self.stop_timeout,
                    "remote configuration client did not stop in time, aborting"
                );
                task.abort();
            }
        }

        self.record_tx.send_if_modified(|record| {
            if record.subsystem_health == SubsystemHealth::Healthy {
                *record = SupervisorRecord::disabled(DisableReason::Stopped);
                true
            } else {
                false
            }
        });
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
