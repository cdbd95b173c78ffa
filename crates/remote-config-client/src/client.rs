// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote configuration client and its connection state machine.
//!
//! ```text
//! Uninitialized ──mismatch──▶ PolicyRejected
//!       │
//!   consistent
//!       ▼
//!   Connecting ──ok──▶ Connected ──poll error──┐
//!       │  ▲                                   │
//!     error└──backoff── Unreachable ◀──────────┘
//!
//! any non-terminal state ──shutdown / retry ceiling──▶ Disabled
//! ```
//!
//! The client owns its [`ClientSession`] and publishes a copy after every
//! change; nothing else mutates it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnostics;
use crate::endpoint::{EndpointConnector, PollRequest, PollResponse};
use crate::error::{ErrorKind, RemoteConfigError, TransportError};
use crate::policy::{evaluate, PolicyDecision, SecurityPolicy};
use crate::retry::{BackoffState, RetryPolicy};

/// Baseline polling cadence once connected.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
/// Upper bound for a single handshake or poll.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Position of a client in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    /// Terminal: the security policy forbids connecting.
    PolicyRejected,
    Connecting,
    Connected,
    Unreachable,
    /// Terminal: shut down or gave up retrying.
    Disabled,
}

impl SessionState {
    /// No transition leaves a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::PolicyRejected | SessionState::Disabled)
    }

    #[must_use]
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::{Connected, Connecting, Disabled, PolicyRejected, Uninitialized, Unreachable};
        match (self, next) {
            (Uninitialized, PolicyRejected | Connecting | Disabled)
            | (Connecting, Connected | Unreachable | Disabled)
            | (Connected, Unreachable | Disabled)
            | (Unreachable, Connecting | Disabled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::PolicyRejected => "policy_rejected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Unreachable => "unreachable",
            SessionState::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Observable state of one client lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSession {
    pub state: SessionState,
    pub endpoint: String,
    pub last_error: Option<ErrorKind>,
    /// Consecutive failed attempts since the last successful poll.
    pub retry_count: u32,
    /// Version token of the last accepted snapshot.
    pub snapshot_version: Option<String>,
}

impl ClientSession {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            state: SessionState::Uninitialized,
            endpoint: endpoint.into(),
            last_error: None,
            retry_count: 0,
            snapshot_version: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Base URL of the remote configuration service.
    pub endpoint: String,
    pub hostname: String,
    pub agent_version: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://config.datadoghq.com".to_string(),
            hostname: "localhost".to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Why [`RemoteConfigClient::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientExit {
    PolicyRejected { reason: String },
    RetriesExhausted { retry_count: u32, last_error: TransportError },
    /// The transport could not be built from a consistent policy.
    TransportUnavailable(TransportError),
    Stopped,
}

pub struct RemoteConfigClient {
    settings: ClientSettings,
    url: Url,
    decision: PolicyDecision,
    connector: Arc<dyn EndpointConnector>,
    session: ClientSession,
    publisher: watch::Sender<ClientSession>,
}

impl fmt::Debug for RemoteConfigClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfigClient")
            .field("url", &self.url.as_str())
            .field("decision", &self.decision)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl RemoteConfigClient {
    /// Evaluates `policy` and validates the settings. No connection is made.
    pub fn new(
        settings: ClientSettings,
        policy: &SecurityPolicy,
        connector: Arc<dyn EndpointConnector>,
    ) -> Result<Self, RemoteConfigError> {
        policy.validate().map_err(RemoteConfigError::Construction)?;
        if settings.request_timeout.is_zero() {
            return Err(RemoteConfigError::Construction(
                "request timeout must be greater than zero".to_string(),
            ));
        }
        let url = parse_endpoint(&settings.endpoint)?;
        let decision = evaluate(policy);

        let session = ClientSession::new(settings.endpoint.clone());
        let (publisher, _) = watch::channel(session.clone());
        Ok(Self {
            settings,
            url,
            decision,
            connector,
            session,
            publisher,
        })
    }

    pub fn decision(&self) -> &PolicyDecision {
        &self.decision
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Receiver observing every published session change.
    pub fn subscribe(&self) -> watch::Receiver<ClientSession> {
        self.publisher.subscribe()
    }

    /// Drives the session until it reaches a terminal state.
    pub async fn run(mut self, retry: RetryPolicy, shutdown: CancellationToken) -> ClientExit {
        let Some(tls_mode) = self.decision.tls_mode() else {
            warn!(
                reason = %self.decision.reason,
                endpoint = %self.session.endpoint,
                "{}",
                diagnostics::POLICY_MISMATCH
            );
            self.session.last_error = Some(ErrorKind::PolicyMismatch);
            self.transition(SessionState::PolicyRejected);
            return ClientExit::PolicyRejected {
                reason: self.decision.reason.clone(),
            };
        };

        if shutdown.is_cancelled() {
            return self.stop();
        }

        self.transition(SessionState::Connecting);
        let endpoint = match self.connector.connect(&self.url, tls_mode) {
            Ok(endpoint) => endpoint,
            Err(err) => {
                self.session.last_error = Some(err.kind());
                self.transition(SessionState::Disabled);
                return ClientExit::TransportUnavailable(err);
            }
        };
        debug!(endpoint = %self.session.endpoint, tls_mode = %tls_mode, "remote configuration transport ready");

        let request_timeout = self.settings.request_timeout;
        let mut backoff = BackoffState::new(retry.backoff);
        loop {
            let request = self.poll_request();
            let result = tokio::select! {
                biased;
                () = shutdown.cancelled() => return self.stop(),
                result = tokio::time::timeout(request_timeout, endpoint.poll(&request)) => {
                    result.unwrap_or_else(|_| Err(TransportError::Timeout(request_timeout)))
                }
            };

            let delay = match result {
                Ok(response) => {
                    self.on_poll_success(response);
                    backoff.register_success();
                    self.settings.poll_interval
                }
                Err(err) => {
                    self.session.retry_count = self.session.retry_count.saturating_add(1);
                    self.session.last_error = Some(err.kind());
                    self.transition(SessionState::Unreachable);
                    warn!(
                        attempt = self.session.retry_count,
                        max_retries = retry.max_retries,
                        error = %err,
                        "{}",
                        diagnostics::SERVICE_UNREACHABLE
                    );
                    if retry.exhausted(self.session.retry_count) {
                        self.transition(SessionState::Disabled);
                        return ClientExit::RetriesExhausted {
                            retry_count: self.session.retry_count,
                            last_error: err,
                        };
                    }
                    let delay = backoff.register_error();
                    debug!(retry_in = ?delay, "remote configuration client backing off");
                    delay
                }
            };

            tokio::select! {
                biased;
                () = shutdown.cancelled() => return self.stop(),
                () = tokio::time::sleep(delay) => {}
            }

            if self.session.state == SessionState::Unreachable {
                self.transition(SessionState::Connecting);
            }
        }
    }

    fn poll_request(&self) -> PollRequest {
        PollRequest {
            hostname: self.settings.hostname.clone(),
            agent_version: self.settings.agent_version.clone(),
            cached_version: self.session.snapshot_version.clone(),
        }
    }

    fn on_poll_success(&mut self, response: PollResponse) {
        self.session.retry_count = 0;
        self.session.last_error = None;
        match response {
            PollResponse::Snapshot(snapshot) => {
                if self.session.snapshot_version.as_deref() != Some(snapshot.version.as_str()) {
                    info!(
                        reference = %snapshot.reference,
                        version = %snapshot.version,
                        "remote configuration snapshot received"
                    );
                }
                self.session.snapshot_version = Some(snapshot.version);
            }
            PollResponse::Unchanged => debug!("remote configuration snapshot unchanged"),
        }

        if self.session.state == SessionState::Connected {
            self.publisher.send_replace(self.session.clone());
        } else {
            self.transition(SessionState::Connected);
            info!(endpoint = %self.session.endpoint, "{}", diagnostics::CLIENT_CONNECTED);
        }
    }

    fn stop(&mut self) -> ClientExit {
        self.transition(SessionState::Disabled);
        ClientExit::Stopped
    }

    fn transition(&mut self, next: SessionState) {
        let previous = self.session.state;
        debug_assert!(
            previous.can_transition_to(next),
            "invalid session transition {previous} -> {next}"
        );
        self.session.state = next;
        info!(
            from = %previous,
            to = %next,
            retry_count = self.session.retry_count,
            "remote configuration client state transition"
        );
        self.publisher.send_replace(self.session.clone());
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, RemoteConfigError> {
    let url = Url::parse(raw).map_err(|e| {
        RemoteConfigError::Construction(format!("invalid remote configuration endpoint {raw:?}: {e}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RemoteConfigError::Construction(format!(
            "unsupported scheme {:?} for remote configuration endpoint",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(RemoteConfigError::Construction(format!(
            "remote configuration endpoint {raw:?} has no host"
        )));
    }
    Ok(url)
}
