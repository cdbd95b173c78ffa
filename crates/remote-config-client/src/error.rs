// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

use serde::Serialize;

/// Failures building a transport or talking to the remote configuration
/// service. Poll failures are retried; `InsecureUrl` and `Builder` can only
/// happen while the transport is being built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("unauthorized - invalid API key or missing remote configuration scope")]
    Unauthorized,

    #[error("proxy error or malformed request: status {0}")]
    Proxy(u16),

    #[error("transient backend error: status {0}")]
    Retryable(u16),

    #[error("failed to decode poll response: {0}")]
    Decode(String),

    #[error("insecure base url requires explicit opt-in: {0}")]
    InsecureUrl(String),

    #[error("failed to build HTTP client: {0}")]
    Builder(String),
}

impl TransportError {
    /// Coarse classification stored in the published session.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::Timeout(_) => ErrorKind::Timeout,
            TransportError::Connect(_) => ErrorKind::Connect,
            TransportError::Tls(_) => ErrorKind::Tls,
            TransportError::Unauthorized
            | TransportError::Proxy(_)
            | TransportError::Retryable(_) => ErrorKind::Status,
            TransportError::Decode(_) => ErrorKind::Decode,
            TransportError::InsecureUrl(_) | TransportError::Builder(_) => ErrorKind::Construction,
        }
    }

    /// Maps a reqwest failure; `timeout` is the per-request limit the client
    /// was configured with.
    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        let detail = error_chain(err);
        if err.is_timeout() {
            return TransportError::Timeout(timeout);
        }
        if err.is_builder() {
            return TransportError::Builder(detail);
        }
        if err.is_decode() || err.is_body() {
            return TransportError::Decode(detail);
        }
        if looks_like_tls_failure(&detail) {
            return TransportError::Tls(detail);
        }
        TransportError::Connect(detail)
    }
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn looks_like_tls_failure(detail: &str) -> bool {
    let lower = detail.to_ascii_lowercase();
    ["certificate", "tls", "handshake", "unknownissuer"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Error taxonomy of the remote configuration subsystem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteConfigError {
    /// The declared security policy forbids the requested transport behaviour.
    #[error("policy mismatch: {reason}")]
    PolicyMismatch { reason: String },

    /// The service could not be reached or answered with an error.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The client could not be built.
    #[error("construction failed: {0}")]
    Construction(String),
}

impl RemoteConfigError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteConfigError::PolicyMismatch { .. } => ErrorKind::PolicyMismatch,
            RemoteConfigError::Transport(err) => err.kind(),
            RemoteConfigError::Construction(_) => ErrorKind::Construction,
        }
    }
}

/// Copyable error category recorded in [`crate::client::ClientSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PolicyMismatch,
    Timeout,
    Connect,
    Tls,
    Status,
    Decode,
    Construction,
}
