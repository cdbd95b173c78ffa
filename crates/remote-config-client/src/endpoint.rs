// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Contract between the client and the remote configuration service.
//!
//! The client only depends on these traits. [`crate::http`] provides the
//! HTTPS implementation used in production; the `test-support` feature adds a
//! scripted double for tests.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::policy::TlsMode;

/// Poll sent to the service on every connection attempt and refresh tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollRequest {
    pub hostname: String,
    pub agent_version: String,
    /// Version token of the last snapshot the client accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_version: Option<String>,
}

/// Reference to the configuration snapshot currently served.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConfigSnapshot {
    /// Opaque reference to the snapshot payload.
    pub reference: String,
    /// Opaque version token used for conditional polling.
    pub version: String,
}

/// Answer to a [`PollRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResponse {
    /// A snapshot, new or unchanged in content.
    Snapshot(ConfigSnapshot),
    /// The cached version is still current.
    Unchanged,
}

/// A connected remote configuration service.
#[async_trait]
pub trait ConfigEndpoint: Send + Sync {
    async fn poll(&self, request: &PollRequest) -> Result<PollResponse, TransportError>;
}

/// Builds transports to a remote configuration service.
///
/// `connect` is only ever called after the security policy was found to be
/// consistent, with the TLS mode that decision produced.
pub trait EndpointConnector: Send + Sync {
    fn connect(
        &self,
        url: &Url,
        tls_mode: TlsMode,
    ) -> Result<Arc<dyn ConfigEndpoint>, TransportError>;
}
