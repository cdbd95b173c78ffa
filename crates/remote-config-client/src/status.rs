// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only status of the remote configuration subsystem, rendered as JSON
//! for the host's health endpoint.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::client::{ClientSession, SessionState};
use crate::error::ErrorKind;
use crate::supervisor::{DisableReason, HostHealth, SubsystemHealth, SupervisorRecord};

/// Cloneable view over the supervisor record and the published client session.
#[derive(Debug, Clone)]
pub struct SubsystemStatus {
    record: watch::Receiver<SupervisorRecord>,
    session: watch::Receiver<ClientSession>,
}

impl SubsystemStatus {
    pub(crate) fn new(
        record: watch::Receiver<SupervisorRecord>,
        session: watch::Receiver<ClientSession>,
    ) -> Self {
        Self { record, session }
    }

    /// Latest supervisor record.
    pub fn record(&self) -> SupervisorRecord {
        *self.record.borrow()
    }

    pub fn session(&self) -> ClientSession {
        self.session.borrow().clone()
    }

    /// Receiver notified on every session change.
    pub fn session_receiver(&self) -> watch::Receiver<ClientSession> {
        self.session.clone()
    }

    /// Resolves with the record once the subsystem is disabled. Also resolves
    /// if the supervisor is gone.
    pub async fn wait_until_disabled(&self) -> SupervisorRecord {
        let mut record = self.record.clone();
        let disabled = record
            .wait_for(|r| r.subsystem_health() == SubsystemHealth::Disabled)
            .await
            .map(|r| *r);
        // the sender only goes away after publishing the final record
        disabled.unwrap_or_else(|_| *record.borrow())
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let record = self.record();
        let session = self.session();
        StatusSnapshot {
            enabled: true,
            subsystem_health: record.subsystem_health(),
            host_health: record.host_health(),
            disabled_reason: record.disabled_reason(),
            state: Some(session.state),
            endpoint: Some(session.endpoint),
            retry_count: session.retry_count,
            last_error: session.last_error,
            snapshot_version: session.snapshot_version,
        }
    }

    pub fn to_json(&self) -> Value {
        self.snapshot().to_json()
    }
}

/// Serializable point-in-time copy of [`SubsystemStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// False when the host was configured without remote configuration.
    pub enabled: bool,
    pub subsystem_health: SubsystemHealth,
    pub host_health: HostHealth,
    pub disabled_reason: Option<DisableReason>,
    pub state: Option<SessionState>,
    pub endpoint: Option<String>,
    pub retry_count: u32,
    pub last_error: Option<ErrorKind>,
    pub snapshot_version: Option<String>,
}

impl StatusSnapshot {
    /// Status reported when remote configuration is turned off in the host configuration.
    pub fn not_configured() -> Self {
        Self {
            enabled: false,
            subsystem_health: SubsystemHealth::Disabled,
            host_health: HostHealth::Healthy,
            disabled_reason: None,
            state: None,
            endpoint: None,
            retry_count: 0,
            last_error: None,
            snapshot_version: None,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|e| json!({ "error": format!("failed to render status: {e}") }))
    }
}

/// Formats the subsystem status, or the not-configured status when `status` is `None`.
pub fn status_json(status: Option<&SubsystemStatus>) -> Value {
    match status {
        Some(status) => status.to_json(),
        None => StatusSnapshot::not_configured().to_json(),
    }
}
