// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scripted in-process remote configuration service.
//!
//! [`ScriptedConnector`] records every connection attempt and poll so tests
//! can assert on what the client did, and replays a fixed script of outcomes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::Url;

use crate::endpoint::{ConfigEndpoint, ConfigSnapshot, EndpointConnector, PollRequest, PollResponse};
use crate::error::TransportError;
use crate::policy::TlsMode;

/// One scripted answer to a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Snapshot(ConfigSnapshot),
    Unchanged,
    Fail(TransportError),
    /// Never answers; the client's request timeout has to fire.
    Hang,
}

impl ScriptedOutcome {
    pub fn snapshot(reference: &str, version: &str) -> Self {
        ScriptedOutcome::Snapshot(ConfigSnapshot {
            reference: reference.to_string(),
            version: version.to_string(),
        })
    }

    pub fn refused() -> Self {
        ScriptedOutcome::Fail(TransportError::Connect(
            "tcp connect error: Connection refused (os error 111)".to_string(),
        ))
    }

    pub fn tls_failure() -> Self {
        ScriptedOutcome::Fail(TransportError::Tls(
            "invalid peer certificate: UnknownIssuer".to_string(),
        ))
    }
}

#[derive(Debug)]
struct ScriptState {
    connections: AtomicUsize,
    polls: AtomicUsize,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    fallback: ScriptedOutcome,
    connect_error: Option<TransportError>,
    tls_modes: Mutex<Vec<TlsMode>>,
    urls: Mutex<Vec<Url>>,
    requests: Mutex<Vec<PollRequest>>,
}

/// Connector handing out endpoints that share one script and one set of counters.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    state: Arc<ScriptState>,
}

impl ScriptedConnector {
    /// Replays `script` in order, then answers every further poll with `fallback`.
    pub fn new(script: impl IntoIterator<Item = ScriptedOutcome>, fallback: ScriptedOutcome) -> Self {
        Self::build(script.into_iter().collect(), fallback, None)
    }

    pub fn always(outcome: ScriptedOutcome) -> Self {
        Self::build(VecDeque::new(), outcome, None)
    }

    /// Every `connect` call fails with `error`.
    pub fn failing_connect(error: TransportError) -> Self {
        Self::build(VecDeque::new(), ScriptedOutcome::Unchanged, Some(error))
    }

    fn build(
        script: VecDeque<ScriptedOutcome>,
        fallback: ScriptedOutcome,
        connect_error: Option<TransportError>,
    ) -> Self {
        Self {
            state: Arc::new(ScriptState {
                connections: AtomicUsize::new(0),
                polls: AtomicUsize::new(0),
                script: Mutex::new(script),
                fallback,
                connect_error,
                tls_modes: Mutex::new(Vec::new()),
                urls: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Number of transports built.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Number of polls received across all transports.
    pub fn polls(&self) -> usize {
        self.state.polls.load(Ordering::SeqCst)
    }

    /// TLS modes requested, one per connection attempt.
    pub fn tls_modes(&self) -> Vec<TlsMode> {
        lock(&self.state.tls_modes).clone()
    }

    pub fn urls(&self) -> Vec<Url> {
        lock(&self.state.urls).clone()
    }

    pub fn requests(&self) -> Vec<PollRequest> {
        lock(&self.state.requests).clone()
    }
}

impl EndpointConnector for ScriptedConnector {
    fn connect(
        &self,
        url: &Url,
        tls_mode: TlsMode,
    ) -> Result<Arc<dyn ConfigEndpoint>, TransportError> {
        self.state.connections.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.tls_modes).push(tls_mode);
        lock(&self.state.urls).push(url.clone());
        if let Some(err) = &self.state.connect_error {
            return Err(err.clone());
        }
        Ok(Arc::new(ScriptedEndpoint {
            state: Arc::clone(&self.state),
        }))
    }
}

struct ScriptedEndpoint {
    state: Arc<ScriptState>,
}

#[async_trait]
impl ConfigEndpoint for ScriptedEndpoint {
    async fn poll(&self, request: &PollRequest) -> Result<PollResponse, TransportError> {
        self.state.polls.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.requests).push(request.clone());
        let outcome = lock(&self.state.script)
            .pop_front()
            .unwrap_or_else(|| self.state.fallback.clone());

        match outcome {
            ScriptedOutcome::Snapshot(snapshot) => Ok(PollResponse::Snapshot(snapshot)),
            ScriptedOutcome::Unchanged => Ok(PollResponse::Unchanged),
            ScriptedOutcome::Fail(err) => Err(err),
            ScriptedOutcome::Hang => std::future::pending().await,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
