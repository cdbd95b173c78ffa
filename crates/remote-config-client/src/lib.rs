// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote configuration client for the Datadog agent.
//!
//! The client refuses to start when TLS validation is turned off without an
//! explicit remote configuration override, retries an unreachable service with
//! backoff, and runs under a [`supervisor::Supervisor`] that contains every
//! failure so the host process stays healthy.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod diagnostics;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod http;
pub mod policy;
pub mod retry;
pub mod status;
pub mod supervisor;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use client::{ClientExit, ClientSession, ClientSettings, RemoteConfigClient, SessionState};
pub use error::{ErrorKind, RemoteConfigError, TransportError};
pub use policy::{evaluate, PolicyDecision, PolicyOutcome, SecurityPolicy, TlsMode};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorHandle};
