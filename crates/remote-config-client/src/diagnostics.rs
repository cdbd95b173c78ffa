// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Stable diagnostic messages.
//!
//! Operators and log-based tests match on these strings, so they are defined
//! once and only ever referenced through these constants.

/// Emitted when the general skip-validation toggle is set without the remote
/// configuration override.
pub const POLICY_MISMATCH: &str =
    "remote configuration does not allow skipping TLS validation by default";

/// Emitted once when the supervisor disables the client.
pub const CLIENT_DISABLED: &str = "remote configuration isn't enabled, disabling client";

/// Emitted when the client or its transport could not be constructed.
pub const SERVICE_CREATE_FAILED: &str = "unable to create remote config service";

/// Emitted for each failed connection or poll attempt.
pub const SERVICE_UNREACHABLE: &str = "remote configuration service unreachable";

/// Emitted when the first poll of a connection attempt succeeds.
pub const CLIENT_CONNECTED: &str = "remote configuration client connected";
