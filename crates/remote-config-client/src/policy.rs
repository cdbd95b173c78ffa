// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport security policy evaluation.
//!
//! The agent exposes two independent knobs: a general "skip TLS validation"
//! toggle shared by every outbound client, and an explicit permission that
//! lets the remote configuration channel follow that toggle. The evaluator
//! decides, before any network activity, whether the requested behaviour is
//! allowed. It performs no I/O and no configuration merging.

use std::fmt;

/// Reason attached to a [`PolicyOutcome::Mismatch`] decision.
pub const MISMATCH_REASON: &str = "transport security disabled without explicit override permission";

/// Effective transport security settings for the remote configuration client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    /// Whether the client should validate the server certificate chain and hostname.
    pub validate_tls: bool,
    /// Whether the operator allows the remote configuration channel to skip validation.
    pub allow_insecure_override: bool,
    /// Whether `allow_insecure_override` came from an explicit operator setting.
    pub source_declared: bool,
}

impl SecurityPolicy {
    /// Builds a policy from the general validation toggle and the optional
    /// remote configuration override. `None` means the operator never set it.
    #[must_use]
    pub fn from_declared(validate_tls: bool, insecure_override: Option<bool>) -> Self {
        Self {
            validate_tls,
            allow_insecure_override: insecure_override.unwrap_or(false),
            source_declared: insecure_override.is_some(),
        }
    }

    /// Rejects policies granting the override without a declaring source.
    pub fn validate(&self) -> Result<(), String> {
        if self.allow_insecure_override && !self.source_declared {
            return Err(
                "insecure override permission set without an explicit configuration source"
                    .to_string(),
            );
        }
        Ok(())
    }

    fn override_granted(&self) -> bool {
        self.allow_insecure_override && self.source_declared
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::from_declared(true, None)
    }
}

/// Whether the requested behaviour is permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyOutcome {
    /// The transport may be built with the decision's [`TlsMode`].
    Consistent,
    /// Validation is off without a declared override; nothing may connect.
    Mismatch,
}

/// How the transport must treat server certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Full certificate chain and hostname validation.
    Validate,
    /// Accept invalid certificates and hostnames.
    SkipValidation,
}

impl TlsMode {
    /// Whether the HTTP client must be told to accept invalid certificates.
    #[must_use]
    pub fn accepts_invalid_certs(self) -> bool {
        matches!(self, TlsMode::SkipValidation)
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TlsMode::Validate => f.write_str("validate"),
            TlsMode::SkipValidation => f.write_str("skip-validation"),
        }
    }
}

/// Immutable result of [`evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub outcome: PolicyOutcome,
    /// Human-readable explanation, logged with mismatches.
    pub reason: String,
    tls_mode: TlsMode,
}

impl PolicyDecision {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.outcome == PolicyOutcome::Consistent
    }

    /// Transport mode to use. `None` when the decision is a mismatch, in which
    /// case no transport may be built.
    #[must_use]
    pub fn tls_mode(&self) -> Option<TlsMode> {
        self.is_consistent().then_some(self.tls_mode)
    }
}

/// Decides whether `policy` is internally consistent.
///
/// Skipping validation is only consistent when the operator explicitly
/// declared the override. Every other combination is consistent.
#[must_use]
pub fn evaluate(policy: &SecurityPolicy) -> PolicyDecision {
    if !policy.validate_tls && !policy.override_granted() {
        return PolicyDecision {
            outcome: PolicyOutcome::Mismatch,
            reason: MISMATCH_REASON.to_string(),
            tls_mode: TlsMode::Validate,
        };
    }

    let (tls_mode, reason) = if policy.validate_tls {
        (TlsMode::Validate, "certificate validation enabled")
    } else {
        (
            TlsMode::SkipValidation,
            "certificate validation disabled by explicit override",
        )
    };
    PolicyDecision {
        outcome: PolicyOutcome::Consistent,
        reason: reason.to_string(),
        tls_mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(validate_tls: bool, allow_insecure_override: bool) -> SecurityPolicy {
        SecurityPolicy {
            validate_tls,
            allow_insecure_override,
            source_declared: true,
        }
    }

    /// Every combination of the two knobs with a declared source.
    #[test]
    fn exhaustive_truth_table() {
        let cases = [
            (true, true, PolicyOutcome::Consistent, Some(TlsMode::Validate)),
            (true, false, PolicyOutcome::Consistent, Some(TlsMode::Validate)),
            (
                false,
                true,
                PolicyOutcome::Consistent,
                Some(TlsMode::SkipValidation),
            ),
            (false, false, PolicyOutcome::Mismatch, None),
        ];

        for (validate_tls, allow, outcome, tls_mode) in cases {
            let decision = evaluate(&declared(validate_tls, allow));
            assert_eq!(
                decision.outcome, outcome,
                "validate_tls={validate_tls} allow_insecure_override={allow}"
            );
            assert_eq!(decision.tls_mode(), tls_mode);
        }
    }

    #[test]
    fn mismatch_carries_exact_reason() {
        let decision = evaluate(&declared(false, false));
        assert_eq!(decision.reason, MISMATCH_REASON);
        assert!(!decision.is_consistent());
    }

    /// An override nobody declared cannot unlock skipping validation.
    #[test]
    fn undeclared_override_is_not_honored() {
        let policy = SecurityPolicy {
            validate_tls: false,
            allow_insecure_override: true,
            source_declared: false,
        };
        assert_eq!(evaluate(&policy).outcome, PolicyOutcome::Mismatch);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn from_declared_tracks_source() {
        let implicit = SecurityPolicy::from_declared(false, None);
        assert!(!implicit.allow_insecure_override);
        assert!(!implicit.source_declared);
        assert_eq!(evaluate(&implicit).outcome, PolicyOutcome::Mismatch);

        let explicit_false = SecurityPolicy::from_declared(false, Some(false));
        assert!(explicit_false.source_declared);
        assert_eq!(evaluate(&explicit_false).outcome, PolicyOutcome::Mismatch);

        let explicit_true = SecurityPolicy::from_declared(false, Some(true));
        assert!(explicit_true.validate().is_ok());
        assert_eq!(
            evaluate(&explicit_true).tls_mode(),
            Some(TlsMode::SkipValidation)
        );
    }

    /// Same policy in, same decision out.
    #[test]
    fn evaluation_is_idempotent() {
        for validate_tls in [true, false] {
            for allow in [true, false] {
                for source_declared in [true, false] {
                    let policy = SecurityPolicy {
                        validate_tls,
                        allow_insecure_override: allow,
                        source_declared,
                    };
                    assert_eq!(evaluate(&policy), evaluate(&policy));
                }
            }
        }
    }

    #[test]
    fn default_policy_validates() {
        let decision = evaluate(&SecurityPolicy::default());
        assert_eq!(decision.tls_mode(), Some(TlsMode::Validate));
    }
}
