// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent configuration.
//!
//! Resolved once at startup, in increasing priority:
//! 1. Defaults
//! 2. `datadog.yaml` in the configuration directory
//! 3. `DD_*` environment variables
//!
//! The resolved [`Config`] is immutable; the remote configuration pieces are
//! derived from it with [`Config::security_policy`],
//! [`Config::supervisor_config`] and [`Config::http_connector`].

pub mod env;
pub mod log_level;
pub mod platform;
pub mod yaml;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use serde_aux::prelude::deserialize_bool_from_anything;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::client::{ClientSettings, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT};
use crate::config::env::EnvConfigSource;
use crate::config::log_level::LogLevel;
use crate::config::platform::PlatformDefaults;
use crate::config::yaml::YamlConfigSource;
use crate::http::HttpConnector;
use crate::policy::SecurityPolicy;
use crate::retry::{BackoffConfig, RetryPolicy};
use crate::supervisor::{SupervisorConfig, DEFAULT_STOP_TIMEOUT};

pub const DEFAULT_SITE: &str = "datadoghq.com";
pub const DEFAULT_HEALTH_PORT: u16 = 5555;
/// Polling faster than this is clamped.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Merges an `Option<String>` source field into a `String` config field.
#[macro_export]
macro_rules! merge_string {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field.clone_from(value);
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field.clone_from(value);
        }
    };
}

/// Replaces an `Option<T>` config field when the source has a value.
#[macro_export]
macro_rules! merge_option {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if $source.$source_field.is_some() {
            $config.$config_field.clone_from(&$source.$source_field);
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if $source.$field.is_some() {
            $config.$field.clone_from(&$source.$field);
        }
    };
}

/// Merges an `Option<T>` source field into a `T` config field when it is `Some`.
#[macro_export]
macro_rules! merge_option_to_value {
    ($config:expr, $config_field:ident, $source:expr, $source_field:ident) => {
        if let Some(value) = &$source.$source_field {
            $config.$config_field = value.clone();
        }
    };
    ($config:expr, $source:expr, $field:ident) => {
        if let Some(value) = &$source.$field {
            $config.$field = value.clone();
        }
    };
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::struct_excessive_bools)]
pub struct Config {
    pub site: String,
    pub api_key: String,
    pub hostname: String,
    pub log_level: LogLevel,
    /// General "skip TLS validation" toggle shared by every outbound connection.
    pub skip_ssl_validation: bool,

    pub remote_configuration_enabled: bool,
    /// Overrides the service URL derived from `site`.
    pub remote_configuration_url: Option<String>,
    /// Allows a plaintext `http://` service URL.
    pub remote_configuration_no_tls: bool,
    /// Explicit permission to skip TLS validation for remote configuration.
    /// `None` when the operator never declared it.
    pub remote_configuration_no_tls_validation: Option<bool>,
    pub remote_configuration_refresh_interval: Duration,
    pub remote_configuration_request_timeout: Duration,
    pub remote_configuration_max_retries: u32,
    pub remote_configuration_backoff_base: Duration,
    pub remote_configuration_backoff_max: Duration,

    pub health_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let backoff = BackoffConfig::default();
        Self {
            site: String::default(),
            api_key: String::default(),
            hostname: String::default(),
            log_level: LogLevel::default(),
            skip_ssl_validation: false,
            remote_configuration_enabled: true,
            remote_configuration_url: None,
            remote_configuration_no_tls: false,
            remote_configuration_no_tls_validation: None,
            remote_configuration_refresh_interval: DEFAULT_POLL_INTERVAL,
            remote_configuration_request_timeout: DEFAULT_REQUEST_TIMEOUT,
            remote_configuration_max_retries: DEFAULT_MAX_RETRIES,
            remote_configuration_backoff_base: backoff.base,
            remote_configuration_backoff_max: backoff.max_backoff,
            health_port: DEFAULT_HEALTH_PORT,
        }
    }
}

impl Config {
    /// Loads the configuration from the directory named by `defaults`.
    #[must_use]
    pub fn resolve(defaults: &PlatformDefaults) -> Self {
        get_config(&defaults.config_dir)
    }

    /// `https://config.<site>` unless an explicit URL is configured.
    #[must_use]
    pub fn remote_configuration_base_url(&self) -> String {
        match &self.remote_configuration_url {
            Some(url) if !url.trim().is_empty() => url.trim().trim_end_matches('/').to_string(),
            _ => format!("https://config.{}", self.site),
        }
    }

    #[must_use]
    pub fn security_policy(&self) -> SecurityPolicy {
        SecurityPolicy::from_declared(
            !self.skip_ssl_validation,
            self.remote_configuration_no_tls_validation,
        )
    }

    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            endpoint: self.remote_configuration_base_url(),
            hostname: self.hostname.clone(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            poll_interval: self.remote_configuration_refresh_interval,
            request_timeout: self.remote_configuration_request_timeout,
        }
    }

    #[must_use]
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            client: self.client_settings(),
            retry: RetryPolicy {
                max_retries: self.remote_configuration_max_retries,
                backoff: BackoffConfig {
                    base: self.remote_configuration_backoff_base,
                    max_backoff: self.remote_configuration_backoff_max,
                    ..BackoffConfig::default()
                },
            },
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn http_connector(&self) -> HttpConnector {
        let api_key = Some(self.api_key.clone()).filter(|key| !key.is_empty());
        HttpConnector::new(
            api_key,
            env!("CARGO_PKG_VERSION"),
            self.remote_configuration_no_tls,
            self.remote_configuration_request_timeout,
        )
    }
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn build(&mut self) -> Config {
        let mut failed_sources = 0;
        for source in &self.sources {
            match source.load(&mut self.config) {
                Ok(()) => (),
                Err(e) => {
                    error!("Failed to load config: {}", e);
                    failed_sources += 1;
                }
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("All sources failed to load config, using default config.");
        }

        if self.config.site.is_empty() {
            self.config.site = DEFAULT_SITE.to_string();
        }

        if self.config.hostname.is_empty() {
            self.config.hostname = std::env::var("HOSTNAME")
                .ok()
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| "localhost".to_string());
        }

        self.sanitise();
        self.config.clone()
    }

    fn sanitise(&mut self) {
        let config = &mut self.config;

        if config.remote_configuration_refresh_interval < MIN_REFRESH_INTERVAL {
            warn!(
                "remote_configuration.refresh_interval {:?} is below the minimum, using {:?}",
                config.remote_configuration_refresh_interval, MIN_REFRESH_INTERVAL
            );
            config.remote_configuration_refresh_interval = MIN_REFRESH_INTERVAL;
        }

        if config.remote_configuration_request_timeout.is_zero() {
            warn!(
                "remote_configuration.request_timeout must be positive, using {:?}",
                DEFAULT_REQUEST_TIMEOUT
            );
            config.remote_configuration_request_timeout = DEFAULT_REQUEST_TIMEOUT;
        }

        if config.remote_configuration_backoff_max < config.remote_configuration_backoff_base {
            warn!(
                "remote_configuration.backoff_max {:?} is below backoff_base {:?}, raising it",
                config.remote_configuration_backoff_max, config.remote_configuration_backoff_base
            );
            config.remote_configuration_backoff_max = config.remote_configuration_backoff_base;
        }
    }
}

/// Loads `datadog.yaml` from `config_directory`, then the environment.
#[allow(clippy::module_name_repetitions)]
#[inline]
#[must_use]
pub fn get_config(config_directory: &Path) -> Config {
    let path: std::path::PathBuf = config_directory.join("datadog.yaml");
    ConfigBuilder::default()
        .add_source(Box::new(YamlConfigSource { path }))
        .add_source(Box::new(EnvConfigSource))
        .build()
}

pub fn deserialize_string_or_int<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Null => Ok(None),
        _ => {
            error!("Failed to parse value, expected a string or an integer, ignoring");
            Ok(None)
        }
    }
}

pub fn deserialize_optional_bool_from_anything<'de, D>(
    deserializer: D,
) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<Value> = Option::deserialize(deserializer)?;

    match opt {
        None => Ok(None),
        Some(value) => match deserialize_bool_from_anything(value) {
            Ok(bool_result) => Ok(Some(bool_result)),
            Err(e) => {
                error!("Failed to parse bool value: {}, ignoring", e);
                Ok(None)
            }
        },
    }
}

pub fn deserialize_option_lossless<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    match Option::<T>::deserialize(deserializer) {
        Ok(value) => Ok(value),
        Err(e) => {
            error!("Failed to deserialize optional value: {}, ignoring", e);
            Ok(None)
        }
    }
}

/// Reads whole or fractional seconds. Negative or unparsable values are ignored.
pub fn deserialize_optional_duration_from_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    struct DurationVisitor;
    impl serde::de::Visitor<'_> for DurationVisitor {
        type Value = Option<Duration>;
        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "a duration in seconds (integer or float)")
        }
        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Some(Duration::from_secs(v)))
        }
        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
            match u64::try_from(v) {
                Ok(secs) => self.visit_u64(secs),
                Err(_) => {
                    error!("Failed to parse duration: negative durations are not allowed, ignoring");
                    Ok(None)
                }
            }
        }
        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
            if v < 0f64 || !v.is_finite() {
                error!("Failed to parse duration: {v} is not a valid number of seconds, ignoring");
                return Ok(None);
            }
            match Duration::try_from_secs_f64(v) {
                Ok(duration) => Ok(Some(duration)),
                Err(e) => {
                    error!("Failed to parse duration from {v} seconds: {e}, ignoring");
                    Ok(None)
                }
            }
        }
        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
            match v.trim().parse::<f64>() {
                Ok(secs) => self.visit_f64(secs),
                Err(_) => {
                    error!("Failed to parse duration from '{v}', ignoring");
                    Ok(None)
                }
            }
        }
        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
        fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }
    }
    deserializer.deserialize_any(DurationVisitor)
}
