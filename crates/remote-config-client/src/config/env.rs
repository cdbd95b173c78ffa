// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `DD_*` environment variable source. Nested YAML keys are flattened with
//! underscores, e.g. `remote_configuration.no_tls_validation` is
//! `DD_REMOTE_CONFIGURATION_NO_TLS_VALIDATION`.

use std::time::Duration;

use figment::{providers::Env, Figment};
use serde::Deserialize;

use crate::config::{
    deserialize_option_lossless, deserialize_optional_bool_from_anything,
    deserialize_optional_duration_from_seconds, deserialize_string_or_int, log_level::LogLevel,
    Config, ConfigError, ConfigSource,
};
use crate::{merge_option, merge_option_to_value, merge_string};

#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfig {
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub site: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub api_key: Option<String>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub hostname: Option<String>,
    pub log_level: Option<LogLevel>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub skip_ssl_validation: Option<bool>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub health_port: Option<u16>,

    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub remote_configuration_enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub remote_configuration_url: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub remote_configuration_no_tls: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub remote_configuration_no_tls_validation: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub remote_configuration_refresh_interval_secs: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub remote_configuration_request_timeout_secs: Option<Duration>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub remote_configuration_max_retries: Option<u32>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub remote_configuration_backoff_base_secs: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub remote_configuration_backoff_max_secs: Option<Duration>,
}

fn merge_config(config: &mut Config, env_config: &EnvConfig) {
    merge_string!(config, env_config, site);
    merge_string!(config, env_config, api_key);
    merge_string!(config, env_config, hostname);
    merge_option_to_value!(config, env_config, log_level);
    merge_option_to_value!(config, env_config, skip_ssl_validation);
    merge_option_to_value!(config, env_config, health_port);

    merge_option_to_value!(config, env_config, remote_configuration_enabled);
    merge_option!(config, env_config, remote_configuration_url);
    merge_option_to_value!(config, env_config, remote_configuration_no_tls);
    merge_option!(config, env_config, remote_configuration_no_tls_validation);
    merge_option_to_value!(
        config,
        remote_configuration_refresh_interval,
        env_config,
        remote_configuration_refresh_interval_secs
    );
    merge_option_to_value!(
        config,
        remote_configuration_request_timeout,
        env_config,
        remote_configuration_request_timeout_secs
    );
    merge_option_to_value!(config, env_config, remote_configuration_max_retries);
    merge_option_to_value!(
        config,
        remote_configuration_backoff_base,
        env_config,
        remote_configuration_backoff_base_secs
    );
    merge_option_to_value!(
        config,
        remote_configuration_backoff_max,
        env_config,
        remote_configuration_backoff_max_secs
    );
}

#[derive(Debug, PartialEq, Clone, Copy)]
#[allow(clippy::module_name_repetitions)]
pub struct EnvConfigSource;

impl ConfigSource for EnvConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Env::prefixed("DD_"));

        match figment.extract::<EnvConfig>() {
            Ok(env_config) => merge_config(config, &env_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from environment variables: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}
