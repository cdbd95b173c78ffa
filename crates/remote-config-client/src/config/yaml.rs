// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `datadog.yaml` configuration source.
//!
//! ```yaml
//! site: datadoghq.eu
//! api_key: <key>
//! skip_ssl_validation: false
//! remote_configuration:
//!   enabled: true
//!   no_tls_validation: false
//!   refresh_interval_secs: 60
//! ```

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Format, Yaml},
    Figment,
};
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
pub struct YamlConfig {
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

    pub remote_configuration: RemoteConfigurationConfig,
}

/// The `remote_configuration:` section.
#[derive(Debug, PartialEq, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RemoteConfigurationConfig {
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub enabled: Option<bool>,
    #[serde(deserialize_with = "deserialize_string_or_int")]
    pub url: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub no_tls: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_bool_from_anything")]
    pub no_tls_validation: Option<bool>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub refresh_interval_secs: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub request_timeout_secs: Option<Duration>,
    #[serde(deserialize_with = "deserialize_option_lossless")]
    pub max_retries: Option<u32>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub backoff_base_secs: Option<Duration>,
    #[serde(deserialize_with = "deserialize_optional_duration_from_seconds")]
    pub backoff_max_secs: Option<Duration>,
}

fn merge_config(config: &mut Config, yaml_config: &YamlConfig) {
    merge_string!(config, yaml_config, site);
    merge_string!(config, yaml_config, api_key);
    merge_string!(config, yaml_config, hostname);
    merge_option_to_value!(config, yaml_config, log_level);
    merge_option_to_value!(config, yaml_config, skip_ssl_validation);
    merge_option_to_value!(config, yaml_config, health_port);

    let rc = &yaml_config.remote_configuration;
    merge_option_to_value!(config, remote_configuration_enabled, rc, enabled);
    merge_option!(config, remote_configuration_url, rc, url);
    merge_option_to_value!(config, remote_configuration_no_tls, rc, no_tls);
    merge_option!(config, remote_configuration_no_tls_validation, rc, no_tls_validation);
    merge_option_to_value!(config, remote_configuration_refresh_interval, rc, refresh_interval_secs);
    merge_option_to_value!(config, remote_configuration_request_timeout, rc, request_timeout_secs);
    merge_option_to_value!(config, remote_configuration_max_retries, rc, max_retries);
    merge_option_to_value!(config, remote_configuration_backoff_base, rc, backoff_base_secs);
    merge_option_to_value!(config, remote_configuration_backoff_max, rc, backoff_max_secs);
}

#[derive(Debug, PartialEq, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct YamlConfigSource {
    pub path: PathBuf,
}

impl ConfigSource for YamlConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError> {
        let figment = Figment::new().merge(Yaml::file(self.path.clone()));

        match figment.extract::<YamlConfig>() {
            Ok(yaml_config) => merge_config(config, &yaml_config),
            Err(e) => {
                return Err(ConfigError::ParseError(format!(
                    "Failed to parse config from yaml file: {e}, using default config."
                )));
            }
        }

        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_merge_config_overrides_with_yaml_file() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "datadog.yaml",
                r#"
site: "datadoghq.eu"
api_key: "yaml-api-key"
hostname: "yaml-host"
log_level: "debug"
skip_ssl_validation: true
health_port: 8126
remote_configuration:
  enabled: false
  url: "https://rc.example.test"
  no_tls: "true"
  no_tls_validation: 1
  refresh_interval_secs: 30
  request_timeout_secs: 2.5
  max_retries: 3
  backoff_base_secs: 1
  backoff_max_secs: 20
"#,
            )?;

            let mut config = Config::default();
            let source = YamlConfigSource {
                path: Path::new("datadog.yaml").to_path_buf(),
            };
            source.load(&mut config).expect("Failed to load config");

            let expected = Config {
                site: "datadoghq.eu".to_string(),
                api_key: "yaml-api-key".to_string(),
                hostname: "yaml-host".to_string(),
                log_level: LogLevel::Debug,
                skip_ssl_validation: true,
                remote_configuration_enabled: false,
                remote_configuration_url: Some("https://rc.example.test".to_string()),
                remote_configuration_no_tls: true,
                remote_configuration_no_tls_validation: Some(true),
                remote_configuration_refresh_interval: Duration::from_secs(30),
                remote_configuration_request_timeout: Duration::from_millis(2500),
                remote_configuration_max_retries: 3,
                remote_configuration_backoff_base: Duration::from_secs(1),
                remote_configuration_backoff_max: Duration::from_secs(20),
                health_port: 8126,
            };

            assert_eq!(config, expected);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_ignored() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.create_file(
                "datadog.yaml",
                r#"
remote_configuration:
  no_tls_validation: 7
  refresh_interval_secs: -4
  max_retries: "many"
"#,
            )?;

            let mut config = Config::default();
            let source = YamlConfigSource {
                path: Path::new("datadog.yaml").to_path_buf(),
            };
            source.load(&mut config).expect("invalid values are lenient");
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_leaves_config_untouched() {
        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            let mut config = Config::default();
            let source = YamlConfigSource {
                path: Path::new("absent.yaml").to_path_buf(),
            };
            source.load(&mut config).expect("missing file is not an error");
            assert_eq!(config, Config::default());
            Ok(())
        });
    }
}
