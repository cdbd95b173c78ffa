// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Overrides the directory holding `datadog.yaml`.
pub const CONFIG_DIR_ENV: &str = "DD_CONFIG_DIR";

#[cfg(not(windows))]
const DEFAULT_CONFIG_DIR: &str = "/etc/datadog-agent";
#[cfg(windows)]
const DEFAULT_CONFIG_DIR: &str = "C:\\ProgramData\\Datadog";

/// Host-specific locations resolved before configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDefaults {
    pub config_dir: PathBuf,
}

impl PlatformDefaults {
    /// Resolves from the current process environment. Variables whose name
    /// or value is not valid UTF-8 are skipped.
    #[must_use]
    pub fn resolve() -> Self {
        Self::from_env_iter(std::env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }))
    }

    pub fn from_env_iter<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config_dir = None;
        let mut program_data = None;
        for (key, value) in vars {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                CONFIG_DIR_ENV => config_dir = Some(PathBuf::from(value)),
                "ProgramData" | "PROGRAMDATA" if cfg!(windows) => {
                    program_data = Some(PathBuf::from(value).join("Datadog"));
                }
                _ => {}
            }
        }

        Self {
            config_dir: config_dir
                .or(program_data)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_DIR)),
        }
    }
}

impl Default for PlatformDefaults {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from(DEFAULT_CONFIG_DIR),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_dir_wins() {
        let defaults = PlatformDefaults::from_env_iter([
            ("PATH", "/usr/bin"),
            (CONFIG_DIR_ENV, "/opt/datadog"),
        ]);
        assert_eq!(defaults.config_dir, PathBuf::from("/opt/datadog"));
    }

    #[test]
    fn blank_override_is_ignored() {
        let defaults = PlatformDefaults::from_env_iter([(CONFIG_DIR_ENV, "  ")]);
        assert_eq!(defaults, PlatformDefaults::default());
    }

    /// A non-UTF-8 variable elsewhere in the environment must not stop the
    /// config directory from resolving.
    #[cfg(unix)]
    #[test]
    fn resolve_skips_non_utf8_variables() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        const NON_UTF8_VAR: &str = "RC_AGENT_NON_UTF8_VALUE";

        figment::Jail::expect_with(|jail| {
            jail.clear_env();
            jail.set_env(CONFIG_DIR_ENV, "/opt/datadog");
            std::env::set_var(NON_UTF8_VAR, OsStr::from_bytes(&[0xff, 0xfe]));

            let defaults = PlatformDefaults::resolve();

            std::env::remove_var(NON_UTF8_VAR);
            assert_eq!(defaults.config_dir, PathBuf::from("/opt/datadog"));
            Ok(())
        });
    }

    #[cfg(not(windows))]
    #[test]
    fn unix_default() {
        let defaults = PlatformDefaults::from_env_iter(Vec::<(String, String)>::new());
        assert_eq!(defaults.config_dir, PathBuf::from("/etc/datadog-agent"));
    }
}
