//! Server configuration, read from the environment once at startup.
//!
//! | variable                       | default                 |
//! |--------------------------------|-------------------------|
//! | `DATABASE_URL`                 | required                |
//! | `SERVER_BIND`                  | `0.0.0.0:8000`          |
//! | `SERVER_ROOT`                  | `/public`               |
//! | `SERVER_SSL_KEY_PATH`          | unset, serves plain HTTP |
//! | `SERVER_SSL_CHAIN_PATH`        | required with a key     |
//! | `SERVER_REPORT_DIR`            | `/var/lib/swms/reports` |
//! | `SWMS_OVERDUE_THRESHOLD_HOURS` | `48`                    |
//! | `SWMS_PORTAL_TOKEN_TTL_DAYS`   | `7`                     |
//! | `SWMS_ACTION_TIMEOUT_SECS`     | `30`                    |

use chrono::Duration;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use swms_core::compliance::DEFAULT_OVERDUE_HOURS;
use swms_core::OverdueThreshold;
use thiserror::Error;

const DEFAULT_BIND: &str = "0.0.0.0:8000";
const DEFAULT_ROOT: &str = "/public";
const DEFAULT_REPORT_DIR: &str = "/var/lib/swms/reports";
const DEFAULT_PORTAL_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_ACTION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// The knobs of the campaign workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WorkflowSettings {
    /// How long a lodged submission may wait for review.
    pub(crate) overdue_threshold: OverdueThreshold,

    /// How long the portal link of a campaign email stays valid.
    pub(crate) portal_token_ttl: Duration,

    /// The deadline of a single campaign action.
    pub(crate) action_timeout: std::time::Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            overdue_threshold: OverdueThreshold::hours(DEFAULT_OVERDUE_HOURS),
            portal_token_ttl: Duration::days(DEFAULT_PORTAL_TOKEN_TTL_DAYS),
            action_timeout: std::time::Duration::from_secs(DEFAULT_ACTION_TIMEOUT_SECS),
        }
    }
}

/// TLS key material, both files are PEM encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Tls {
    pub(crate) key_path: PathBuf,
    pub(crate) chain_path: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Config {
    pub(crate) database_url: String,
    pub(crate) bind: String,
    pub(crate) root: PathBuf,
    pub(crate) tls: Option<Tls>,
    pub(crate) report_dir: PathBuf,
    pub(crate) workflow: WorkflowSettings,
}

impl Config {
    pub(crate) fn from_environment() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &'static str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let tls = match var("SERVER_SSL_KEY_PATH") {
            Some(key_path) => Some(Tls {
                key_path: key_path.into(),
                chain_path: var("SERVER_SSL_CHAIN_PATH")
                    .ok_or(ConfigError::Missing("SERVER_SSL_CHAIN_PATH"))?
                    .into(),
            }),
            None => None,
        };

        let overdue_hours = parse(&var, "SWMS_OVERDUE_THRESHOLD_HOURS", DEFAULT_OVERDUE_HOURS)?;
        let ttl_days = parse(&var, "SWMS_PORTAL_TOKEN_TTL_DAYS", DEFAULT_PORTAL_TOKEN_TTL_DAYS)?;
        let timeout_secs = parse(&var, "SWMS_ACTION_TIMEOUT_SECS", DEFAULT_ACTION_TIMEOUT_SECS)?;

        if overdue_hours < 0 {
            return Err(invalid("SWMS_OVERDUE_THRESHOLD_HOURS", overdue_hours));
        }

        if ttl_days <= 0 {
            return Err(invalid("SWMS_PORTAL_TOKEN_TTL_DAYS", ttl_days));
        }

        if timeout_secs == 0 {
            return Err(invalid("SWMS_ACTION_TIMEOUT_SECS", timeout_secs));
        }

        Ok(Self {
            database_url,
            bind: var("SERVER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_owned()),
            root: var("SERVER_ROOT")
                .unwrap_or_else(|| DEFAULT_ROOT.to_owned())
                .into(),
            tls,
            report_dir: var("SERVER_REPORT_DIR")
                .unwrap_or_else(|| DEFAULT_REPORT_DIR.to_owned())
                .into(),
            workflow: WorkflowSettings {
                overdue_threshold: OverdueThreshold::hours(overdue_hours),
                portal_token_ttl: Duration::days(ttl_days),
                action_timeout: std::time::Duration::from_secs(timeout_secs),
            },
        })
    }
}

fn parse<T, V>(var: &V, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    V: Fn(&'static str) -> Option<String>,
{
    match var(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}

fn invalid<T: ToString>(name: &'static str, value: T) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect::<HashMap<_, _>>();

        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/swms")]).unwrap();

        assert_eq!(config.bind, "0.0.0.0:8000");
        assert_eq!(config.root, PathBuf::from("/public"));
        assert_eq!(config.tls, None);
        assert_eq!(config.workflow, WorkflowSettings::default());
        assert_eq!(config.workflow.overdue_threshold.as_hours(), 48);
    }

    #[test]
    fn test_database_url_required() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("DATABASE_URL", "postgres://localhost/swms"),
            ("SWMS_OVERDUE_THRESHOLD_HOURS", "24"),
            ("SWMS_ACTION_TIMEOUT_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(config.workflow.overdue_threshold.as_hours(), 24);
        assert_eq!(
            config.workflow.action_timeout,
            std::time::Duration::from_secs(5)
        );
    }

    #[test]
    fn test_invalid_number() {
        let result = config(&[
            ("DATABASE_URL", "postgres://localhost/swms"),
            ("SWMS_PORTAL_TOKEN_TTL_DAYS", "a week"),
        ]);

        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "SWMS_PORTAL_TOKEN_TTL_DAYS",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = config(&[
            ("DATABASE_URL", "postgres://localhost/swms"),
            ("SWMS_ACTION_TIMEOUT_SECS", "0"),
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_tls_requires_chain() {
        let result = config(&[
            ("DATABASE_URL", "postgres://localhost/swms"),
            ("SERVER_SSL_KEY_PATH", "/etc/ssl/key.pem"),
        ]);

        assert_eq!(result, Err(ConfigError::Missing("SERVER_SSL_CHAIN_PATH")));
    }
}
