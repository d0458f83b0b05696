//! Controller configuration.
//!
//! Read once at startup from environment variables:
//!
//! | Variable                    | Default          |
//! |-----------------------------|------------------|
//! | `WATCH_NAMESPACE`           | all namespaces   |
//! | `METRICS_PORT`              | `5000`           |
//! | `RESYNC_INTERVAL_SECS`      | `300`            |
//! | `MAX_CONCURRENT_RECONCILES` | `3`              |
//! | `BACKOFF_MIN_SECS`          | `5`              |
//! | `BACKOFF_MAX_SECS`          | `300`            |

use crate::error::ControllerError;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_METRICS_PORT: u16 = 5000;
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;
const DEFAULT_MAX_CONCURRENT_RECONCILES: usize = 3;
const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;
const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Namespace to watch; `None` watches the whole cluster
    pub namespace: Option<String>,
    pub metrics_port: u16,
    /// How often every known key is reconciled even without events
    pub resync_interval: Duration,
    /// Upper bound on passes running at once (always distinct keys)
    pub max_concurrent_reconciles: usize,
    pub backoff_min_secs: u64,
    pub backoff_max_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            max_concurrent_reconciles: DEFAULT_MAX_CONCURRENT_RECONCILES,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty());
        let metrics_port = parse_or(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT)?;
        let resync_secs = parse_or(&lookup, "RESYNC_INTERVAL_SECS", DEFAULT_RESYNC_INTERVAL_SECS)?;
        let max_concurrent_reconciles = parse_or(
            &lookup,
            "MAX_CONCURRENT_RECONCILES",
            DEFAULT_MAX_CONCURRENT_RECONCILES,
        )?;
        let backoff_min_secs = parse_or(&lookup, "BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS)?;
        let backoff_max_secs = parse_or(&lookup, "BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS)?;

        if resync_secs == 0 {
            return Err(ControllerError::InvalidConfig(
                "RESYNC_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }
        if max_concurrent_reconciles == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_CONCURRENT_RECONCILES must be greater than 0".to_string(),
            ));
        }
        if backoff_min_secs == 0 || backoff_min_secs > backoff_max_secs {
            return Err(ControllerError::InvalidConfig(format!(
                "BACKOFF_MIN_SECS ({}) must be between 1 and BACKOFF_MAX_SECS ({})",
                backoff_min_secs, backoff_max_secs
            )));
        }

        Ok(Self {
            namespace,
            metrics_port,
            resync_interval: Duration::from_secs(resync_secs),
            max_concurrent_reconciles,
            backoff_min_secs,
            backoff_max_secs,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ControllerError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has invalid value {:?}: {}", name, raw, e))
        }),
    }
}
