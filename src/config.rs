//! Controller settings read from the environment
//!
//! | Variable                            | Default         |
//! |-------------------------------------|-----------------|
//! | `ROLLOUT_HEALTH_PORT`               | 8080            |
//! | `ROLLOUT_RECONCILE_TIMEOUT_SECONDS` | 30              |
//! | `ROLLOUT_ERROR_REQUEUE_SECONDS`     | 10              |
//! | `ROLLOUT_WATCH_NAMESPACE`           | all namespaces  |

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_HEALTH_PORT: u16 = 8080;
pub const DEFAULT_RECONCILE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub health_port: u16,
    /// Upper bound on a single reconcile
    pub reconcile_timeout: Duration,
    /// Delay before retrying a failed reconcile
    pub error_requeue: Duration,
    /// Restrict the watch to one namespace
    pub watch_namespace: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            health_port: DEFAULT_HEALTH_PORT,
            reconcile_timeout: DEFAULT_RECONCILE_TIMEOUT,
            error_requeue: DEFAULT_ERROR_REQUEUE,
            watch_namespace: None,
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; invalid values keep the default
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            health_port: parse_or(&lookup, "ROLLOUT_HEALTH_PORT", defaults.health_port),
            reconcile_timeout: Duration::from_secs(parse_positive_or(
                &lookup,
                "ROLLOUT_RECONCILE_TIMEOUT_SECONDS",
                defaults.reconcile_timeout.as_secs(),
            )),
            error_requeue: Duration::from_secs(parse_positive_or(
                &lookup,
                "ROLLOUT_ERROR_REQUEUE_SECONDS",
                defaults.error_requeue.as_secs(),
            )),
            watch_namespace: lookup("ROLLOUT_WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display + Copy,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = key, value = %raw, default = %default, "Invalid value, using default");
                default
            }
        },
    }
}

/// Like `parse_or`, but zero is also rejected
fn parse_positive_or<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default) {
        0 => {
            warn!(variable = key, default = %default, "Value must be greater than zero, using default");
            default
        }
        value => value,
    }
}
