// Runtime configuration
// Read from the environment (after `.env` is loaded by main)

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::agents::audit::DEFAULT_AUDIT_CAPACITY;
use crate::agents::errors::{CoordinationError, CoordinationResult};
use crate::agents::gates::DEFAULT_APPROVAL_TIMEOUT;
use crate::agents::messages::DEFAULT_MAILBOX_WARN_THRESHOLD;
use crate::agents::worker::DEFAULT_POLL_INTERVAL;

/// Settings for the coordination service
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind_addr: SocketAddr,
    /// Enables the Postgres audit sink when set
    pub database_url: Option<String>,
    pub audit_capacity: usize,
    pub approval_timeout: Duration,
    pub mailbox_warn_threshold: usize,
    pub poll_interval: Duration,
    /// Grants every approval request without asking a human
    pub auto_approve: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            mailbox_warn_threshold: DEFAULT_MAILBOX_WARN_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            auto_approve: false,
        }
    }
}

impl CoordinatorConfig {
    /// Loads settings from process environment variables
    ///
    /// # Variables
    /// * `COORDINATOR_BIND_ADDR` - listen address (default `0.0.0.0:3000`)
    /// * `DATABASE_URL` - optional Postgres URL for the audit sink
    /// * `COORDINATOR_AUDIT_CAPACITY` - entries kept in memory (default 1000)
    /// * `COORDINATOR_APPROVAL_TIMEOUT_SECS` - human approval wait (default 300)
    /// * `COORDINATOR_MAILBOX_WARN_THRESHOLD` - mailbox depth warning (default 1000)
    /// * `COORDINATOR_POLL_INTERVAL_MS` - idle worker poll interval (default 250)
    /// * `COORDINATOR_AUTO_APPROVE` - `true` to skip human approval
    pub fn from_env() -> CoordinationResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> CoordinationResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            bind_addr: parse_or(get("COORDINATOR_BIND_ADDR"), "COORDINATOR_BIND_ADDR", defaults.bind_addr)?,
            database_url: get("DATABASE_URL"),
            audit_capacity: parse_or(
                get("COORDINATOR_AUDIT_CAPACITY"),
                "COORDINATOR_AUDIT_CAPACITY",
                defaults.audit_capacity,
            )?,
            approval_timeout: Duration::from_secs(parse_or(
                get("COORDINATOR_APPROVAL_TIMEOUT_SECS"),
                "COORDINATOR_APPROVAL_TIMEOUT_SECS",
                defaults.approval_timeout.as_secs(),
            )?),
            mailbox_warn_threshold: parse_or(
                get("COORDINATOR_MAILBOX_WARN_THRESHOLD"),
                "COORDINATOR_MAILBOX_WARN_THRESHOLD",
                defaults.mailbox_warn_threshold,
            )?,
            poll_interval: Duration::from_millis(parse_or(
                get("COORDINATOR_POLL_INTERVAL_MS"),
                "COORDINATOR_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            auto_approve: parse_or(
                get("COORDINATOR_AUTO_APPROVE"),
                "COORDINATOR_AUTO_APPROVE",
                defaults.auto_approve,
            )?,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> CoordinationResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e| {
            CoordinationError::Config(format!("{} has invalid value '{}': {}", key, value, e))
        }),
    }
}
