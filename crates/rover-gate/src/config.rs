//! Gate configuration from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use rover_gate_core::ChainNamespace;
use rover_gate_intake::IntakeConfig;
use rover_gate_store::SqliteStore;
use thiserror::Error;

/// Environment variable names.
pub mod vars {
    /// `true` turns on mutex gating. Anything else leaves it off.
    pub const MINER_MUTEX: &str = "BC_MINER_MUTEX";
    /// Namespace for the mutex and latest-block keys.
    pub const SUPER_COLLIDER: &str = "BC_SUPER_COLLIDER";
    pub const STATE_TIMEOUT_MS: &str = "ROVER_GATE_STATE_TIMEOUT_MS";
    pub const MAX_BUFFERED: &str = "ROVER_GATE_MAX_BUFFERED";
    pub const REPLAY_INTERVAL_MS: &str = "ROVER_GATE_REPLAY_INTERVAL_MS";
    pub const STREAM_CAPACITY: &str = "ROVER_GATE_STREAM_CAPACITY";
    pub const CONSULT_STANDING: &str = "ROVER_GATE_CONSULT_STANDING";
    /// SQLite path. Unset means an in-memory database.
    pub const DB_PATH: &str = "ROVER_GATE_DB";
}

/// Errors reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("could not open store: {0}")]
    Store(#[from] rover_gate_store::StoreError),
}

/// Configuration for the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Namespace the mutex and latest-block keys live under.
    pub namespace: ChainNamespace,
    /// SQLite database path, or `None` for an in-memory database.
    pub db_path: Option<PathBuf>,
    /// Intake pipeline configuration.
    pub intake: IntakeConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            namespace: ChainNamespace::default(),
            db_path: None,
            intake: IntakeConfig::default(),
        }
    }
}

impl GateConfig {
    /// Create configuration from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `BC_MINER_MUTEX`: `true` enables mutex gating (default: off)
    /// - `BC_SUPER_COLLIDER`: key namespace, lower-cased (default: bc)
    /// - `ROVER_GATE_STATE_TIMEOUT_MS`: mutex read timeout (default: 500)
    /// - `ROVER_GATE_MAX_BUFFERED`: per-rover buffer bound (default: 1024)
    /// - `ROVER_GATE_REPLAY_INTERVAL_MS`: replay interval (default: 250)
    /// - `ROVER_GATE_STREAM_CAPACITY`: inbound channel size (default: 256)
    /// - `ROVER_GATE_CONSULT_STANDING`: flag blocks from unsynced rovers (default: false)
    /// - `ROVER_GATE_DB`: SQLite path (default: in-memory)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = IntakeConfig::default();

        let namespace = lookup(vars::SUPER_COLLIDER)
            .filter(|v| !v.trim().is_empty())
            .map(|v| ChainNamespace::new(v.trim()))
            .unwrap_or_default();

        let intake = IntakeConfig {
            gating_enabled: lookup(vars::MINER_MUTEX).as_deref() == Some("true"),
            state_read_timeout: parse_millis(&lookup, vars::STATE_TIMEOUT_MS)?
                .unwrap_or(defaults.state_read_timeout),
            max_buffered_per_rover: parse_count(&lookup, vars::MAX_BUFFERED)?
                .unwrap_or(defaults.max_buffered_per_rover),
            replay_interval: parse_millis(&lookup, vars::REPLAY_INTERVAL_MS)?
                .unwrap_or(defaults.replay_interval),
            stream_capacity: parse_count(&lookup, vars::STREAM_CAPACITY)?
                .unwrap_or(defaults.stream_capacity),
            consult_standing: parse_flag(&lookup, vars::CONSULT_STANDING)?
                .unwrap_or(defaults.consult_standing),
            ..defaults
        };

        Ok(Self {
            namespace,
            db_path: lookup(vars::DB_PATH)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            intake,
        })
    }

    /// Open the configured SQLite store.
    pub fn open_store(&self) -> Result<SqliteStore, ConfigError> {
        let store = match &self.db_path {
            Some(path) => SqliteStore::open(path)?,
            None => SqliteStore::open_memory()?,
        };
        Ok(store)
    }
}

fn parse_count<F>(lookup: &F, var: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value,
            reason: "must be greater than zero".into(),
        }),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

fn parse_millis<F>(lookup: &F, var: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_count(lookup, var)?.map(|ms| Duration::from_millis(ms as u64)))
}

fn parse_flag<F>(lookup: &F, var: &'static str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(Some(true)),
        "false" | "0" | "no" => Ok(Some(false)),
        _ => Err(ConfigError::Invalid {
            var,
            value,
            reason: "expected true or false".into(),
        }),
    }
}
