//! Server configuration module.
//!
//! This module provides configuration loading for the simulator from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `LATENCY_SIM_LISTEN_ADDR`: Address to listen on (default: `0.0.0.0:8080`)
//! - `LATENCY_SIM_POLLING_METHOD`: `short_polling`, `long_polling` or `sse` (default: `short_polling`)
//! - `LATENCY_SIM_PROCESS_TIME_MS`: Delay of the initial run in milliseconds (default: `5000`)
//! - `LATENCY_SIM_ERROR_RATE`: Error rate of the initial run (default: `0.1`)
//! - `LATENCY_SIM_TIMEOUT_LIMIT_MS`: Long-poll wait timeout in milliseconds (default: `30000`)
//! - `LATENCY_SIM_RESET_ERROR_RATE`: `err_rate` used when `/reset` omits it (default: `0.1`)
//! - `LATENCY_SIM_ERROR_DISTRIBUTION`: `uniform` or `exponential` (default: `uniform`)
//! - `LATENCY_SIM_AUTOSTART`: Start the initial run at boot (default: `false`)
//! - `LATENCY_SIM_SEED`: Seed for the error draw (default: OS entropy)
//!
//! # Invariants
//!
//! - Error rates are always in [0, 1]
//! - An unknown polling method is a configuration error, so the server
//!   refuses to start rather than serving without a `/status` route

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::messages::ResetDefaults;
use crate::protocol::PollingMethod;
use crate::simulation::{ErrorDistribution, RunParams, SimulationOptions};

const LISTEN_ADDR: &str = "LATENCY_SIM_LISTEN_ADDR";
const POLLING_METHOD: &str = "LATENCY_SIM_POLLING_METHOD";
const PROCESS_TIME_MS: &str = "LATENCY_SIM_PROCESS_TIME_MS";
const ERROR_RATE: &str = "LATENCY_SIM_ERROR_RATE";
const TIMEOUT_LIMIT_MS: &str = "LATENCY_SIM_TIMEOUT_LIMIT_MS";
const RESET_ERROR_RATE: &str = "LATENCY_SIM_RESET_ERROR_RATE";
const ERROR_DISTRIBUTION: &str = "LATENCY_SIM_ERROR_DISTRIBUTION";
const AUTOSTART: &str = "LATENCY_SIM_AUTOSTART";
const SEED: &str = "LATENCY_SIM_SEED";

/// Server configuration.
///
/// Contains all configuration parameters needed to run the simulator.
///
/// # Post-conditions
///
/// When constructed via `from_env()`:
/// - `error_rate` and `reset_error_rate` are in [0, 1]
/// - `polling_method` is one of the supported protocols
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address to listen on for HTTP connections.
    pub listen_addr: SocketAddr,
    /// Protocol used to serve `/status`.
    pub polling_method: PollingMethod,
    /// Delay of the initial run.
    pub process_time: Duration,
    /// Error rate of the initial run.
    pub error_rate: f64,
    /// Maximum time a long-poll request blocks.
    pub timeout_limit: Duration,
    /// `err_rate` applied when a reset request omits it.
    pub reset_error_rate: f64,
    /// Distribution of the error draw.
    pub error_distribution: ErrorDistribution,
    /// Whether the initial run starts at boot instead of waiting for `/reset`.
    pub autostart: bool,
    /// Seed for the error draw.
    pub seed: Option<u64>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], Self::DEFAULT_PORT)),
            polling_method: PollingMethod::default(),
            process_time: RunParams::DEFAULT_DELAY,
            error_rate: RunParams::DEFAULT_ERROR_RATE,
            timeout_limit: RunParams::DEFAULT_WAIT_TIMEOUT,
            reset_error_rate: ResetDefaults::DEFAULT_ERR_RATE,
            error_distribution: ErrorDistribution::default(),
            autostart: false,
            seed: None,
        }
    }
}

impl ServerConfig {
    /// Default port for the server.
    pub const DEFAULT_PORT: u16 = 8080;

    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is set to a value that does not parse
    /// or is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    ///
    /// Unset variables take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is set to a value that does not parse
    /// or is out of range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let process_time = parse_var::<u64>(&lookup, PROCESS_TIME_MS)?
            .map_or(defaults.process_time, Duration::from_millis);
        let timeout_limit = parse_var::<u64>(&lookup, TIMEOUT_LIMIT_MS)?
            .map_or(defaults.timeout_limit, Duration::from_millis);

        Ok(Self {
            listen_addr: parse_var(&lookup, LISTEN_ADDR)?.unwrap_or(defaults.listen_addr),
            polling_method: parse_var(&lookup, POLLING_METHOD)?
                .unwrap_or(defaults.polling_method),
            process_time,
            error_rate: load_rate(&lookup, ERROR_RATE)?.unwrap_or(defaults.error_rate),
            timeout_limit,
            reset_error_rate: load_rate(&lookup, RESET_ERROR_RATE)?
                .unwrap_or(defaults.reset_error_rate),
            error_distribution: parse_var(&lookup, ERROR_DISTRIBUTION)?
                .unwrap_or(defaults.error_distribution),
            autostart: parse_var(&lookup, AUTOSTART)?.unwrap_or(defaults.autostart),
            seed: parse_var(&lookup, SEED)?,
        })
    }

    /// Parameters of the initial run.
    #[must_use]
    pub const fn initial_params(&self) -> RunParams {
        RunParams {
            delay: self.process_time,
            error_rate: self.error_rate,
            response_latency: Duration::ZERO,
            wait_timeout: self.timeout_limit,
        }
    }

    /// Options for constructing the simulation.
    #[must_use]
    pub const fn simulation_options(&self) -> SimulationOptions {
        SimulationOptions {
            initial: self.initial_params(),
            distribution: self.error_distribution,
            seed: self.seed,
        }
    }

    /// Defaults applied to fields omitted from `/reset` requests.
    #[must_use]
    pub fn reset_defaults(&self) -> ResetDefaults {
        ResetDefaults {
            err_rate: self.reset_error_rate,
            ..ResetDefaults::default()
        }
    }
}

/// Parse a variable if it is set.
///
/// # Errors
///
/// Returns an error if the value is set but does not parse.
fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}': {e}"),
            })
        })
        .transpose()
}

/// Parse a probability if it is set.
///
/// # Errors
///
/// Returns an error if the value does not parse or is outside [0, 1].
fn load_rate(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<f64>, ConfigError> {
    let rate = parse_var::<f64>(lookup, name)?;
    match rate {
        Some(value) if !(0.0..=1.0).contains(&value) => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("{value} is not between 0 and 1"),
        }),
        _ => Ok(rate),
    }
}
