use bluer::Address;
use std::env;
use std::time::Duration;

use crate::database::RetryPolicy;
use crate::error::ConfigError;
use crate::supervisor::ReconnectPolicy;

pub const USAGE: &str = "\
usage: sensortag-etl <address> <database-url> <database> <table> <sendinterval>

  address        sensortag address (format: xx:xx:xx:xx:xx:xx)   [SENSORTAG_ADDRESS]
  database-url   PostgreSQL URL, optionally with ?sslrootcert=   [DATABASE_URL]
  database       database for storage of results                [DATABASE_NAME]
  table          table for storage of results                   [DATABASE_TABLE]
  sendinterval   send interval to database [s]                  [SEND_INTERVAL_SECS]

Missing arguments are taken from the environment variable in brackets.
Optional: DISCOVERY_TIMEOUT_SECS, RECONNECT_ATTEMPTS, RECONNECT_BACKOFF_SECS,
STORE_MAX_ATTEMPTS, STORE_RETRY_WAIT_SECS.";

// (argument name, environment variable) in positional order
const POSITIONAL: [(&str, &str); 5] = [
    ("device address", "SENSORTAG_ADDRESS"),
    ("database URL", "DATABASE_URL"),
    ("database name", "DATABASE_NAME"),
    ("table name", "DATABASE_TABLE"),
    ("send interval", "SEND_INTERVAL_SECS"),
];

const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub address: Address,
    pub database_url: String,
    pub database_name: String,
    pub table: String,
    pub send_interval_secs: u64,
    pub discovery_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub store_retry: RetryPolicy,
}

impl SessionConfig {
    /// Load from command line arguments, falling back to the environment
    pub fn new() -> Result<Self, ConfigError> {
        // Load environment variables
        dotenv::dotenv().ok();

        Self::from_sources(env::args().skip(1), |key| env::var(key).ok())
    }

    /// Build a configuration from positional arguments and a variable lookup
    pub fn from_sources<I, F>(args: I, lookup: F) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let args: Vec<String> = args.into_iter().collect();
        if args.iter().any(|arg| arg == "-h" || arg == "--help") {
            return Err(ConfigError::Usage(USAGE.to_string()));
        }
        if let Some(extra) = args.get(POSITIONAL.len()) {
            return Err(ConfigError::UnexpectedArgument(extra.clone()));
        }

        let mut values = Vec::with_capacity(POSITIONAL.len());
        for (index, &(name, env)) in POSITIONAL.iter().enumerate() {
            let value = args
                .get(index)
                .cloned()
                .or_else(|| lookup(env))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing {
                    name,
                    env,
                    usage: USAGE,
                })?;
            values.push(value);
        }

        let address = values[0]
            .parse::<Address>()
            .map_err(|_| ConfigError::InvalidAddress(values[0].clone()))?;
        let send_interval_secs = parse_secs("send interval", &values[4])?;

        let optional = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                Some(value) if !value.trim().is_empty() => parse_secs(key, value.trim()),
                _ => Ok(default),
            }
        };

        let reconnect_defaults = ReconnectPolicy::default();
        let retry_defaults = RetryPolicy::default();

        Ok(SessionConfig {
            address,
            database_url: values[1].clone(),
            database_name: values[2].clone(),
            table: values[3].clone(),
            send_interval_secs,
            discovery_timeout: Duration::from_secs(optional(
                "DISCOVERY_TIMEOUT_SECS",
                DEFAULT_DISCOVERY_TIMEOUT_SECS,
            )?),
            reconnect: ReconnectPolicy {
                max_attempts: to_u32(
                    "RECONNECT_ATTEMPTS",
                    optional("RECONNECT_ATTEMPTS", reconnect_defaults.max_attempts as u64)?,
                )?,
                initial_backoff: Duration::from_secs(optional(
                    "RECONNECT_BACKOFF_SECS",
                    reconnect_defaults.initial_backoff.as_secs(),
                )?),
                ..reconnect_defaults
            },
            store_retry: RetryPolicy {
                max_attempts: to_u32(
                    "STORE_MAX_ATTEMPTS",
                    optional("STORE_MAX_ATTEMPTS", retry_defaults.max_attempts as u64)?,
                )?,
                wait: Duration::from_secs(optional(
                    "STORE_RETRY_WAIT_SECS",
                    retry_defaults.wait.as_secs(),
                )?),
            },
        })
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}

fn to_u32(name: &'static str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|_| ConfigError::InvalidNumber {
        name,
        value: value.to_string(),
    })
}
