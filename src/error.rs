/// Error types for the sensor bridge
///
/// Connection lifecycle failures end a session and become the process exit
/// status. Decode and storage failures stay at the notification that caused them.
use bluer::{Address, Uuid};
use thiserror::Error;

use crate::bluetooth::identity::IdentityField;

/// Failures reported by the wireless transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] bluer::Error),

    #[error("characteristic {0} not found on device")]
    CharacteristicNotFound(Uuid),

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("{0}")]
    Rejected(String),
}

/// Terminal failures of a connection session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(#[source] TransportError),

    #[error("could not find device with address {address}")]
    DeviceNotFound { address: Address },

    #[error("failed to connect to {address}: {source}")]
    ConnectFailed {
        address: Address,
        #[source]
        source: TransportError,
    },

    #[error("failed to read {field} ({uuid}): {reason}")]
    IdentityReadFailed {
        field: IdentityField,
        uuid: Uuid,
        reason: String,
    },

    #[error("failed to {step} on {uuid}: {source}")]
    SubscriptionFailed {
        step: &'static str,
        uuid: Uuid,
        #[source]
        source: TransportError,
    },

    #[error("link to {address} lost")]
    LinkLost { address: Address },
}

impl SessionError {
    /// Process exit status for this failure. 0 and 1 are taken by clean
    /// shutdown and configuration errors.
    pub fn exit_code(&self) -> u8 {
        match self {
            SessionError::DeviceNotFound { .. } => 2,
            SessionError::ConnectFailed { .. } => 3,
            SessionError::IdentityReadFailed { .. } => 4,
            SessionError::SubscriptionFailed { .. } => 5,
            SessionError::LinkLost { .. } => 6,
            SessionError::AdapterUnavailable(_) => 7,
        }
    }
}

/// Errors decoding a notification payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed payload: expected {expected} bytes, got {actual}")]
    MalformedPayload { expected: usize, actual: usize },
}

/// Errors talking to the record store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("invalid table name {0:?}: expected letters, digits and underscores")]
    InvalidTable(String),

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("storage write failed after {attempts} attempt(s): {reason}")]
    WriteFailed { attempts: u32, reason: String },
}

/// Errors building the startup configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0}")]
    Usage(String),

    #[error("missing {name}: pass it as an argument or set {env}\n\n{usage}")]
    Missing {
        name: &'static str,
        env: &'static str,
        usage: &'static str,
    },

    #[error("invalid device address {0:?} (format: xx:xx:xx:xx:xx:xx)")]
    InvalidAddress(String),

    #[error("invalid {name} {value:?}: expected a non-negative integer")]
    InvalidNumber { name: &'static str, value: String },

    #[error("unexpected argument {0:?}")]
    UnexpectedArgument(String),
}
