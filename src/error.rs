use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParcelwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Remote store error: {0}")]
    Store(#[from] StoreError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl ParcelwatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures reported by sensor drivers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("{sensor} is not initialized")]
    NotInitialized { sensor: &'static str },

    #[error("{sensor} transaction failed: {details}")]
    Transport {
        sensor: &'static str,
        details: String,
    },

    #[error("{sensor} returned a non-numeric sample")]
    NotANumber { sensor: &'static str },

    #[error("{sensor} sample out of range: {details}")]
    OutOfRange {
        sensor: &'static str,
        details: String,
    },
}

/// Failures reported by the remote key-path store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Remote store is not configured")]
    NotConfigured,

    #[error("{method} {path} returned HTTP {status}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
    },

    #[error("{method} {path} failed: {details}")]
    Transport {
        method: &'static str,
        path: String,
        details: String,
    },

    #[error("{method} {path} timed out after {timeout_ms} ms")]
    Timeout {
        method: &'static str,
        path: String,
        timeout_ms: u64,
    },

    #[error("Malformed document at {path}: {details}")]
    Malformed { path: String, details: String },
}

#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, ParcelwatchError>;
