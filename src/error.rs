use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrientcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Operation '{operation}' not allowed in state {state}")]
    InvalidState { operation: String, state: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl OrientcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn invalid_state<S: Into<String>, T: Into<String>>(operation: S, state: T) -> Self {
        Self::InvalidState {
            operation: operation.into(),
            state: state.into(),
        }
    }
}

/// Coarse classification used to pick a recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// User action required, never retried automatically
    PermissionDenied,
    /// No usable camera for this session
    HardwareUnavailable,
    /// Busy, timed out or disconnected; retried with backoff
    TransientPlatformFailure,
    /// Caller raced another transition
    InvalidStateTransition,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::PermissionDenied => write!(f, "permission_denied"),
            ErrorKind::HardwareUnavailable => write!(f, "hardware_unavailable"),
            ErrorKind::TransientPlatformFailure => write!(f, "transient_platform_failure"),
            ErrorKind::InvalidStateTransition => write!(f, "invalid_state_transition"),
        }
    }
}

/// Failures reported by the platform camera and permission collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Permission denied for {capability}")]
    PermissionDenied { capability: String },

    #[error("Camera hardware unavailable: {details}")]
    HardwareUnavailable { details: String },

    #[error("Camera busy: {details}")]
    Busy { details: String },

    #[error("Camera operation '{operation}' timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    #[error("Camera disconnected")]
    Disconnected,

    #[error("Platform camera failure: {details}")]
    Platform { details: String },
}

impl CameraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            CameraError::HardwareUnavailable { .. } => ErrorKind::HardwareUnavailable,
            CameraError::Busy { .. }
            | CameraError::Timeout { .. }
            | CameraError::Disconnected
            | CameraError::Platform { .. } => ErrorKind::TransientPlatformFailure,
        }
    }

    /// Whether an automatic retry may fix this error
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::TransientPlatformFailure
    }

    pub fn platform<S: Into<String>>(details: S) -> Self {
        Self::Platform {
            details: details.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Media source {path} not found")]
    SourceMissing { path: PathBuf },

    #[error("Failed to save media to {path}: {details}")]
    SaveFailed { path: PathBuf, details: String },

    #[error("Failed to write metadata: {details}")]
    Metadata { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("Sensor {sensor} unavailable")]
    Unavailable { sensor: String },

    #[error("Sensor stream error: {details}")]
    Stream { details: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Event bus channel closed")]
    ChannelClosed,

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceInfoError {
    #[error("Device info query failed: {details}")]
    QueryFailed { details: String },
}

pub type Result<T> = std::result::Result<T, OrientcamError>;
