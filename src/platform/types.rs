use crate::correction::LensDirection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Requested capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPreset {
    Low,
    Medium,
    High,
    Max,
}

impl ResolutionPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPreset::Low => "low",
            ResolutionPreset::Medium => "medium",
            ResolutionPreset::High => "high",
            ResolutionPreset::Max => "max",
        }
    }
}

/// An opened camera, as returned by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraHandle {
    pub id: u64,
    pub lens: LensDirection,
    /// Sensor mounting angle relative to the natural device orientation
    pub sensor_orientation_degrees: u16,
}

/// Platform-owned reference to captured media (usually a temp file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub path: PathBuf,
}

impl MediaRef {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn extension(&self) -> &str {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Camera,
    Microphone,
    Storage,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Camera => write!(f, "camera"),
            Capability::Microphone => write!(f, "microphone"),
            Capability::Storage => write!(f, "storage"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionStatus {
    Granted,
    Denied,
    PermanentlyDenied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        *self == PermissionStatus::Granted
    }
}

/// Inbound app lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleEvent {
    Backgrounding,
    Foregrounding,
}

/// Inbound "orientation may have changed" notification.
///
/// Only a trigger: the actual orientation is recomputed from the sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrientationNotification {
    /// Bypass the unchanged-orientation and cooldown filters
    pub priority: bool,
}

impl OrientationNotification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority() -> Self {
        Self { priority: true }
    }
}
