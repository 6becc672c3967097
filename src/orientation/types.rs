use crate::correction::{LensDirection, ManufacturerCorrection};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Discrete physical orientation of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceOrientation {
    PortraitUp,
    LandscapeLeft,
    PortraitDown,
    LandscapeRight,
}

impl DeviceOrientation {
    pub const ALL: [DeviceOrientation; 4] = [
        DeviceOrientation::PortraitUp,
        DeviceOrientation::LandscapeLeft,
        DeviceOrientation::PortraitDown,
        DeviceOrientation::LandscapeRight,
    ];

    pub fn degrees(&self) -> u16 {
        match self {
            DeviceOrientation::PortraitUp => 0,
            DeviceOrientation::LandscapeLeft => 90,
            DeviceOrientation::PortraitDown => 180,
            DeviceOrientation::LandscapeRight => 270,
        }
    }

    /// Nearest cardinal orientation for any angle
    pub fn from_degrees(degrees: i32) -> Self {
        match (degrees.rem_euclid(360) + 45) / 90 % 4 {
            0 => DeviceOrientation::PortraitUp,
            1 => DeviceOrientation::LandscapeLeft,
            2 => DeviceOrientation::PortraitDown,
            _ => DeviceOrientation::LandscapeRight,
        }
    }

    pub fn is_landscape(&self) -> bool {
        matches!(
            self,
            DeviceOrientation::LandscapeLeft | DeviceOrientation::LandscapeRight
        )
    }
}

impl Default for DeviceOrientation {
    fn default() -> Self {
        DeviceOrientation::PortraitUp
    }
}

impl std::fmt::Display for DeviceOrientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceOrientation::PortraitUp => "portrait-up",
            DeviceOrientation::LandscapeLeft => "landscape-left",
            DeviceOrientation::PortraitDown => "portrait-down",
            DeviceOrientation::LandscapeRight => "landscape-right",
        };
        write!(f, "{} ({}°)", name, self.degrees())
    }
}

/// One orientation estimate; superseded by the next query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceOrientationReading {
    pub orientation: DeviceOrientation,
    /// 0.0 to 1.0, diagnostic only
    pub confidence: f64,
    /// Timestamp of the accelerometer sample used, `None` when the last
    /// known orientation was carried over
    pub source_timestamp: Option<Instant>,
}

impl DeviceOrientationReading {
    pub fn angle_degrees(&self) -> u16 {
        self.orientation.degrees()
    }

    /// True when the reading came from a fresh sample rather than the fallback
    pub fn is_measured(&self) -> bool {
        self.source_timestamp.is_some()
    }
}

/// Rotation to apply to a capture so the stored media appears upright
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureRotationResult {
    /// Always one of 0/90/180/270
    pub final_rotation_degrees: u16,
    pub device_orientation: DeviceOrientation,
    pub sensor_orientation_degrees: u16,
    pub lens: LensDirection,
    pub correction: ManufacturerCorrection,
    pub confidence: f64,
}
