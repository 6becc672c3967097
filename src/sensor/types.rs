use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Three-axis reading in device coordinates (m/s^2 or rad/s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Magnitude of the component in the screen plane
    pub fn horizontal_magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    Gyroscope,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Accelerometer => "accelerometer",
            SensorKind::Gyroscope => "gyroscope",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most recent sample of one sensor; immutable once stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub vector: Vector3,
    pub timestamp: Instant,
}

impl SensorSample {
    pub fn new(vector: Vector3) -> Self {
        Self {
            vector,
            timestamp: Instant::now(),
        }
    }

    pub fn age(&self) -> std::time::Duration {
        self.timestamp.elapsed()
    }
}
