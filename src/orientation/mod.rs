mod estimator;
mod types;

pub use estimator::{classify_gravity, compute_capture_rotation, OrientationEstimator};
pub use types::{CaptureRotationResult, DeviceOrientation, DeviceOrientationReading};
