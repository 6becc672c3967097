use super::types::{CaptureRotationResult, DeviceOrientation, DeviceOrientationReading};
use crate::config::SensorConfig;
use crate::correction::{CorrectionTable, LensDirection};
use crate::device::DeviceIdentity;
use crate::sensor::{SensorKind, SensorSampler, Vector3};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

const ACCELEROMETER_WEIGHT: f64 = 0.5;
const GYROSCOPE_WEIGHT: f64 = 0.3;
const IDENTITY_WEIGHT: f64 = 0.2;

/// Bucket a gravity vector into a cardinal orientation.
///
/// Returns `None` when the in-plane gravity is below `flat_threshold`, since a
/// device lying flat has no meaningful rotation.
pub fn classify_gravity(vector: Vector3, flat_threshold: f64) -> Option<DeviceOrientation> {
    if !vector.is_finite() || vector.horizontal_magnitude() < flat_threshold {
        return None;
    }
    let angle = vector.x.atan2(vector.y).to_degrees();
    Some(DeviceOrientation::from_degrees(angle.round() as i32))
}

/// `(sensor - device + 360) % 360`, then the correction offset, normalized to [0, 360)
pub fn compute_capture_rotation(
    sensor_orientation_degrees: u16,
    device_orientation_degrees: u16,
    correction_offset_degrees: u16,
) -> u16 {
    let sensor = (sensor_orientation_degrees % 360) as u32;
    let device = (device_orientation_degrees % 360) as u32;
    let raw = (sensor + 360 - device) % 360;
    ((raw + (correction_offset_degrees % 360) as u32) % 360) as u16
}

/// On-demand orientation and capture-rotation estimates
pub struct OrientationEstimator {
    sampler: Arc<SensorSampler>,
    identity: DeviceIdentity,
    corrections: Arc<CorrectionTable>,
    flat_threshold: f64,
    max_sample_age: Duration,
    last_orientation: Mutex<Option<DeviceOrientation>>,
}

impl OrientationEstimator {
    pub fn new(
        sampler: Arc<SensorSampler>,
        identity: DeviceIdentity,
        corrections: Arc<CorrectionTable>,
        config: &SensorConfig,
    ) -> Self {
        Self {
            sampler,
            identity,
            corrections,
            flat_threshold: config.flat_threshold,
            max_sample_age: config.max_sample_age(),
            last_orientation: Mutex::new(None),
        }
    }

    pub fn sampler(&self) -> &Arc<SensorSampler> {
        &self.sampler
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Current discrete orientation.
    ///
    /// Missing, stale or flat readings keep the previously returned value
    /// (portrait-up before any reading).
    pub fn current_reading(&self) -> DeviceOrientationReading {
        let confidence = self.confidence();
        let sample = self
            .sampler
            .latest_sample(SensorKind::Accelerometer)
            .filter(|sample| sample.age() <= self.max_sample_age);

        let mut last = self.last_orientation.lock();
        let measured = sample.and_then(|sample| {
            classify_gravity(sample.vector, self.flat_threshold).map(|o| (o, sample.timestamp))
        });

        match measured {
            Some((orientation, timestamp)) => {
                if *last != Some(orientation) {
                    debug!("Device orientation estimated as {}", orientation);
                }
                *last = Some(orientation);
                DeviceOrientationReading {
                    orientation,
                    confidence,
                    source_timestamp: Some(timestamp),
                }
            }
            None => {
                let orientation = last.unwrap_or_default();
                trace!("No usable gravity reading, keeping {}", orientation);
                DeviceOrientationReading {
                    orientation,
                    confidence,
                    source_timestamp: None,
                }
            }
        }
    }

    /// Capture rotation for a camera with the given sensor mounting and lens
    pub fn capture_rotation(
        &self,
        sensor_orientation_degrees: u16,
        lens: LensDirection,
    ) -> CaptureRotationResult {
        let reading = self.current_reading();
        let correction = self.corrections.correction_for(
            &self.identity.manufacturer,
            self.identity.model_key(),
            lens,
        );

        let final_rotation_degrees = compute_capture_rotation(
            sensor_orientation_degrees,
            reading.angle_degrees(),
            correction.rotation_offset_degrees,
        );

        debug!(
            "Capture rotation {}° (sensor {}°, device {}, correction {:?}, confidence {:.2})",
            final_rotation_degrees,
            sensor_orientation_degrees,
            reading.orientation,
            correction,
            reading.confidence
        );

        CaptureRotationResult {
            final_rotation_degrees,
            device_orientation: reading.orientation,
            sensor_orientation_degrees: sensor_orientation_degrees % 360,
            lens,
            correction,
            confidence: reading.confidence,
        }
    }

    /// Weighted signal availability, clamped to 1.0
    pub fn confidence(&self) -> f64 {
        let mut score = 0.0;
        if self.sampler.latest_accelerometer().is_some() {
            score += ACCELEROMETER_WEIGHT;
        }
        if self.sampler.latest_gyroscope().is_some() {
            score += GYROSCOPE_WEIGHT;
        }
        if !self.identity.is_unknown() {
            score += IDENTITY_WEIGHT;
        }
        f64::min(score, 1.0)
    }

    /// Last orientation handed out, if any
    pub fn last_orientation(&self) -> Option<DeviceOrientation> {
        *self.last_orientation.lock()
    }
}
