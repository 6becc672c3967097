use super::sampler::{MotionSensorSource, SensorReceiver};
use super::types::{SensorKind, Vector3};
use crate::error::SensorError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Motion sensors driven by hand, for tests and the simulator
pub struct SimulatedMotionSensors {
    available: Vec<SensorKind>,
    senders: Mutex<HashMap<SensorKind, mpsc::Sender<Result<Vector3, SensorError>>>>,
}

impl SimulatedMotionSensors {
    /// Accelerometer and gyroscope both present
    pub fn new() -> Self {
        Self::with_sensors(&[SensorKind::Accelerometer, SensorKind::Gyroscope])
    }

    /// Only the listed sensors exist
    pub fn with_sensors(available: &[SensorKind]) -> Self {
        Self {
            available: available.to_vec(),
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver a reading to the current subscriber; false if nobody listens
    pub fn push(&self, kind: SensorKind, vector: Vector3) -> bool {
        self.send(kind, Ok(vector))
    }

    /// Deliver a stream error to the current subscriber
    pub fn fail(&self, kind: SensorKind, details: &str) -> bool {
        self.send(
            kind,
            Err(SensorError::Stream {
                details: details.to_string(),
            }),
        )
    }

    fn send(&self, kind: SensorKind, reading: Result<Vector3, SensorError>) -> bool {
        let senders = self.senders.lock();
        match senders.get(&kind) {
            Some(sender) => sender.try_send(reading).is_ok(),
            None => false,
        }
    }
}

impl Default for SimulatedMotionSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionSensorSource for SimulatedMotionSensors {
    fn subscribe(&self, kind: SensorKind, period: Duration) -> Option<SensorReceiver> {
        if !self.available.contains(&kind) {
            return None;
        }
        debug!("Simulated {} subscribed at {:?}", kind, period);
        let (sender, receiver) = mpsc::channel(32);
        self.senders.lock().insert(kind, sender);
        Some(receiver)
    }
}
