use super::types::{SensorKind, SensorSample, Vector3};
use crate::error::SensorError;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub type SensorReceiver = mpsc::Receiver<Result<Vector3, SensorError>>;

/// Hardware motion-sensor event streams
pub trait MotionSensorSource: Send + Sync {
    /// Subscribe to one sensor at the given sampling period.
    ///
    /// Returns `None` when the sensor does not exist on this device.
    fn subscribe(&self, kind: SensorKind, period: Duration) -> Option<SensorReceiver>;
}

/// Retains only the latest accelerometer and gyroscope samples
pub struct SensorSampler {
    source: Arc<dyn MotionSensorSource>,
    period: Duration,
    accelerometer: Arc<RwLock<Option<SensorSample>>>,
    gyroscope: Arc<RwLock<Option<SensorSample>>>,
    subscription: Mutex<Option<CancellationToken>>,
}

impl SensorSampler {
    pub fn new(source: Arc<dyn MotionSensorSource>, period: Duration) -> Self {
        Self {
            source,
            period,
            accelerometer: Arc::new(RwLock::new(None)),
            gyroscope: Arc::new(RwLock::new(None)),
            subscription: Mutex::new(None),
        }
    }

    /// Begin sampling; repeated calls are no-ops.
    ///
    /// Without a tokio runtime or without sensors this silently does nothing.
    pub fn start(&self) {
        let mut subscription = self.subscription.lock();
        if subscription.is_some() {
            debug!("Sensor sampler already running");
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime available, sensor sampling disabled");
            return;
        };

        let token = CancellationToken::new();
        let mut subscribed = 0;

        for kind in [SensorKind::Accelerometer, SensorKind::Gyroscope] {
            match self.source.subscribe(kind, self.period) {
                Some(receiver) => {
                    runtime.spawn(Self::sample_loop(
                        kind,
                        receiver,
                        Arc::clone(self.slot(kind)),
                        token.clone(),
                    ));
                    subscribed += 1;
                }
                None => debug!("No {} available on this device", kind),
            }
        }

        if subscribed == 0 {
            debug!("No motion sensors available, sensor sampling disabled");
            return;
        }

        info!(
            "Sensor sampling started ({} sensor(s), period {:?})",
            subscribed, self.period
        );
        *subscription = Some(token);
    }

    /// Cancel subscriptions; a second call is a no-op
    pub fn stop(&self) {
        if let Some(token) = self.subscription.lock().take() {
            token.cancel();
            info!("Sensor sampling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.subscription.lock().is_some()
    }

    pub fn latest_accelerometer(&self) -> Option<Vector3> {
        (*self.accelerometer.read()).map(|sample| sample.vector)
    }

    pub fn latest_gyroscope(&self) -> Option<Vector3> {
        (*self.gyroscope.read()).map(|sample| sample.vector)
    }

    pub fn latest_sample(&self, kind: SensorKind) -> Option<SensorSample> {
        *self.slot(kind).read()
    }

    /// Whether a sample exists and is no older than `max_age`
    pub fn is_fresh(&self, kind: SensorKind, max_age: Duration) -> bool {
        self.latest_sample(kind)
            .map(|sample| sample.age() <= max_age)
            .unwrap_or(false)
    }

    /// Store a reading as it arrives from a stream
    pub(crate) fn ingest(&self, kind: SensorKind, reading: Result<Vector3, SensorError>) {
        Self::store(kind, self.slot(kind), reading);
    }

    fn slot(&self, kind: SensorKind) -> &Arc<RwLock<Option<SensorSample>>> {
        match kind {
            SensorKind::Accelerometer => &self.accelerometer,
            SensorKind::Gyroscope => &self.gyroscope,
        }
    }

    fn store(
        kind: SensorKind,
        slot: &RwLock<Option<SensorSample>>,
        reading: Result<Vector3, SensorError>,
    ) {
        match reading {
            Ok(vector) if vector.is_finite() => {
                trace!("{} sample: {:?}", kind, vector);
                *slot.write() = Some(SensorSample::new(vector));
            }
            Ok(vector) => {
                warn!("Discarding non-finite {} sample: {:?}", kind, vector);
                *slot.write() = None;
            }
            Err(e) => {
                warn!("{} stream error, no reading available: {}", kind, e);
                *slot.write() = None;
            }
        }
    }

    async fn sample_loop(
        kind: SensorKind,
        mut receiver: SensorReceiver,
        slot: Arc<RwLock<Option<SensorSample>>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                reading = receiver.recv() => match reading {
                    Some(reading) => Self::store(kind, &slot, reading),
                    None => {
                        debug!("{} stream closed", kind);
                        break;
                    }
                },
            }
        }
        trace!("{} sample loop exited", kind);
    }
}

impl Drop for SensorSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
