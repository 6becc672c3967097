use super::operations::{OperationKind, OperationRegistry, OperationTicket};
use super::state::{
    CameraLifecycleState, LifecycleFailure, OrientationLockState, RejectReason, TransitionKind,
    TransitionOutcome,
};
use crate::config::OrientcamConfig;
use crate::correction::{CorrectionTable, LensDirection};
use crate::device::{DeviceIdentity, DeviceIdentityResolver, DeviceInfoProvider, StaticDeviceInfo};
use crate::error::{CameraError, OrientcamError, Result};
use crate::events::{LifecycleEvent, LifecycleEventBus};
use crate::orientation::{CaptureRotationResult, DeviceOrientation, OrientationEstimator};
use crate::platform::{
    CameraHandle, FileMediaStorage, MediaRef, MediaStorage, PermissionProvider, PlatformCamera,
};
use crate::recovery::{RecoveryAction, RecoveryManager, RetryPolicy};
use crate::sensor::{MotionSensorSource, SensorSampler};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(super) struct RecordingSession {
    pub(super) rotation: CaptureRotationResult,
    pub(super) started_at: Instant,
}

/// Mutable session state; the lock is never held across an await
pub(super) struct Core {
    pub(super) state: CameraLifecycleState,
    pub(super) in_flight: Option<TransitionKind>,
    /// Bumped whenever a transition is admitted or forcibly cancelled
    pub(super) epoch: u64,
    pub(super) handle: Option<CameraHandle>,
    pub(super) lens: LensDirection,
    pub(super) recording: Option<RecordingSession>,
    pub(super) orientation_lock: OrientationLockState,
    pub(super) applied_orientation: Option<DeviceOrientation>,
    pub(super) last_orientation_change: Option<Instant>,
    pub(super) last_error: Option<LifecycleFailure>,
    pub(super) pending_retry: Option<CancellationToken>,
    /// Set between backgrounding and foregrounding
    pub(super) backgrounded: bool,
    /// A retry came due or was pending while backgrounded; runs on foreground
    pub(super) deferred_retry: bool,
    pub(super) disposed: bool,
}

pub(super) struct Inner {
    pub(super) config: OrientcamConfig,
    pub(super) platform: Arc<dyn PlatformCamera>,
    pub(super) permissions: Arc<dyn PermissionProvider>,
    pub(super) storage: Arc<dyn MediaStorage>,
    pub(super) estimator: Arc<OrientationEstimator>,
    pub(super) core: Mutex<Core>,
    pub(super) state_tx: watch::Sender<CameraLifecycleState>,
    pub(super) events: LifecycleEventBus,
    pub(super) operations: OperationRegistry,
    pub(super) recovery: Mutex<RecoveryManager>,
}

impl Inner {
    /// Single path through which the lifecycle state changes
    pub(super) fn set_state(&self, core: &mut Core, state: CameraLifecycleState) {
        if core.state == state {
            return;
        }

        let from = std::mem::replace(&mut core.state, state.clone());
        info!("Camera lifecycle: {} -> {}", from, state);
        self.state_tx.send_replace(state.clone());
        self.events.publish(LifecycleEvent::StateChanged {
            from,
            to: state,
            timestamp: SystemTime::now(),
        });
    }
}

/// Owns the camera session and serializes every transition on it.
///
/// Cloning is cheap; all clones drive the same session.
#[derive(Clone)]
pub struct CameraLifecycleController {
    pub(super) inner: Arc<Inner>,
}

/// Admission token for one transition; clears the in-flight flag on drop
pub(super) struct TransitionGuard {
    inner: Arc<Inner>,
    kind: TransitionKind,
    epoch: u64,
    ticket: OperationTicket,
}

impl TransitionGuard {
    pub(super) fn kind(&self) -> TransitionKind {
        self.kind
    }

    /// Drive `future` unless the transition is cancelled first
    pub(super) async fn run<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.ticket.cancelled() => None,
            output = future => Some(output),
        }
    }
}

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        let mut core = self.inner.core.lock();
        if core.epoch == self.epoch && core.in_flight == Some(self.kind) {
            core.in_flight = None;
        }
    }
}

impl CameraLifecycleController {
    pub fn builder() -> CameraLifecycleControllerBuilder {
        CameraLifecycleControllerBuilder::new()
    }

    pub(super) fn new(
        config: OrientcamConfig,
        platform: Arc<dyn PlatformCamera>,
        permissions: Arc<dyn PermissionProvider>,
        storage: Arc<dyn MediaStorage>,
        estimator: Arc<OrientationEstimator>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CameraLifecycleState::Uninitialized);
        let events = LifecycleEventBus::new(config.lifecycle.event_bus_capacity);
        let recovery = RecoveryManager::with_policy(RetryPolicy::from(&config.recovery));
        let core = Core {
            state: CameraLifecycleState::Uninitialized,
            in_flight: None,
            epoch: 0,
            handle: None,
            lens: config.camera.lens,
            recording: None,
            orientation_lock: OrientationLockState::default(),
            applied_orientation: None,
            last_orientation_change: None,
            last_error: None,
            pending_retry: None,
            backgrounded: false,
            deferred_retry: false,
            disposed: false,
        };

        Self {
            inner: Arc::new(Inner {
                config,
                platform,
                permissions,
                storage,
                estimator,
                core: Mutex::new(core),
                state_tx,
                events,
                operations: OperationRegistry::new(),
                recovery: Mutex::new(recovery),
            }),
        }
    }

    pub fn state(&self) -> CameraLifecycleState {
        self.inner.core.lock().state.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CameraLifecycleState> {
        self.inner.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.events.subscribe()
    }

    pub fn events(&self) -> &LifecycleEventBus {
        &self.inner.events
    }

    /// True while a transition owns the camera
    pub fn is_changing_state(&self) -> bool {
        self.inner.core.lock().in_flight.is_some()
    }

    pub fn transition_in_flight(&self) -> Option<TransitionKind> {
        self.inner.core.lock().in_flight
    }

    pub fn is_recording(&self) -> bool {
        self.inner.core.lock().recording.is_some()
    }

    pub fn recording_duration(&self) -> Option<Duration> {
        self.inner
            .core
            .lock()
            .recording
            .as_ref()
            .map(|session| session.started_at.elapsed())
    }

    pub fn orientation_lock(&self) -> OrientationLockState {
        self.inner.core.lock().orientation_lock
    }

    pub fn last_error(&self) -> Option<LifecycleFailure> {
        self.inner.core.lock().last_error.clone()
    }

    pub fn lens(&self) -> LensDirection {
        self.inner.core.lock().lens
    }

    pub fn camera_handle(&self) -> Option<CameraHandle> {
        self.inner.core.lock().handle.clone()
    }

    /// Orientation most recently applied to the capture pipeline
    pub fn applied_orientation(&self) -> Option<DeviceOrientation> {
        self.inner.core.lock().applied_orientation
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.core.lock().disposed
    }

    /// A retry timer is armed, or a retry waits for the app to return
    pub fn has_pending_retry(&self) -> bool {
        let core = self.inner.core.lock();
        core.pending_retry.is_some() || core.deferred_retry
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.recovery.lock().retry_count()
    }

    pub fn estimator(&self) -> &Arc<OrientationEstimator> {
        &self.inner.estimator
    }

    pub fn config(&self) -> &OrientcamConfig {
        &self.inner.config
    }

    /// Fresh capture rotation for the open camera
    pub fn capture_rotation(&self) -> Option<CaptureRotationResult> {
        let handle = self.camera_handle()?;
        Some(
            self.inner
                .estimator
                .capture_rotation(handle.sensor_orientation_degrees, handle.lens),
        )
    }

    /// Register caller-owned work tied to the session.
    ///
    /// The ticket is cancelled on backgrounding, dispose and forced resets.
    pub fn register_operation(&self, name: &str) -> OperationTicket {
        self.inner
            .operations
            .register(OperationKind::Background(name.to_string()))
    }

    pub fn active_operations(&self) -> Vec<OperationKind> {
        self.inner.operations.kinds()
    }

    /// Admit a transition or explain why not.
    ///
    /// `check` runs under the session lock, so the admission and the
    /// in-flight flag are set atomically with respect to other callers.
    pub(super) fn begin_transition<T, F>(
        &self,
        kind: TransitionKind,
        intermediate: Option<CameraLifecycleState>,
        check: F,
    ) -> std::result::Result<(TransitionGuard, T), TransitionOutcome>
    where
        F: FnOnce(&Core) -> std::result::Result<T, TransitionOutcome>,
    {
        let mut core = self.inner.core.lock();
        if core.disposed {
            return Err(TransitionOutcome::Rejected(RejectReason::Disposed));
        }
        if let Some(active) = core.in_flight {
            debug!("Rejecting {:?}, {:?} already in flight", kind, active);
            return Err(TransitionOutcome::Rejected(RejectReason::TransitionInFlight(
                active,
            )));
        }

        let value = check(&*core)?;
        let guard = self.admit(&mut core, kind);
        if let Some(state) = intermediate {
            self.inner.set_state(&mut core, state);
        }
        Ok((guard, value))
    }

    pub(super) fn admit(&self, core: &mut Core, kind: TransitionKind) -> TransitionGuard {
        core.in_flight = Some(kind);
        core.epoch += 1;
        debug!("Transition {:?} admitted (epoch {})", kind, core.epoch);

        TransitionGuard {
            inner: Arc::clone(&self.inner),
            kind,
            epoch: core.epoch,
            ticket: self
                .inner
                .operations
                .register(OperationKind::Transition(kind)),
        }
    }

    /// Apply `update` if the transition still owns the session
    pub(super) fn commit<R, F>(&self, guard: &TransitionGuard, update: F) -> Option<R>
    where
        F: FnOnce(&Inner, &mut Core) -> R,
    {
        let mut core = self.inner.core.lock();
        if guard.ticket.is_cancelled() || core.disposed || core.epoch != guard.epoch {
            debug!("Transition {:?} superseded, dropping its result", guard.kind);
            return None;
        }
        Some(update(&self.inner, &mut core))
    }

    /// Record a failed transition and move to `Error`.
    ///
    /// A running recording is stopped and discarded and the orientation lock
    /// released, so an error never leaves either behind.
    pub(super) async fn fail(&self, guard: &TransitionGuard, error: CameraError) -> TransitionOutcome {
        let failure = LifecycleFailure::from_camera_error(&error);
        let message = failure.message.clone();

        let cleanup = self.commit(guard, |inner, core| {
            let recording = core.recording.take().is_some();
            let locked = std::mem::take(&mut core.orientation_lock).locked;
            core.last_error = Some(failure.clone());
            inner.set_state(core, CameraLifecycleState::Error(failure.clone()));
            inner.events.publish(LifecycleEvent::TransitionFailed {
                transition: guard.kind,
                kind: failure.kind,
                message: failure.message.clone(),
            });
            if recording {
                inner.events.publish(LifecycleEvent::RecordingDiscarded {
                    reason: failure.message.clone(),
                });
            }
            if locked {
                inner.events.publish(LifecycleEvent::OrientationUnlocked);
            }

            let action = inner.recovery.lock().handle_error(&error);
            if let RecoveryAction::RetryAfterDelay(delay) = action {
                self.schedule_retry(inner, core, delay);
            }
            (recording, locked, core.handle.clone())
        });

        let Some((recording, locked, handle)) = cleanup else {
            return TransitionOutcome::Cancelled;
        };

        if let Some(handle) = handle {
            if recording {
                match self.inner.platform.stop_recording(&handle).await {
                    Ok(media) => self.discard_media(media).await,
                    Err(e) => debug!("Stopping recording after failure: {}", e),
                }
            }
            if locked {
                if let Err(e) = self.inner.platform.unlock_capture_orientation(&handle).await {
                    warn!("Failed to unlock capture orientation after failure: {}", e);
                }
            }
        }

        TransitionOutcome::Failed(message)
    }

    /// At most one automatic retry is pending at a time
    fn schedule_retry(&self, inner: &Inner, core: &mut Core, delay: Duration) {
        if core.pending_retry.is_some() {
            debug!("Camera retry already pending");
            return;
        }
        if core.backgrounded {
            debug!("App in background, camera retry deferred until foreground");
            core.deferred_retry = true;
            return;
        }

        let token = CancellationToken::new();
        core.pending_retry = Some(token.clone());
        inner.events.publish(LifecycleEvent::RetryScheduled {
            attempt: inner.recovery.lock().retry_count(),
            delay,
        });

        let controller = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => debug!("Pending camera retry cancelled"),
                _ = tokio::time::sleep(delay) => controller.run_scheduled_retry(token).await,
            }
        });
    }

    async fn run_scheduled_retry(&self, token: CancellationToken) {
        {
            let mut core = self.inner.core.lock();
            if token.is_cancelled() {
                return;
            }
            core.pending_retry = None;
            if core.backgrounded {
                debug!("App in background, camera retry deferred until foreground");
                core.deferred_retry = true;
                return;
            }
        }

        info!("Retrying camera initialization");
        let outcome = self.recover().await;
        debug!("Automatic retry finished: {:?}", outcome);
    }

    pub(super) async fn discard_media(&self, media: MediaRef) {
        if let Err(e) = tokio::fs::remove_file(&media.path).await {
            debug!("Could not remove discarded media {}: {}", media.path.display(), e);
        }
    }
}

/// Assembles a controller from its collaborators
pub struct CameraLifecycleControllerBuilder {
    config: Option<OrientcamConfig>,
    platform: Option<Arc<dyn PlatformCamera>>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    storage: Option<Arc<dyn MediaStorage>>,
    sensors: Option<Arc<dyn MotionSensorSource>>,
    device_info: Option<Arc<dyn DeviceInfoProvider>>,
    corrections: Option<CorrectionTable>,
}

impl CameraLifecycleControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            platform: None,
            permissions: None,
            storage: None,
            sensors: None,
            device_info: None,
            corrections: None,
        }
    }

    pub fn config(mut self, config: OrientcamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn PlatformCamera>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn MediaStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn sensors(mut self, sensors: Arc<dyn MotionSensorSource>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    pub fn device_info(mut self, device_info: Arc<dyn DeviceInfoProvider>) -> Self {
        self.device_info = Some(device_info);
        self
    }

    /// Replace the built-in correction table entirely
    pub fn corrections(mut self, corrections: CorrectionTable) -> Self {
        self.corrections = Some(corrections);
        self
    }

    pub async fn build(self) -> Result<CameraLifecycleController> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let platform = self
            .platform
            .ok_or_else(|| OrientcamError::system("Platform camera must be specified"))?;
        let permissions = self
            .permissions
            .ok_or_else(|| OrientcamError::system("Permission provider must be specified"))?;
        let sensors = self
            .sensors
            .ok_or_else(|| OrientcamError::system("Motion sensor source must be specified"))?;
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(FileMediaStorage::new()) as Arc<dyn MediaStorage>);

        let device_info: Arc<dyn DeviceInfoProvider> = match (self.device_info, config.device.as_ref()) {
            (Some(provider), _) => provider,
            (None, Some(device)) => Arc::new(StaticDeviceInfo::from(device)),
            (None, None) => Arc::new(StaticDeviceInfo::new(DeviceIdentity::unknown())),
        };
        let identity = DeviceIdentityResolver::new(device_info).resolve().await;

        let corrections = self
            .corrections
            .unwrap_or_else(|| CorrectionTable::builtin_with(&config.corrections));
        debug!(
            "Correction table covers {} manufacturer(s)",
            corrections.manufacturer_count()
        );

        let sampler = Arc::new(SensorSampler::new(sensors, config.sensor.sampling_period()));
        sampler.start();

        let estimator = Arc::new(OrientationEstimator::new(
            sampler,
            identity,
            Arc::new(corrections),
            &config.sensor,
        ));

        Ok(CameraLifecycleController::new(
            config,
            platform,
            permissions,
            storage,
            estimator,
        ))
    }
}

impl Default for CameraLifecycleControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
