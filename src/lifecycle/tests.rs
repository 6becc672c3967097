use super::*;
use crate::config::OrientcamConfig;
use crate::correction::LensDirection;
use crate::device::{DeviceIdentity, StaticDeviceInfo};
use crate::error::{CameraError, ErrorKind, OrientcamError};
use crate::events::LifecycleEvent;
use crate::orientation::DeviceOrientation;
use crate::platform::{
    AppLifecycleEvent, Capability, MockPermissions, MockPlatformCamera, OrientationNotification,
    PermissionStatus, PlatformCall,
};
use crate::sensor::{SensorKind, SimulatedMotionSensors, Vector3};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

const G: f64 = 9.81;

struct Harness {
    controller: CameraLifecycleController,
    platform: Arc<MockPlatformCamera>,
    permissions: Arc<MockPermissions>,
    dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        Self::build(MockPermissions::granted(), None, Duration::ZERO).await
    }

    async fn build(
        permissions: MockPermissions,
        device: Option<DeviceIdentity>,
        latency: Duration,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(
            MockPlatformCamera::with_media_dir(dir.path().join("media")).with_latency(latency),
        );
        let permissions = Arc::new(permissions);

        let mut config = OrientcamConfig::default();
        config.camera.audio = false;
        config.capture.path = dir.path().join("captures").to_string_lossy().into_owned();

        let mut builder = CameraLifecycleController::builder()
            .config(config)
            .platform(platform.clone())
            .permissions(permissions.clone())
            .sensors(Arc::new(SimulatedMotionSensors::new()));
        if let Some(identity) = device {
            builder = builder.device_info(Arc::new(StaticDeviceInfo::new(identity)));
        }

        Self {
            controller: builder.build().await.unwrap(),
            platform,
            permissions,
            dir,
        }
    }

    async fn ready() -> Self {
        let harness = Self::new().await;
        assert_eq!(
            harness.controller.initialize().await,
            TransitionOutcome::Completed
        );
        harness
    }

    fn tilt(&self, orientation: DeviceOrientation) {
        let gravity = match orientation {
            DeviceOrientation::PortraitUp => Vector3::new(0.0, G, 0.3),
            DeviceOrientation::LandscapeLeft => Vector3::new(G, 0.0, 0.3),
            DeviceOrientation::PortraitDown => Vector3::new(0.0, -G, 0.3),
            DeviceOrientation::LandscapeRight => Vector3::new(-G, 0.0, 0.3),
        };
        self.controller
            .estimator()
            .sampler()
            .ingest(SensorKind::Accelerometer, Ok(gravity));
    }

    async fn rotate_to(&self, orientation: DeviceOrientation) -> TransitionOutcome {
        self.tilt(orientation);
        self.controller
            .on_orientation_changed(OrientationNotification::new())
            .await
    }
}

fn drain_states(events: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<CameraLifecycleState> {
    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::StateChanged { to, .. } = event {
            states.push(to);
        }
    }
    states
}

fn drain_types(events: &mut broadcast::Receiver<LifecycleEvent>) -> Vec<&'static str> {
    let mut types = Vec::new();
    while let Ok(event) = events.try_recv() {
        types.push(event.event_type());
    }
    types
}

#[tokio::test(start_paused = true)]
async fn test_initialize_walks_through_states() {
    let harness = Harness::new().await;
    let mut events = harness.controller.subscribe_events();
    assert_eq!(harness.controller.state(), CameraLifecycleState::Uninitialized);

    let outcome = harness.controller.initialize().await;

    assert!(outcome.is_completed());
    let states = drain_states(&mut events);
    assert_eq!(
        states,
        vec![
            CameraLifecycleState::RequestingPermission,
            CameraLifecycleState::Initializing,
            CameraLifecycleState::Ready,
        ]
    );
    assert!(states[..2].iter().all(|state| state.is_transitional()));
    assert!(!states[2].is_transitional());
    assert_eq!(
        *harness.controller.subscribe_state().borrow(),
        CameraLifecycleState::Ready
    );
    assert!(!harness.controller.is_changing_state());
    assert_eq!(harness.platform.initialize_count(), 1);
    assert_eq!(harness.permissions.request_count(), 0);

    let handle = harness.controller.camera_handle().unwrap();
    assert_eq!(handle.lens, LensDirection::Back);
    assert_eq!(handle.sensor_orientation_degrees, 90);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_twice_is_rejected() {
    let harness = Harness::ready().await;
    assert_eq!(
        harness.controller.initialize().await,
        TransitionOutcome::Rejected(RejectReason::InvalidState("Ready"))
    );
    assert_eq!(harness.platform.initialize_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_missing_permission_is_requested() {
    let harness = Harness::build(MockPermissions::denied(true), None, Duration::ZERO).await;

    assert_eq!(
        harness.controller.initialize().await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.permissions.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_waits_for_user() {
    let harness = Harness::build(MockPermissions::denied(false), None, Duration::ZERO).await;

    let outcome = harness.controller.initialize().await;

    assert!(matches!(outcome, TransitionOutcome::Failed(_)));
    let failure = harness.controller.last_error().unwrap();
    assert_eq!(failure.kind, ErrorKind::PermissionDenied);
    assert!(failure.is_permission_related());
    assert!(harness.controller.state().is_error());
    assert!(!harness.controller.has_pending_retry());
    assert_eq!(harness.platform.initialize_count(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.platform.initialize_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_recover_after_permission_granted() {
    let harness = Harness::build(MockPermissions::denied(false), None, Duration::ZERO).await;
    harness.controller.initialize().await;
    assert!(harness.controller.state().is_error());

    harness
        .permissions
        .set_status(Capability::Camera, PermissionStatus::Granted);
    let mut events = harness.controller.subscribe_events();

    assert_eq!(
        harness.controller.recover_from_error().await,
        TransitionOutcome::Completed
    );
    assert_eq!(
        drain_states(&mut events),
        vec![
            CameraLifecycleState::Uninitialized,
            CameraLifecycleState::RequestingPermission,
            CameraLifecycleState::Initializing,
            CameraLifecycleState::Ready,
        ]
    );
    assert!(harness.controller.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_recover_requires_error_state() {
    let harness = Harness::ready().await;
    assert_eq!(
        harness.controller.recover_from_error().await,
        TransitionOutcome::Rejected(RejectReason::InvalidState("Ready"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_initialize_admits_one() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(
        MockPlatformCamera::with_media_dir(dir.path()).with_latency(Duration::from_millis(100)),
    );
    let controller = CameraLifecycleController::builder()
        .platform(platform.clone())
        .permissions(Arc::new(MockPermissions::granted()))
        .sensors(Arc::new(SimulatedMotionSensors::new()))
        .build()
        .await
        .unwrap();

    let (first, second) = tokio::join!(controller.initialize(), controller.initialize());

    assert_eq!(first, TransitionOutcome::Completed);
    assert_eq!(
        second,
        TransitionOutcome::Rejected(RejectReason::TransitionInFlight(
            TransitionKind::Initialize
        ))
    );
    assert_eq!(platform.initialize_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retries_once_and_recovers() {
    let harness = Harness::new().await;
    harness.platform.fail_next(
        "initialize",
        CameraError::Busy {
            details: "held by another app".to_string(),
        },
    );

    let outcome = harness.controller.initialize().await;
    assert!(matches!(outcome, TransitionOutcome::Failed(_)));
    assert_eq!(
        harness.controller.last_error().unwrap().kind,
        ErrorKind::TransientPlatformFailure
    );
    assert!(harness.controller.has_pending_retry());
    assert_eq!(harness.controller.retry_count(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert_eq!(harness.platform.initialize_count(), 2);
    assert_eq!(harness.controller.retry_count(), 0);
    assert!(!harness.controller.has_pending_retry());
}

#[tokio::test(start_paused = true)]
async fn test_retry_waits_for_foreground() {
    let harness = Harness::new().await;
    harness.platform.fail_next(
        "initialize",
        CameraError::Busy {
            details: "held by another app".to_string(),
        },
    );
    harness.controller.initialize().await;
    assert!(harness.controller.has_pending_retry());

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
            .await,
        TransitionOutcome::Ignored(IgnoreReason::NotApplicable)
    );
    tokio::time::sleep(Duration::from_secs(5)).await;

    // The camera stays closed while the app is away
    assert_eq!(harness.platform.initialize_count(), 1);
    assert!(harness.controller.camera_handle().is_none());
    assert!(harness.controller.state().is_error());
    assert!(harness.controller.has_pending_retry());

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert_eq!(harness.platform.initialize_count(), 2);
    assert!(!harness.controller.has_pending_retry());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.platform.initialize_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_automatic_retries_are_bounded() {
    let harness = Harness::new().await;
    for _ in 0..4 {
        harness
            .platform
            .fail_next("initialize", CameraError::Disconnected);
    }

    harness.controller.initialize().await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    // One attempt plus three retries at 1s, 2s and 4s
    assert_eq!(harness.platform.initialize_count(), 4);
    assert!(harness.controller.state().is_error());
    assert!(!harness.controller.has_pending_retry());
}

#[tokio::test(start_paused = true)]
async fn test_first_orientation_change_applies_rotation() {
    let harness = Harness::ready().await;

    assert_eq!(
        harness.rotate_to(DeviceOrientation::LandscapeLeft).await,
        TransitionOutcome::Completed
    );

    // Back sensor at 90°, device at 90°
    assert_eq!(harness.platform.locked_rotation(), Some(0));
    assert_eq!(
        harness.controller.applied_orientation(),
        Some(DeviceOrientation::LandscapeLeft)
    );
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert!(!harness.controller.is_changing_state());
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_orientation_is_ignored() {
    let harness = Harness::ready().await;
    harness.rotate_to(DeviceOrientation::PortraitUp).await;
    let locks = harness.platform.count(&PlatformCall::LockCaptureOrientation(90));

    assert_eq!(
        harness.rotate_to(DeviceOrientation::PortraitUp).await,
        TransitionOutcome::Ignored(IgnoreReason::Unchanged)
    );
    assert_eq!(
        harness.platform.count(&PlatformCall::LockCaptureOrientation(90)),
        locks
    );
}

#[tokio::test(start_paused = true)]
async fn test_orientation_cooldown_and_bypasses() {
    let harness = Harness::ready().await;
    assert_eq!(
        harness.rotate_to(DeviceOrientation::PortraitUp).await,
        TransitionOutcome::Completed
    );

    let mut events = harness.controller.subscribe_events();
    tokio::time::advance(Duration::from_millis(500)).await;
    let outcome = harness.rotate_to(DeviceOrientation::LandscapeLeft).await;
    assert_eq!(outcome, TransitionOutcome::Ignored(IgnoreReason::Debounced));
    assert!(outcome.is_ignored());
    assert_eq!(harness.platform.locked_rotation(), Some(90));
    // Never passes through Recreating
    assert!(drain_states(&mut events).is_empty());
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);

    // Priority notifications skip the cooldown
    assert_eq!(
        harness
            .controller
            .on_orientation_changed(OrientationNotification::priority())
            .await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.platform.locked_rotation(), Some(0));

    // Landscape flips are always applied
    assert_eq!(
        harness.rotate_to(DeviceOrientation::LandscapeRight).await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.platform.locked_rotation(), Some(180));

    assert_eq!(
        harness.rotate_to(DeviceOrientation::PortraitUp).await,
        TransitionOutcome::Ignored(IgnoreReason::Debounced)
    );

    tokio::time::advance(Duration::from_millis(2600)).await;
    assert_eq!(
        harness.rotate_to(DeviceOrientation::PortraitUp).await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.platform.locked_rotation(), Some(90));
}

#[tokio::test(start_paused = true)]
async fn test_orientation_change_before_ready_is_rejected() {
    let harness = Harness::new().await;
    assert_eq!(
        harness.rotate_to(DeviceOrientation::LandscapeLeft).await,
        TransitionOutcome::Rejected(RejectReason::InvalidState("Uninitialized"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_orientation_change_during_switch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(
        MockPlatformCamera::with_media_dir(dir.path()).with_latency(Duration::from_millis(50)),
    );
    let controller = CameraLifecycleController::builder()
        .platform(platform.clone())
        .permissions(Arc::new(MockPermissions::granted()))
        .sensors(Arc::new(SimulatedMotionSensors::new()))
        .build()
        .await
        .unwrap();
    controller.initialize().await;

    let (switched, rotated) = tokio::join!(
        controller.switch_camera(),
        controller.on_orientation_changed(OrientationNotification::priority())
    );

    assert_eq!(switched, TransitionOutcome::Completed);
    assert_eq!(
        rotated,
        TransitionOutcome::Rejected(RejectReason::TransitionInFlight(TransitionKind::Switch))
    );
    assert!(platform
        .calls()
        .iter()
        .all(|call| !matches!(call, PlatformCall::LockCaptureOrientation(_))));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_switches_admit_one() {
    let harness = Harness::build(
        MockPermissions::granted(),
        None,
        Duration::from_millis(20),
    )
    .await;
    harness.controller.initialize().await;

    let (first, second) = tokio::join!(
        harness.controller.switch_camera(),
        harness.controller.switch_camera()
    );

    assert_eq!(first, TransitionOutcome::Completed);
    assert!(second.is_rejected());
    assert_eq!(harness.controller.lens(), LensDirection::Front);
    assert_eq!(harness.platform.initialize_count(), 2);
    assert_eq!(harness.platform.live_handle_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switch_camera_toggles_lens() {
    let harness = Harness::ready().await;
    let original = harness.controller.camera_handle().unwrap();
    let mut events = harness.controller.subscribe_events();

    assert_eq!(
        harness.controller.switch_camera().await,
        TransitionOutcome::Completed
    );

    let handle = harness.controller.camera_handle().unwrap();
    assert_eq!(handle.lens, LensDirection::Front);
    assert_eq!(handle.sensor_orientation_degrees, 270);
    assert_eq!(
        harness.platform.count(&PlatformCall::Dispose(original.id)),
        1
    );
    assert_eq!(harness.platform.live_handle_count(), 1);
    let types = drain_types(&mut events);
    assert!(types.contains(&"lens_switched"));

    assert_eq!(
        harness.controller.switch_camera_to(LensDirection::Front).await,
        TransitionOutcome::Ignored(IgnoreReason::NotApplicable)
    );
}

#[tokio::test(start_paused = true)]
async fn test_switch_reapplies_capture_orientation() {
    let harness = Harness::ready().await;
    harness.rotate_to(DeviceOrientation::PortraitUp).await;
    assert_eq!(harness.platform.locked_rotation(), Some(90));

    harness.tilt(DeviceOrientation::PortraitUp);
    harness.controller.switch_camera().await;

    // Front sensor at 270°
    assert_eq!(harness.platform.locked_rotation(), Some(270));
}

#[tokio::test(start_paused = true)]
async fn test_switch_after_debounced_rotation_tracks_new_orientation() {
    let harness = Harness::ready().await;
    harness.rotate_to(DeviceOrientation::PortraitUp).await;
    assert_eq!(
        harness.rotate_to(DeviceOrientation::LandscapeLeft).await,
        TransitionOutcome::Ignored(IgnoreReason::Debounced)
    );
    assert_eq!(harness.platform.locked_rotation(), Some(90));

    let mut events = harness.controller.subscribe_events();
    assert_eq!(
        harness.controller.switch_camera().await,
        TransitionOutcome::Completed
    );

    // Front sensor at 270°, device at 90°
    assert_eq!(harness.platform.locked_rotation(), Some(180));
    assert_eq!(
        harness.controller.applied_orientation(),
        Some(DeviceOrientation::LandscapeLeft)
    );
    assert!(drain_types(&mut events).contains(&"orientation_applied"));

    tokio::time::advance(Duration::from_millis(2600)).await;
    assert_eq!(
        harness.rotate_to(DeviceOrientation::PortraitUp).await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.platform.locked_rotation(), Some(270));
}

#[tokio::test(start_paused = true)]
async fn test_capture_rotation_follows_sensor_mounting() {
    let harness = Harness::new().await;
    harness
        .platform
        .set_sensor_orientation(LensDirection::Back, 270);
    harness.controller.initialize().await;
    harness.tilt(DeviceOrientation::PortraitUp);

    let rotation = harness.controller.capture_rotation().unwrap();
    assert_eq!(rotation.sensor_orientation_degrees, 270);
    assert_eq!(rotation.final_rotation_degrees, 270);

    harness.tilt(DeviceOrientation::LandscapeRight);
    let rotation = harness.controller.capture_rotation().unwrap();
    assert_eq!(rotation.final_rotation_degrees, 0);
}

#[tokio::test(start_paused = true)]
async fn test_switch_failure_falls_back_to_previous_lens() {
    let harness = Harness::ready().await;
    harness.platform.set_unavailable(LensDirection::Front);

    let outcome = harness.controller.switch_camera().await;

    assert!(matches!(outcome, TransitionOutcome::Failed(_)));
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert_eq!(harness.controller.lens(), LensDirection::Back);
    assert_eq!(
        harness.controller.last_error().unwrap().kind,
        ErrorKind::HardwareUnavailable
    );
    assert_eq!(harness.platform.initialize_count(), 3);
    assert_eq!(harness.platform.live_handle_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switch_with_failed_fallback_enters_error() {
    let harness = Harness::ready().await;
    harness
        .platform
        .fail_next("initialize", CameraError::Disconnected);
    harness
        .platform
        .fail_next("initialize", CameraError::Disconnected);

    let outcome = harness.controller.switch_camera().await;

    assert!(matches!(outcome, TransitionOutcome::Failed(_)));
    assert!(harness.controller.state().is_error());
    assert!(harness.controller.camera_handle().is_none());
    assert!(harness.controller.has_pending_retry());

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert_eq!(harness.controller.lens(), LensDirection::Back);
}

#[tokio::test(start_paused = true)]
async fn test_background_and_foreground_resume_preview() {
    let harness = Harness::ready().await;

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
            .await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.controller.state(), CameraLifecycleState::Suspended);
    assert_eq!(harness.platform.count(&PlatformCall::PausePreview), 1);

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
            .await,
        TransitionOutcome::Ignored(IgnoreReason::NotApplicable)
    );

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert_eq!(harness.platform.count(&PlatformCall::ResumePreview), 1);
    assert_eq!(harness.platform.initialize_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_foreground_without_suspend_is_ignored() {
    let harness = Harness::ready().await;
    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await,
        TransitionOutcome::Ignored(IgnoreReason::NotApplicable)
    );
}

#[tokio::test(start_paused = true)]
async fn test_background_discards_recording_and_unlocks() {
    let harness = Harness::ready().await;
    harness.controller.start_recording().await.unwrap();
    assert!(harness.controller.orientation_lock().locked);
    let mut events = harness.controller.subscribe_events();

    harness
        .controller
        .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
        .await;

    assert!(!harness.controller.is_recording());
    assert!(!harness.controller.orientation_lock().locked);
    assert!(!harness.platform.is_recording());
    assert_eq!(harness.platform.locked_rotation(), None);
    let types = drain_types(&mut events);
    assert!(types.contains(&"recording_discarded"));
    assert!(types.contains(&"orientation_unlocked"));
}

#[tokio::test(start_paused = true)]
async fn test_background_cancels_registered_operations() {
    let harness = Harness::ready().await;
    let upload = harness.controller.register_operation("upload");
    assert_eq!(harness.controller.active_operations().len(), 1);

    harness
        .controller
        .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
        .await;

    assert!(upload.is_cancelled());
    assert!(harness.controller.active_operations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resume_with_lost_session_reinitializes() {
    let harness = Harness::ready().await;
    let original = harness.controller.camera_handle().unwrap();
    harness
        .controller
        .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
        .await;
    harness.platform.invalidate_handles();

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await,
        TransitionOutcome::Completed
    );

    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert_eq!(harness.platform.initialize_count(), 2);
    assert_ne!(harness.controller.camera_handle().unwrap().id, original.id);
}

#[tokio::test(start_paused = true)]
async fn test_resume_timeout_falls_back_to_initialize() {
    let harness = Harness::ready().await;
    harness
        .controller
        .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
        .await;
    harness.platform.hang_on("resume", true);

    let outcome = harness
        .controller
        .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
        .await;

    assert_eq!(outcome, TransitionOutcome::Completed);
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert_eq!(harness.platform.initialize_count(), 2);
    assert_eq!(harness.platform.live_handle_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resume_failure_falls_back_to_initialize() {
    let harness = Harness::ready().await;
    harness
        .controller
        .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
        .await;
    harness
        .platform
        .fail_next("resume", CameraError::platform("surface lost"));

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.platform.initialize_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_background_during_initialize_preempts_it() {
    let harness = Harness::new().await;
    harness.platform.hang_on("initialize", true);
    let mut state = harness.controller.subscribe_state();

    let controller = harness.controller.clone();
    let initializing = tokio::spawn(async move { controller.initialize().await });
    state
        .wait_for(|s| *s == CameraLifecycleState::Initializing)
        .await
        .unwrap();

    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
            .await,
        TransitionOutcome::Completed
    );
    assert_eq!(initializing.await.unwrap(), TransitionOutcome::Cancelled);
    assert_eq!(harness.controller.state(), CameraLifecycleState::Suspended);
    assert!(harness.controller.camera_handle().is_none());

    harness.platform.hang_on("initialize", false);
    assert_eq!(
        harness
            .controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await,
        TransitionOutcome::Completed
    );
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
}

#[tokio::test]
async fn test_dispose_during_hung_resume() {
    let harness = Harness::ready().await;
    harness
        .controller
        .on_app_lifecycle(AppLifecycleEvent::Backgrounding)
        .await;
    harness.platform.hang_on("resume", true);
    let mut state = harness.controller.subscribe_state();

    let controller = harness.controller.clone();
    let resuming = tokio::spawn(async move {
        controller
            .on_app_lifecycle(AppLifecycleEvent::Foregrounding)
            .await
    });
    state
        .wait_for(|s| *s == CameraLifecycleState::Resuming)
        .await
        .unwrap();

    assert_eq!(
        harness.controller.dispose().await,
        TransitionOutcome::Completed
    );
    assert_eq!(resuming.await.unwrap(), TransitionOutcome::Cancelled);
    assert_eq!(harness.controller.state(), CameraLifecycleState::Disposing);
    assert_eq!(harness.platform.live_handle_count(), 0);
    assert!(!harness.controller.is_changing_state());
}

#[tokio::test]
async fn test_dispose_is_idempotent_and_releases_everything() {
    let harness = Harness::ready().await;
    harness.controller.start_recording().await.unwrap();

    assert_eq!(
        harness.controller.dispose().await,
        TransitionOutcome::Completed
    );
    assert_eq!(
        harness.controller.dispose().await,
        TransitionOutcome::Ignored(IgnoreReason::NotApplicable)
    );

    assert_eq!(harness.controller.state(), CameraLifecycleState::Disposing);
    assert!(harness.controller.state().is_terminal());
    assert!(harness.controller.is_disposed());
    assert!(!harness.controller.is_recording());
    assert!(!harness.controller.orientation_lock().locked);
    assert!(!harness.platform.is_recording());
    assert_eq!(harness.platform.locked_rotation(), None);
    assert_eq!(harness.platform.live_handle_count(), 0);
    assert_eq!(
        harness.platform.count(&PlatformCall::UnlockCaptureOrientation),
        1
    );
    assert!(!harness.controller.estimator().sampler().is_running());

    assert_eq!(
        harness.controller.initialize().await,
        TransitionOutcome::Rejected(RejectReason::Disposed)
    );
    assert_eq!(
        harness.rotate_to(DeviceOrientation::LandscapeLeft).await,
        TransitionOutcome::Rejected(RejectReason::Disposed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_dispose_cancels_pending_retry() {
    let harness = Harness::new().await;
    harness
        .platform
        .fail_next("initialize", CameraError::Disconnected);
    harness.controller.initialize().await;
    assert!(harness.controller.has_pending_retry());

    harness.controller.dispose().await;
    assert!(!harness.controller.has_pending_retry());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.platform.initialize_count(), 1);
    assert_eq!(harness.controller.state(), CameraLifecycleState::Disposing);
}

#[tokio::test]
async fn test_force_reset_clears_stuck_transition() {
    let harness = Harness::new().await;
    harness.platform.hang_on("initialize", true);
    let mut state = harness.controller.subscribe_state();
    let background = harness.controller.register_operation("thumbnail");

    let controller = harness.controller.clone();
    let initializing = tokio::spawn(async move { controller.initialize().await });
    state
        .wait_for(|s| *s == CameraLifecycleState::Initializing)
        .await
        .unwrap();
    assert!(harness.controller.is_changing_state());

    assert_eq!(
        harness.controller.force_reset_to_ready(),
        TransitionOutcome::Completed
    );

    assert_eq!(initializing.await.unwrap(), TransitionOutcome::Cancelled);
    assert_eq!(harness.controller.state(), CameraLifecycleState::Ready);
    assert!(!harness.controller.is_changing_state());
    assert!(background.is_cancelled());
    // Nothing was opened; the reset does not touch the platform
    assert!(harness.controller.camera_handle().is_none());
}

#[tokio::test]
async fn test_force_reset_during_hung_stop_releases_lock() {
    let harness = Harness::ready().await;
    harness.tilt(DeviceOrientation::PortraitUp);
    harness.controller.start_recording().await.unwrap();
    assert_eq!(harness.platform.locked_rotation(), Some(90));
    harness.platform.hang_on("stop_recording", true);
    let mut events = harness.controller.subscribe_events();

    let controller = harness.controller.clone();
    let stopping = tokio::spawn(async move { controller.stop_recording().await });
    while harness.platform.count(&PlatformCall::StopRecording) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(
        harness.controller.transition_in_flight(),
        Some(TransitionKind::Capture)
    );

    assert_eq!(
        harness.controller.force_reset_to_ready(),
        TransitionOutcome::Completed
    );
    assert!(stopping.await.unwrap().is_err());
    assert!(!harness.controller.is_recording());
    assert!(!harness.controller.orientation_lock().locked);
    assert!(drain_types(&mut events).contains(&"orientation_unlocked"));

    for _ in 0..200 {
        if harness.platform.locked_rotation().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(harness.platform.locked_rotation(), None);
    assert_eq!(
        harness.platform.count(&PlatformCall::UnlockCaptureOrientation),
        1
    );

    // A new recording can take the lock again
    harness.platform.hang_on("stop_recording", false);
    harness.controller.start_recording().await.unwrap();
    assert!(harness.controller.orientation_lock().locked);
}

#[tokio::test]
async fn test_take_photo_saves_media_and_metadata() {
    let harness = Harness::ready().await;
    harness.tilt(DeviceOrientation::LandscapeLeft);
    let mut events = harness.controller.subscribe_events();

    let photo = harness.controller.take_photo().await.unwrap();

    assert_eq!(photo.rotation.final_rotation_degrees, 0);
    assert_eq!(
        photo.rotation.device_orientation,
        DeviceOrientation::LandscapeLeft
    );
    assert!(photo.path.exists());
    assert!(photo.path.starts_with(harness.dir.path().join("captures")));
    let name = photo.path.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("IMG_"));
    assert!(name.ends_with(".jpg"));
    assert_eq!(harness.platform.locked_rotation(), Some(0));

    let metadata_path = photo.metadata_path.unwrap();
    let metadata: CaptureMetadata =
        serde_json::from_str(&std::fs::read_to_string(metadata_path).unwrap()).unwrap();
    assert_eq!(metadata.kind, CaptureKind::Photo);
    assert_eq!(metadata.rotation.final_rotation_degrees, 0);
    assert_eq!(metadata.file, photo.path);
    assert!(metadata.duration_ms.is_none());

    assert!(drain_types(&mut events).contains(&"photo_captured"));
    assert!(!harness.controller.is_changing_state());
}

#[tokio::test]
async fn test_take_photo_applies_manufacturer_correction() {
    let harness = Harness::build(
        MockPermissions::granted(),
        Some(DeviceIdentity::new("Xiaomi", "Mi 9", "11")),
        Duration::ZERO,
    )
    .await;
    harness.controller.initialize().await;
    harness.controller.switch_camera().await;
    harness.tilt(DeviceOrientation::PortraitUp);

    let photo = harness.controller.take_photo().await.unwrap();

    // Front sensor 270° plus the 180° front-lens offset
    assert_eq!(photo.rotation.final_rotation_degrees, 90);
    assert_eq!(photo.rotation.correction.rotation_offset_degrees, 180);
    assert_eq!(photo.rotation.lens, LensDirection::Front);
}

#[tokio::test]
async fn test_take_photo_requires_ready() {
    let harness = Harness::new().await;
    let result = harness.controller.take_photo().await;
    assert!(matches!(
        result,
        Err(OrientcamError::InvalidState { ref state, .. }) if state == "Uninitialized"
    ));
}

#[tokio::test]
async fn test_take_photo_failure_enters_error() {
    let harness = Harness::ready().await;
    harness
        .platform
        .fail_next("take_picture", CameraError::Disconnected);

    let result = harness.controller.take_photo().await;

    assert!(matches!(
        result,
        Err(OrientcamError::Camera(CameraError::Disconnected))
    ));
    assert!(harness.controller.state().is_error());
    harness.controller.dispose().await;
}

#[tokio::test]
async fn test_recording_locks_and_unlocks_orientation() {
    let harness = Harness::ready().await;
    harness.tilt(DeviceOrientation::PortraitUp);

    let rotation = harness.controller.start_recording().await.unwrap();
    assert_eq!(rotation.final_rotation_degrees, 90);
    assert!(harness.controller.is_recording());
    assert!(harness.controller.recording_duration().is_some());
    assert_eq!(
        harness.controller.orientation_lock(),
        OrientationLockState::locked_at(DeviceOrientation::PortraitUp, 90)
    );

    // Rotating mid-recording must not touch the capture pipeline
    assert_eq!(
        harness.rotate_to(DeviceOrientation::LandscapeLeft).await,
        TransitionOutcome::Ignored(IgnoreReason::Recording)
    );
    assert_eq!(harness.platform.locked_rotation(), Some(90));
    assert!(matches!(
        harness.controller.start_recording().await,
        Err(OrientcamError::InvalidState { .. })
    ));
    assert_eq!(
        harness.controller.switch_camera().await,
        TransitionOutcome::Rejected(RejectReason::Recording)
    );

    let video = harness.controller.stop_recording().await.unwrap();

    assert!(video.path.exists());
    assert!(video
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("VID_"));
    assert_eq!(video.rotation.final_rotation_degrees, 90);
    assert!(!harness.controller.is_recording());
    assert!(harness.controller.recording_duration().is_none());
    assert!(!harness.controller.orientation_lock().locked);
    assert_eq!(harness.platform.locked_rotation(), None);
    assert_eq!(
        harness.platform.count(&PlatformCall::UnlockCaptureOrientation),
        1
    );
}

#[tokio::test]
async fn test_stop_without_recording_is_rejected() {
    let harness = Harness::ready().await;
    assert!(matches!(
        harness.controller.stop_recording().await,
        Err(OrientcamError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_failed_start_releases_lock() {
    let harness = Harness::ready().await;
    harness.platform.fail_next(
        "start_recording",
        CameraError::Busy {
            details: "encoder".to_string(),
        },
    );

    assert!(harness.controller.start_recording().await.is_err());

    assert!(!harness.controller.is_recording());
    assert!(!harness.controller.orientation_lock().locked);
    assert_eq!(harness.platform.locked_rotation(), None);
    assert!(harness.controller.state().is_error());
    harness.controller.dispose().await;
}

#[tokio::test]
async fn test_failed_stop_still_releases_lock() {
    let harness = Harness::ready().await;
    harness.controller.start_recording().await.unwrap();
    harness
        .platform
        .fail_next("stop_recording", CameraError::Disconnected);

    assert!(harness.controller.stop_recording().await.is_err());

    assert!(!harness.controller.is_recording());
    assert!(!harness.controller.orientation_lock().locked);
    assert_eq!(harness.platform.locked_rotation(), None);
    assert!(harness.controller.state().is_error());
    harness.controller.dispose().await;
}

#[tokio::test]
async fn test_platform_error_while_recording_clears_lock() {
    let harness = Harness::ready().await;
    harness.controller.start_recording().await.unwrap();

    let outcome = harness
        .controller
        .on_platform_error(CameraError::HardwareUnavailable {
            details: "camera unplugged".to_string(),
        })
        .await;

    assert!(matches!(outcome, TransitionOutcome::Failed(_)));
    assert!(!harness.controller.is_recording());
    assert!(!harness.controller.orientation_lock().locked);
    assert!(!harness.platform.is_recording());
    assert!(!harness.controller.has_pending_retry());
    assert_eq!(
        harness.controller.state().failure().unwrap().kind,
        ErrorKind::HardwareUnavailable
    );
}

#[tokio::test(start_paused = true)]
async fn test_photo_rejected_during_switch() {
    let dir = tempfile::tempdir().unwrap();
    let platform = Arc::new(
        MockPlatformCamera::with_media_dir(dir.path()).with_latency(Duration::from_millis(50)),
    );
    let controller = CameraLifecycleController::builder()
        .platform(platform.clone())
        .permissions(Arc::new(MockPermissions::granted()))
        .sensors(Arc::new(SimulatedMotionSensors::new()))
        .build()
        .await
        .unwrap();
    controller.initialize().await;

    let (switched, photo) = tokio::join!(controller.switch_camera(), controller.take_photo());

    assert_eq!(switched, TransitionOutcome::Completed);
    assert!(matches!(photo, Err(OrientcamError::InvalidState { .. })));
    assert_eq!(platform.count(&PlatformCall::TakePicture), 0);
}

#[tokio::test]
async fn test_builder_requires_platform() {
    let result = CameraLifecycleController::builder()
        .permissions(Arc::new(MockPermissions::granted()))
        .sensors(Arc::new(SimulatedMotionSensors::new()))
        .build()
        .await;
    assert!(matches!(result, Err(OrientcamError::System { .. })));
}

#[tokio::test]
async fn test_builder_uses_configured_device() {
    let mut config = OrientcamConfig::default();
    config.device = Some(crate::config::DeviceConfig {
        manufacturer: "Samsung".to_string(),
        model: "SM-G960F".to_string(),
        os_version: "10".to_string(),
    });
    let controller = CameraLifecycleController::builder()
        .config(config)
        .platform(Arc::new(MockPlatformCamera::new()))
        .permissions(Arc::new(MockPermissions::granted()))
        .sensors(Arc::new(SimulatedMotionSensors::new()))
        .build()
        .await
        .unwrap();

    assert_eq!(controller.estimator().identity().manufacturer, "Samsung");
    assert!(!controller.estimator().identity().is_unknown());
}
