use super::controller::TransitionGuard;
use super::state::{
    CameraLifecycleState, IgnoreReason, LifecycleFailure, RejectReason, TransitionKind,
    TransitionOutcome,
};
use super::CameraLifecycleController;
use crate::correction::LensDirection;
use crate::error::CameraError;
use crate::events::LifecycleEvent;
use crate::platform::{CameraHandle, Capability, OrientationNotification, PermissionStatus};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

impl CameraLifecycleController {
    /// Request permissions and open the configured lens
    pub async fn initialize(&self) -> TransitionOutcome {
        let begun = self.begin_transition(TransitionKind::Initialize, None, |core| {
            match core.state {
                CameraLifecycleState::Uninitialized => Ok(core.lens),
                ref other => Err(TransitionOutcome::Rejected(RejectReason::InvalidState(
                    other.name(),
                ))),
            }
        });
        let (guard, lens) = match begun {
            Ok(admitted) => admitted,
            Err(outcome) => return outcome,
        };

        info!("Initializing {} camera", lens);
        self.open_camera(&guard, lens).await
    }

    /// Leave `Error` and run a fresh initialize with a full retry budget
    pub async fn recover_from_error(&self) -> TransitionOutcome {
        self.inner.recovery.lock().reset();
        self.recover().await
    }

    pub(super) async fn recover(&self) -> TransitionOutcome {
        let begun = self.begin_transition(
            TransitionKind::Recover,
            Some(CameraLifecycleState::Uninitialized),
            |core| match core.state {
                CameraLifecycleState::Error(_) => Ok(()),
                ref other => Err(TransitionOutcome::Rejected(RejectReason::InvalidState(
                    other.name(),
                ))),
            },
        );
        let (guard, ()) = match begun {
            Ok(admitted) => admitted,
            Err(outcome) => return outcome,
        };

        let cleared = self.commit(&guard, |_, core| {
            core.last_error = None;
            core.deferred_retry = false;
            if let Some(retry) = core.pending_retry.take() {
                retry.cancel();
            }
            (core.handle.take(), core.lens)
        });
        let Some((stale, lens)) = cleared else {
            return TransitionOutcome::Cancelled;
        };

        if let Some(stale) = stale {
            debug!("Releasing camera {} before recovery", stale.id);
            match guard.run(self.inner.platform.dispose(&stale)).await {
                None => return TransitionOutcome::Cancelled,
                Some(Err(e)) => debug!("Releasing stale camera failed: {}", e),
                Some(Ok(())) => {}
            }
        }

        info!("Recovering camera session");
        self.open_camera(&guard, lens).await
    }

    /// Permission check followed by platform initialize, ending in `Ready` or `Error`
    pub(super) async fn open_camera(
        &self,
        guard: &TransitionGuard,
        lens: LensDirection,
    ) -> TransitionOutcome {
        let requesting = self.commit(guard, |inner, core| {
            inner.set_state(core, CameraLifecycleState::RequestingPermission)
        });
        if requesting.is_none() {
            return TransitionOutcome::Cancelled;
        }

        match guard.run(self.ensure_permissions()).await {
            None => return TransitionOutcome::Cancelled,
            Some(Err(e)) => return self.fail(guard, e).await,
            Some(Ok(())) => {}
        }

        let initializing = self.commit(guard, |inner, core| {
            inner.set_state(core, CameraLifecycleState::Initializing)
        });
        if initializing.is_none() {
            return TransitionOutcome::Cancelled;
        }

        let camera = &self.inner.config.camera;
        let opened = guard
            .run(
                self.inner
                    .platform
                    .initialize(lens, camera.resolution, camera.audio),
            )
            .await;

        match opened {
            None => TransitionOutcome::Cancelled,
            Some(Err(e)) => self.fail(guard, e).await,
            Some(Ok(handle)) => {
                if self.finish_open(guard, handle).await {
                    TransitionOutcome::Completed
                } else {
                    TransitionOutcome::Cancelled
                }
            }
        }
    }

    /// Install a freshly opened camera and move to `Ready`.
    ///
    /// An orientation applied before is re-applied to the new session.
    /// Returns false if the transition was cancelled; the camera is released.
    pub(super) async fn finish_open(&self, guard: &TransitionGuard, handle: CameraHandle) -> bool {
        let reapply = self.inner.core.lock().applied_orientation.is_some();
        let mut reapplied = None;
        if reapply {
            let rotation = self
                .inner
                .estimator
                .capture_rotation(handle.sensor_orientation_degrees, handle.lens);
            match guard
                .run(
                    self.inner
                        .platform
                        .lock_capture_orientation(&handle, rotation.final_rotation_degrees),
                )
                .await
            {
                Some(Ok(())) => {
                    debug!("Re-applied capture rotation {}°", rotation.final_rotation_degrees);
                    reapplied = Some(rotation);
                }
                Some(Err(e)) => warn!("Failed to re-apply capture orientation: {}", e),
                None => {}
            }
        }

        let installed = self.commit(guard, |inner, core| {
            if let Some(rotation) = reapplied {
                // The session now matches the freshly estimated orientation
                if core.applied_orientation != Some(rotation.device_orientation) {
                    core.applied_orientation = Some(rotation.device_orientation);
                    inner.events.publish(LifecycleEvent::OrientationApplied {
                        orientation: rotation.device_orientation,
                        rotation_degrees: rotation.final_rotation_degrees,
                    });
                }
            }
            core.lens = handle.lens;
            core.handle = Some(handle.clone());
            core.last_error = None;
            inner.recovery.lock().reset();
            inner.set_state(core, CameraLifecycleState::Ready);
        });

        if installed.is_none() {
            warn!(
                "Camera {} opened after its transition was cancelled, releasing it",
                handle.id
            );
            if let Err(e) = self.inner.platform.dispose(&handle).await {
                debug!("Releasing orphaned camera failed: {}", e);
            }
            return false;
        }

        info!(
            "Camera {} ready ({} lens, sensor {}°)",
            handle.id, handle.lens, handle.sensor_orientation_degrees
        );
        true
    }

    async fn ensure_permissions(&self) -> Result<(), CameraError> {
        let mut required = vec![Capability::Camera];
        if self.inner.config.camera.audio {
            required.push(Capability::Microphone);
        }

        let mut missing = Vec::new();
        for capability in required {
            match self.inner.permissions.status_for(capability).await {
                PermissionStatus::Granted => {}
                PermissionStatus::PermanentlyDenied => {
                    warn!("{} permission permanently denied", capability);
                    return Err(CameraError::PermissionDenied {
                        capability: capability.to_string(),
                    });
                }
                PermissionStatus::Denied => missing.push(capability),
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        info!("Requesting permission for {:?}", missing);
        let answers = self.inner.permissions.request(&missing).await;
        for capability in missing {
            let granted = answers
                .iter()
                .any(|(answered, status)| *answered == capability && status.is_granted());
            if !granted {
                warn!("{} permission denied by user", capability);
                return Err(CameraError::PermissionDenied {
                    capability: capability.to_string(),
                });
            }
        }
        Ok(())
    }

    /// React to an "orientation may have changed" notification.
    ///
    /// The orientation is recomputed from the sensors; the notification only
    /// decides whether the unchanged and cooldown filters apply.
    pub async fn on_orientation_changed(
        &self,
        notification: OrientationNotification,
    ) -> TransitionOutcome {
        let debounce = self.inner.config.lifecycle.orientation_debounce();
        let estimator = &self.inner.estimator;

        let begun = self.begin_transition(
            TransitionKind::OrientationChange,
            Some(CameraLifecycleState::Recreating),
            |core| {
                if core.recording.is_some() {
                    return Err(TransitionOutcome::Ignored(IgnoreReason::Recording));
                }
                if !core.state.is_ready() {
                    return Err(TransitionOutcome::Rejected(RejectReason::InvalidState(
                        core.state.name(),
                    )));
                }
                let handle = core.handle.clone().ok_or(TransitionOutcome::Rejected(
                    RejectReason::InvalidState("Ready without camera"),
                ))?;

                let rotation = estimator
                    .capture_rotation(handle.sensor_orientation_degrees, handle.lens);
                let next = rotation.device_orientation;

                if let (Some(current), false) = (core.applied_orientation, notification.priority) {
                    if current == next {
                        return Err(TransitionOutcome::Ignored(IgnoreReason::Unchanged));
                    }
                    let landscape_flip = current.is_landscape() && next.is_landscape();
                    let cooling = core
                        .last_orientation_change
                        .map_or(false, |at| at.elapsed() < debounce);
                    if cooling && !landscape_flip {
                        return Err(TransitionOutcome::Ignored(IgnoreReason::Debounced));
                    }
                }
                Ok((handle, rotation))
            },
        );

        let (guard, (handle, rotation)) = match begun {
            Ok(admitted) => admitted,
            Err(outcome) => {
                debug!("Orientation notification not applied: {:?}", outcome);
                return outcome;
            }
        };

        info!(
            "Applying orientation {} (capture rotation {}°)",
            rotation.device_orientation, rotation.final_rotation_degrees
        );

        let locked = guard
            .run(
                self.inner
                    .platform
                    .lock_capture_orientation(&handle, rotation.final_rotation_degrees),
            )
            .await;

        match locked {
            None => TransitionOutcome::Cancelled,
            Some(Err(e)) => self.fail(&guard, e).await,
            Some(Ok(())) => {
                let applied = self.commit(&guard, |inner, core| {
                    core.applied_orientation = Some(rotation.device_orientation);
                    core.last_orientation_change = Some(Instant::now());
                    inner.set_state(core, CameraLifecycleState::Ready);
                    inner.events.publish(LifecycleEvent::OrientationApplied {
                        orientation: rotation.device_orientation,
                        rotation_degrees: rotation.final_rotation_degrees,
                    });
                });
                match applied {
                    Some(()) => TransitionOutcome::Completed,
                    None => TransitionOutcome::Cancelled,
                }
            }
        }
    }

    /// Toggle between the front and back lens
    pub async fn switch_camera(&self) -> TransitionOutcome {
        self.switch_lens(None).await
    }

    pub async fn switch_camera_to(&self, lens: LensDirection) -> TransitionOutcome {
        self.switch_lens(Some(lens)).await
    }

    /// Release the current lens and open the target one.
    ///
    /// If the target fails to open the previous lens is reopened; the session
    /// stays usable and the failure is reported through `last_error`.
    async fn switch_lens(&self, target: Option<LensDirection>) -> TransitionOutcome {
        let begun = self.begin_transition(
            TransitionKind::Switch,
            Some(CameraLifecycleState::Switching),
            |core| {
                if core.recording.is_some() {
                    return Err(TransitionOutcome::Rejected(RejectReason::Recording));
                }
                if !core.state.is_ready() {
                    return Err(TransitionOutcome::Rejected(RejectReason::InvalidState(
                        core.state.name(),
                    )));
                }
                let to = target.unwrap_or_else(|| core.lens.opposite());
                if to == core.lens {
                    return Err(TransitionOutcome::Ignored(IgnoreReason::NotApplicable));
                }
                Ok((core.lens, to))
            },
        );
        let (guard, (from, to)) = match begun {
            Ok(admitted) => admitted,
            Err(outcome) => return outcome,
        };

        info!("Switching camera {} -> {}", from, to);

        let released = self.commit(&guard, |_, core| core.handle.take());
        let Some(previous) = released else {
            return TransitionOutcome::Cancelled;
        };
        if let Some(previous) = previous {
            match guard.run(self.inner.platform.dispose(&previous)).await {
                None => return TransitionOutcome::Cancelled,
                Some(Err(e)) => warn!("Failed to release {} camera: {}", from, e),
                Some(Ok(())) => {}
            }
        }

        let camera = &self.inner.config.camera;
        let opened = guard
            .run(
                self.inner
                    .platform
                    .initialize(to, camera.resolution, camera.audio),
            )
            .await;

        let failure = match opened {
            None => return TransitionOutcome::Cancelled,
            Some(Ok(handle)) => {
                if !self.finish_open(&guard, handle).await {
                    return TransitionOutcome::Cancelled;
                }
                self.inner
                    .events
                    .publish(LifecycleEvent::LensSwitched { lens: to });
                return TransitionOutcome::Completed;
            }
            Some(Err(e)) => e,
        };

        warn!(
            "Failed to open {} camera, falling back to {}: {}",
            to, from, failure
        );
        let fallback = guard
            .run(
                self.inner
                    .platform
                    .initialize(from, camera.resolution, camera.audio),
            )
            .await;

        match fallback {
            None => TransitionOutcome::Cancelled,
            Some(Err(e)) => {
                error!("Fallback to {} camera failed: {}", from, e);
                self.fail(&guard, e).await
            }
            Some(Ok(handle)) => {
                if !self.finish_open(&guard, handle).await {
                    return TransitionOutcome::Cancelled;
                }
                let reported = LifecycleFailure::from_camera_error(&failure);
                let message = reported.message.clone();
                self.commit(&guard, |inner, core| {
                    inner.events.publish(LifecycleEvent::TransitionFailed {
                        transition: TransitionKind::Switch,
                        kind: reported.kind,
                        message: reported.message.clone(),
                    });
                    core.last_error = Some(reported);
                });
                TransitionOutcome::Failed(message)
            }
        }
    }

    /// Report a failure the platform raised outside any transition,
    /// such as the camera disconnecting mid-recording
    pub async fn on_platform_error(&self, error: CameraError) -> TransitionOutcome {
        let begun = self.begin_transition(TransitionKind::Fault, None, |core| match core.state {
            CameraLifecycleState::Ready => Ok(()),
            ref other => Err(TransitionOutcome::Rejected(RejectReason::InvalidState(
                other.name(),
            ))),
        });
        let (guard, ()) = match begun {
            Ok(admitted) => admitted,
            Err(outcome) => {
                debug!("Platform error not applied ({:?}): {}", outcome, error);
                return outcome;
            }
        };

        error!("Platform reported camera failure: {}", error);
        self.fail(&guard, error).await
    }
}
