use super::state::{CameraLifecycleState, IgnoreReason, RejectReason, TransitionKind, TransitionOutcome};
use super::CameraLifecycleController;
use crate::events::LifecycleEvent;
use crate::platform::AppLifecycleEvent;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

enum ResumeAttempt {
    Resumed,
    Invalidated,
    Failed(crate::error::CameraError),
    TimedOut,
}

impl CameraLifecycleController {
    pub async fn on_app_lifecycle(&self, event: AppLifecycleEvent) -> TransitionOutcome {
        match event {
            AppLifecycleEvent::Backgrounding => self.suspend().await,
            AppLifecycleEvent::Foregrounding => self.resume().await,
        }
    }

    /// Release what must not run in the background and park in `Suspended`.
    ///
    /// Preempts any transition in flight; its camera is released and the
    /// next resume reinitializes.
    async fn suspend(&self) -> TransitionOutcome {
        let (guard, handle, recording, locked, preempted) = {
            let mut core = self.inner.core.lock();
            if core.disposed {
                return TransitionOutcome::Rejected(RejectReason::Disposed);
            }
            core.backgrounded = true;
            if let Some(retry) = core.pending_retry.take() {
                retry.cancel();
                core.deferred_retry = true;
                info!("Camera retry postponed until the app returns");
            }
            if core.in_flight == Some(TransitionKind::Suspend) {
                return TransitionOutcome::Ignored(IgnoreReason::NotApplicable);
            }
            if core.in_flight.is_none()
                && matches!(
                    core.state,
                    CameraLifecycleState::Uninitialized
                        | CameraLifecycleState::Error(_)
                        | CameraLifecycleState::Suspended
                )
            {
                debug!("Backgrounded in {}, nothing to suspend", core.state);
                return TransitionOutcome::Ignored(IgnoreReason::NotApplicable);
            }

            let preempted = core.in_flight.take();
            if let Some(active) = preempted {
                warn!("App backgrounded during {:?}, cancelling it", active);
                self.inner.operations.cancel_transitions();
            }

            let recording = core.recording.take().is_some();
            let locked = std::mem::take(&mut core.orientation_lock).locked;
            let handle = if preempted.is_some() {
                core.handle.take()
            } else {
                core.handle.clone()
            };
            let guard = self.admit(&mut core, TransitionKind::Suspend);

            let cancelled = self.inner.operations.cancel_background();
            if cancelled > 0 {
                info!("Cancelled {} background operation(s)", cancelled);
            }
            if recording {
                self.inner.events.publish(LifecycleEvent::RecordingDiscarded {
                    reason: "app backgrounded".to_string(),
                });
            }
            if locked {
                self.inner.events.publish(LifecycleEvent::OrientationUnlocked);
            }
            (guard, handle, recording, locked, preempted.is_some())
        };

        if let Some(handle) = handle {
            let platform = &self.inner.platform;
            if recording {
                match guard.run(platform.stop_recording(&handle)).await {
                    None => return TransitionOutcome::Cancelled,
                    Some(Ok(media)) => self.discard_media(media).await,
                    Some(Err(e)) => warn!("Failed to stop recording while backgrounding: {}", e),
                }
            }
            if locked {
                if let Some(Err(e)) = guard.run(platform.unlock_capture_orientation(&handle)).await {
                    warn!("Failed to unlock capture orientation: {}", e);
                }
            }

            if preempted {
                match guard.run(platform.dispose(&handle)).await {
                    None => return TransitionOutcome::Cancelled,
                    Some(Err(e)) => debug!("Releasing interrupted camera failed: {}", e),
                    Some(Ok(())) => debug!("Released camera {} after interrupted transition", handle.id),
                }
            } else {
                match guard.run(platform.pause_preview(&handle)).await {
                    None => return TransitionOutcome::Cancelled,
                    Some(Err(e)) => warn!("Failed to pause preview: {}", e),
                    Some(Ok(())) => {}
                }
            }
        }

        let suspended = self.commit(&guard, |inner, core| {
            inner.set_state(core, CameraLifecycleState::Suspended)
        });
        match suspended {
            Some(()) => TransitionOutcome::Completed,
            None => TransitionOutcome::Cancelled,
        }
    }

    /// Resume the preview, or reinitialize when the session did not survive.
    ///
    /// Resume attempts are bounded by the configured timeout; a timeout or
    /// a failure falls back to a full initialize.
    async fn resume(&self) -> TransitionOutcome {
        let deferred_retry = {
            let mut core = self.inner.core.lock();
            core.backgrounded = false;
            std::mem::take(&mut core.deferred_retry)
        };

        let begun = self.begin_transition(
            TransitionKind::Resume,
            Some(CameraLifecycleState::Resuming),
            |core| match core.state {
                CameraLifecycleState::Suspended => Ok((core.handle.clone(), core.lens)),
                _ => Err(TransitionOutcome::Ignored(IgnoreReason::NotApplicable)),
            },
        );
        let (guard, (handle, lens)) = match begun {
            Ok(admitted) => admitted,
            Err(_) if deferred_retry => {
                info!("Running camera retry postponed while in background");
                return self.recover().await;
            }
            Err(outcome) => return outcome,
        };

        let resume_timeout = self.inner.config.lifecycle.resume_timeout();
        let platform = &self.inner.platform;

        if let Some(handle) = handle {
            let attempt = guard
                .run(async {
                    let resumed = timeout(resume_timeout, async {
                        if !platform.is_valid(&handle).await {
                            return ResumeAttempt::Invalidated;
                        }
                        match platform.resume_preview(&handle).await {
                            Ok(()) => ResumeAttempt::Resumed,
                            Err(e) => ResumeAttempt::Failed(e),
                        }
                    })
                    .await;
                    resumed.unwrap_or(ResumeAttempt::TimedOut)
                })
                .await;

            match attempt {
                None => return TransitionOutcome::Cancelled,
                Some(ResumeAttempt::Resumed) => {
                    let ready = self.commit(&guard, |inner, core| {
                        inner.set_state(core, CameraLifecycleState::Ready)
                    });
                    return match ready {
                        Some(()) => {
                            info!("Camera {} resumed", handle.id);
                            TransitionOutcome::Completed
                        }
                        None => TransitionOutcome::Cancelled,
                    };
                }
                Some(ResumeAttempt::Invalidated) => {
                    info!("Camera session lost while in background, reinitializing")
                }
                Some(ResumeAttempt::Failed(e)) => {
                    error!("Preview resume failed, reinitializing: {}", e)
                }
                Some(ResumeAttempt::TimedOut) => warn!(
                    "Preview resume timed out after {:?}, reinitializing",
                    resume_timeout
                ),
            }

            if self.commit(&guard, |_, core| core.handle = None).is_none() {
                return TransitionOutcome::Cancelled;
            }
            match guard.run(timeout(resume_timeout, platform.dispose(&handle))).await {
                None => return TransitionOutcome::Cancelled,
                Some(Ok(Err(e))) => debug!("Releasing stale camera failed: {}", e),
                Some(Err(_)) => warn!("Releasing stale camera timed out"),
                Some(Ok(Ok(()))) => {}
            }
        } else {
            info!("No camera to resume, reinitializing");
        }

        self.open_camera(&guard, lens).await
    }
}
