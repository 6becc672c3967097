use super::state::{CameraLifecycleState, IgnoreReason, RejectReason, TransitionOutcome};
use super::CameraLifecycleController;
use crate::events::LifecycleEvent;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

impl CameraLifecycleController {
    /// Tear the session down. Safe to call at any time, repeatedly.
    ///
    /// Cancels whatever is in flight, releases the recording, the orientation
    /// lock and the camera, and stops sensor sampling.
    pub async fn dispose(&self) -> TransitionOutcome {
        let (handle, recording, locked) = {
            let mut core = self.inner.core.lock();
            if core.disposed {
                debug!("Camera session already disposed");
                return TransitionOutcome::Ignored(IgnoreReason::NotApplicable);
            }

            core.disposed = true;
            core.epoch += 1;
            core.in_flight = None;
            core.deferred_retry = false;
            if let Some(retry) = core.pending_retry.take() {
                retry.cancel();
            }
            let cancelled = self.inner.operations.cancel_all();
            if cancelled > 0 {
                info!("Cancelled {} pending operation(s) on dispose", cancelled);
            }

            let recording = core.recording.take().is_some();
            let locked = std::mem::take(&mut core.orientation_lock).locked;
            let handle = core.handle.take();
            self.inner
                .set_state(&mut core, CameraLifecycleState::Disposing);

            if recording {
                self.inner.events.publish(LifecycleEvent::RecordingDiscarded {
                    reason: "camera disposed".to_string(),
                });
            }
            if locked {
                self.inner.events.publish(LifecycleEvent::OrientationUnlocked);
            }
            (handle, recording, locked)
        };

        info!("Disposing camera session");
        let platform = &self.inner.platform;
        let limit = self.inner.config.lifecycle.resume_timeout();

        if let Some(handle) = handle {
            if recording {
                match timeout(limit, platform.stop_recording(&handle)).await {
                    Ok(Ok(media)) => self.discard_media(media).await,
                    Ok(Err(e)) => warn!("Failed to stop recording on dispose: {}", e),
                    Err(_) => warn!("Stopping recording timed out on dispose"),
                }
            }
            if locked {
                report_cleanup(
                    "unlock capture orientation",
                    limit,
                    timeout(limit, platform.unlock_capture_orientation(&handle)).await,
                );
            }
            report_cleanup(
                "release camera",
                limit,
                timeout(limit, platform.dispose(&handle)).await,
            );
        }

        self.inner.estimator.sampler().stop();
        info!("Camera session disposed");
        TransitionOutcome::Completed
    }

    /// Clear a stuck transition and declare the session `Ready`.
    ///
    /// Every pending operation is cancelled and the session is not reopened,
    /// so it may not actually be usable if a transition was cut off half-way.
    /// Follow up with `recover_from_error` when subsequent calls fail.
    ///
    /// A recording or orientation lock left behind by the cancelled work is
    /// dropped here; the matching platform stop and unlock run in the
    /// background, each bounded by the resume timeout.
    pub fn force_reset_to_ready(&self) -> TransitionOutcome {
        let (handle, recording, locked) = {
            let mut core = self.inner.core.lock();
            if core.disposed {
                return TransitionOutcome::Rejected(RejectReason::Disposed);
            }

            warn!(
                "Forcing camera lifecycle to Ready (was {}, in flight: {:?})",
                core.state, core.in_flight
            );
            self.inner.operations.cancel_all();
            core.epoch += 1;
            core.in_flight = None;
            core.deferred_retry = false;
            if let Some(retry) = core.pending_retry.take() {
                retry.cancel();
            }
            core.last_error = None;

            let recording = core.recording.take().is_some();
            let locked = std::mem::take(&mut core.orientation_lock).locked;
            self.inner
                .set_state(&mut core, CameraLifecycleState::Ready);
            if recording {
                self.inner.events.publish(LifecycleEvent::RecordingDiscarded {
                    reason: "forced reset".to_string(),
                });
            }
            if locked {
                self.inner.events.publish(LifecycleEvent::OrientationUnlocked);
            }
            (core.handle.clone(), recording, locked)
        };

        if let Some(handle) = handle.filter(|_| recording || locked) {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!("No async runtime, capture orientation left locked on the platform");
                return TransitionOutcome::Completed;
            };
            let controller = self.clone();
            runtime.spawn(async move {
                let platform = &controller.inner.platform;
                let limit = controller.inner.config.lifecycle.resume_timeout();
                if locked {
                    report_cleanup(
                        "unlock capture orientation",
                        limit,
                        timeout(limit, platform.unlock_capture_orientation(&handle)).await,
                    );
                }
                if recording {
                    match timeout(limit, platform.stop_recording(&handle)).await {
                        Ok(Ok(media)) => controller.discard_media(media).await,
                        Ok(Err(e)) => warn!("Failed to stop recording after forced reset: {}", e),
                        Err(_) => warn!("Stopping recording timed out after forced reset"),
                    }
                }
            });
        }
        TransitionOutcome::Completed
    }
}

fn report_cleanup<E: std::fmt::Display>(
    step: &str,
    limit: Duration,
    result: Result<Result<(), E>, tokio::time::error::Elapsed>,
) {
    match result {
        Ok(Ok(())) => debug!("Cleanup: {} done", step),
        Ok(Err(e)) => warn!("Cleanup: failed to {}: {}", step, e),
        Err(_) => warn!("Cleanup: {} timed out after {:?}", step, limit),
    }
}
