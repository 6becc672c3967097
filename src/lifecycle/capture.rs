use super::controller::{Core, RecordingSession, TransitionGuard};
use super::state::{OrientationLockState, RejectReason, TransitionKind, TransitionOutcome};
use super::CameraLifecycleController;
use crate::device::DeviceIdentity;
use crate::error::{OrientcamError, Result};
use crate::events::LifecycleEvent;
use crate::orientation::CaptureRotationResult;
use crate::platform::{CameraHandle, MediaRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    Photo,
    Video,
}

impl CaptureKind {
    fn file_prefix(&self) -> &'static str {
        match self {
            CaptureKind::Photo => "IMG",
            CaptureKind::Video => "VID",
        }
    }
}

/// JSON sidecar written next to saved media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub capture_id: String,
    pub kind: CaptureKind,
    pub captured_at: DateTime<Utc>,
    pub file: PathBuf,
    pub rotation: CaptureRotationResult,
    pub device: DeviceIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct PhotoCapture {
    pub path: PathBuf,
    pub metadata_path: Option<PathBuf>,
    pub rotation: CaptureRotationResult,
}

#[derive(Debug, Clone)]
pub struct VideoCapture {
    pub path: PathBuf,
    pub metadata_path: Option<PathBuf>,
    pub rotation: CaptureRotationResult,
    pub duration: Duration,
}

impl CameraLifecycleController {
    /// Take a photo with a freshly computed capture rotation
    pub async fn take_photo(&self) -> Result<PhotoCapture> {
        let (guard, handle) = self.begin_capture("take_photo", |core| {
            if core.recording.is_some() {
                Err(TransitionOutcome::Rejected(RejectReason::Recording))
            } else {
                Ok(())
            }
        })?;

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
            None => return Err(cancelled("take_photo")),
            Some(Err(e)) => {
                self.fail(&guard, e.clone()).await;
                return Err(e.into());
            }
            Some(Ok(())) => {}
        }

        let media = match guard.run(self.inner.platform.take_picture(&handle)).await {
            None => return Err(cancelled("take_photo")),
            Some(Err(e)) => {
                self.fail(&guard, e.clone()).await;
                return Err(e.into());
            }
            Some(Ok(media)) => media,
        };
        drop(guard);

        let captured_at = Utc::now();
        let (path, metadata_path) = self
            .persist(CaptureKind::Photo, &media, &rotation, captured_at, None)
            .await?;

        info!(
            "Photo saved to {} (rotation {}°)",
            path.display(),
            rotation.final_rotation_degrees
        );
        self.inner.events.publish(LifecycleEvent::PhotoCaptured {
            path: path.clone(),
            rotation_degrees: rotation.final_rotation_degrees,
        });

        Ok(PhotoCapture {
            path,
            metadata_path,
            rotation,
        })
    }

    /// Lock capture orientation and start recording.
    ///
    /// The lock holds until the recording ends, whichever way it ends.
    pub async fn start_recording(&self) -> Result<CaptureRotationResult> {
        let (guard, handle) = self.begin_capture("start_recording", |core| {
            if core.recording.is_some() {
                Err(TransitionOutcome::Rejected(RejectReason::Recording))
            } else {
                Ok(())
            }
        })?;

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
            None => return Err(cancelled("start_recording")),
            Some(Err(e)) => {
                self.fail(&guard, e.clone()).await;
                return Err(e.into());
            }
            Some(Ok(())) => {}
        }

        let locked = self.commit(&guard, |inner, core| {
            core.orientation_lock = OrientationLockState::locked_at(
                rotation.device_orientation,
                rotation.final_rotation_degrees,
            );
            inner.events.publish(LifecycleEvent::OrientationLocked {
                orientation: rotation.device_orientation,
                rotation_degrees: rotation.final_rotation_degrees,
            });
        });
        if locked.is_none() {
            self.unlock_quietly(&handle).await;
            return Err(cancelled("start_recording"));
        }

        match guard.run(self.inner.platform.start_recording(&handle)).await {
            None => Err(cancelled("start_recording")),
            Some(Err(e)) => {
                warn!("Recording failed to start, releasing orientation lock: {}", e);
                self.fail(&guard, e.clone()).await;
                Err(e.into())
            }
            Some(Ok(())) => {
                let started = self.commit(&guard, |inner, core| {
                    core.recording = Some(RecordingSession {
                        rotation,
                        started_at: Instant::now(),
                    });
                    inner.events.publish(LifecycleEvent::RecordingStarted {
                        rotation_degrees: rotation.final_rotation_degrees,
                    });
                });
                match started {
                    Some(()) => {
                        info!(
                            "Recording started, capture orientation locked at {}°",
                            rotation.final_rotation_degrees
                        );
                        Ok(rotation)
                    }
                    None => Err(cancelled("start_recording")),
                }
            }
        }
    }

    /// Stop recording, release the orientation lock and save the video
    pub async fn stop_recording(&self) -> Result<VideoCapture> {
        let (guard, handle) = self.begin_capture("stop_recording", |core| {
            if core.recording.is_none() {
                Err(TransitionOutcome::Rejected(RejectReason::NotRecording))
            } else {
                Ok(())
            }
        })?;

        let session = self
            .commit(&guard, |_, core| core.recording.take())
            .flatten()
            .ok_or_else(|| cancelled("stop_recording"))?;

        let stopped = guard.run(self.inner.platform.stop_recording(&handle)).await;
        self.release_recording_lock(&guard, &handle).await;

        let media = match stopped {
            None => return Err(cancelled("stop_recording")),
            Some(Err(e)) => {
                self.fail(&guard, e.clone()).await;
                return Err(e.into());
            }
            Some(Ok(media)) => media,
        };
        drop(guard);

        let duration = session.started_at.elapsed();
        let captured_at = Utc::now();
        let (path, metadata_path) = self
            .persist(
                CaptureKind::Video,
                &media,
                &session.rotation,
                captured_at,
                Some(duration),
            )
            .await?;

        info!("Recording saved to {} ({:?})", path.display(), duration);
        self.inner
            .events
            .publish(LifecycleEvent::RecordingStopped { path: path.clone() });

        Ok(VideoCapture {
            path,
            metadata_path,
            rotation: session.rotation,
            duration,
        })
    }

    fn begin_capture<F>(&self, operation: &str, check: F) -> Result<(TransitionGuard, CameraHandle)>
    where
        F: FnOnce(&Core) -> std::result::Result<(), TransitionOutcome>,
    {
        let begun = self.begin_transition(TransitionKind::Capture, None, |core| {
            if !core.state.is_ready() {
                return Err(TransitionOutcome::Rejected(RejectReason::InvalidState(
                    core.state.name(),
                )));
            }
            check(core)?;
            core.handle
                .clone()
                .ok_or(TransitionOutcome::Rejected(RejectReason::InvalidState(
                    "Ready without camera",
                )))
        });

        begun.map_err(|outcome| {
            let reason = match outcome {
                TransitionOutcome::Rejected(RejectReason::InvalidState(state)) => state.to_string(),
                TransitionOutcome::Rejected(RejectReason::TransitionInFlight(kind)) => {
                    format!("{} ({:?} in flight)", self.state(), kind)
                }
                other => format!("{} ({:?})", self.state(), other),
            };
            OrientcamError::invalid_state(operation, reason)
        })
    }

    async fn release_recording_lock(&self, guard: &TransitionGuard, handle: &CameraHandle) {
        let was_locked = self
            .commit(guard, |inner, core| {
                let locked = std::mem::take(&mut core.orientation_lock).locked;
                if locked {
                    inner.events.publish(LifecycleEvent::OrientationUnlocked);
                }
                locked
            })
            .unwrap_or(false);

        if was_locked {
            self.unlock_quietly(handle).await;
        }
    }

    async fn unlock_quietly(&self, handle: &CameraHandle) {
        if let Err(e) = self.inner.platform.unlock_capture_orientation(handle).await {
            warn!("Failed to unlock capture orientation: {}", e);
        }
    }

    async fn persist(
        &self,
        kind: CaptureKind,
        media: &MediaRef,
        rotation: &CaptureRotationResult,
        captured_at: DateTime<Utc>,
        duration: Option<Duration>,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        let capture_id = Uuid::new_v4().to_string();
        let file_name = format!(
            "{}_{}_{}.{}",
            kind.file_prefix(),
            captured_at.format("%Y%m%d_%H%M%S"),
            &capture_id[..8],
            media.extension()
        );
        let destination = Path::new(&self.inner.config.capture.path).join(file_name);
        let path = self.inner.storage.save(media, &destination).await?;

        if !self.inner.config.capture.save_metadata {
            return Ok((path, None));
        }

        let metadata = CaptureMetadata {
            capture_id,
            kind,
            captured_at,
            file: path.clone(),
            rotation: *rotation,
            device: self.inner.estimator.identity().clone(),
            duration_ms: duration.map(|d| d.as_millis() as u64),
        };
        let metadata_path = match write_metadata(&metadata, &path).await {
            Ok(metadata_path) => Some(metadata_path),
            Err(e) => {
                warn!("Capture saved without metadata: {}", e);
                None
            }
        };
        Ok((path, metadata_path))
    }
}

fn cancelled(operation: &str) -> OrientcamError {
    OrientcamError::system(format!("{} cancelled", operation))
}

async fn write_metadata(metadata: &CaptureMetadata, media_path: &Path) -> Result<PathBuf> {
    let json = serde_json::to_string_pretty(metadata).map_err(|e| {
        OrientcamError::Storage(crate::error::StorageError::Metadata {
            details: e.to_string(),
        })
    })?;

    let metadata_path = media_path.with_extension("json");
    tokio::fs::write(&metadata_path, json).await?;
    debug!("Saved capture metadata to {}", metadata_path.display());
    Ok(metadata_path)
}
