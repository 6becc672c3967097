use super::types::{
    CameraHandle, Capability, MediaRef, PermissionStatus, ResolutionPreset,
};
use crate::correction::LensDirection;
use crate::error::{CameraError, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Native camera pipeline. Only the lifecycle controller calls into it.
#[async_trait]
pub trait PlatformCamera: Send + Sync {
    async fn initialize(
        &self,
        lens: LensDirection,
        resolution: ResolutionPreset,
        audio_enabled: bool,
    ) -> Result<CameraHandle, CameraError>;

    async fn dispose(&self, handle: &CameraHandle) -> Result<(), CameraError>;

    async fn lock_capture_orientation(
        &self,
        handle: &CameraHandle,
        rotation_degrees: u16,
    ) -> Result<(), CameraError>;

    async fn unlock_capture_orientation(&self, handle: &CameraHandle) -> Result<(), CameraError>;

    async fn pause_preview(&self, handle: &CameraHandle) -> Result<(), CameraError>;

    async fn resume_preview(&self, handle: &CameraHandle) -> Result<(), CameraError>;

    async fn start_recording(&self, handle: &CameraHandle) -> Result<(), CameraError>;

    async fn stop_recording(&self, handle: &CameraHandle) -> Result<MediaRef, CameraError>;

    async fn take_picture(&self, handle: &CameraHandle) -> Result<MediaRef, CameraError>;

    /// Whether the handle still refers to a live camera session
    async fn is_valid(&self, handle: &CameraHandle) -> bool;
}

#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn status_for(&self, capability: Capability) -> PermissionStatus;

    async fn request(&self, capabilities: &[Capability]) -> Vec<(Capability, PermissionStatus)>;
}

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Persist captured media at `destination`, returning the final path
    async fn save(&self, media: &MediaRef, destination: &Path) -> Result<PathBuf, StorageError>;
}
