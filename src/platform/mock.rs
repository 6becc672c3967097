use super::traits::{PermissionProvider, PlatformCamera};
use super::types::{CameraHandle, Capability, MediaRef, PermissionStatus, ResolutionPreset};
use crate::correction::LensDirection;
use crate::error::CameraError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, trace};

/// Calls observed by [`MockPlatformCamera`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Initialize(LensDirection),
    Dispose(u64),
    LockCaptureOrientation(u16),
    UnlockCaptureOrientation,
    PausePreview,
    ResumePreview,
    StartRecording,
    StopRecording,
    TakePicture,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    live: HashSet<u64>,
    unavailable: HashSet<LensDirection>,
    sensor_orientation: HashMap<LensDirection, u16>,
    failures: HashMap<&'static str, VecDeque<CameraError>>,
    hang: HashSet<&'static str>,
    calls: Vec<PlatformCall>,
    locked_rotation: Option<u16>,
    recording: bool,
    media_counter: u64,
}

/// In-memory platform camera with failure injection
pub struct MockPlatformCamera {
    state: Mutex<MockState>,
    latency: Duration,
    media_dir: PathBuf,
}

impl MockPlatformCamera {
    pub fn new() -> Self {
        Self::with_media_dir(std::env::temp_dir().join("orientcam-mock"))
    }

    /// Captured media files are written below `media_dir`
    pub fn with_media_dir<P: Into<PathBuf>>(media_dir: P) -> Self {
        let mut state = MockState {
            next_id: 1,
            ..Default::default()
        };
        state.sensor_orientation.insert(LensDirection::Back, 90);
        state.sensor_orientation.insert(LensDirection::Front, 270);

        Self {
            state: Mutex::new(state),
            latency: Duration::ZERO,
            media_dir: media_dir.into(),
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_sensor_orientation(&self, lens: LensDirection, degrees: u16) {
        self.state.lock().sensor_orientation.insert(lens, degrees);
    }

    /// Initializing this lens fails with `HardwareUnavailable`
    pub fn set_unavailable(&self, lens: LensDirection) {
        self.state.lock().unavailable.insert(lens);
    }

    /// Queue a failure for the next call of `operation`
    /// (`initialize`, `dispose`, `lock`, `unlock`, `pause`, `resume`,
    /// `start_recording`, `stop_recording`, `take_picture`)
    pub fn fail_next(&self, operation: &'static str, error: CameraError) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Calls of `operation` never complete until cleared
    pub fn hang_on(&self, operation: &'static str, hang: bool) {
        let mut state = self.state.lock();
        if hang {
            state.hang.insert(operation);
        } else {
            state.hang.remove(operation);
        }
    }

    /// Simulate the OS tearing down every open session
    pub fn invalidate_handles(&self) {
        self.state.lock().live.clear();
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &PlatformCall) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn initialize_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| matches!(c, PlatformCall::Initialize(_)))
            .count()
    }

    pub fn locked_rotation(&self) -> Option<u16> {
        self.state.lock().locked_rotation
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().recording
    }

    pub fn live_handle_count(&self) -> usize {
        self.state.lock().live.len()
    }

    async fn enter(&self, operation: &'static str, call: PlatformCall) -> Result<(), CameraError> {
        trace!("Mock platform call: {:?}", call);
        let hang = {
            let mut state = self.state.lock();
            state.calls.push(call);
            state.hang.contains(operation)
        };

        if hang {
            debug!("Mock platform '{}' hanging", operation);
            std::future::pending::<()>().await;
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self
            .state
            .lock()
            .failures
            .get_mut(operation)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn ensure_live(&self, handle: &CameraHandle) -> Result<(), CameraError> {
        if self.state.lock().live.contains(&handle.id) {
            Ok(())
        } else {
            Err(CameraError::Disconnected)
        }
    }

    async fn write_media(&self, extension: &str) -> Result<MediaRef, CameraError> {
        let name = {
            let mut state = self.state.lock();
            state.media_counter += 1;
            format!("mock_{}_{}.{}", std::process::id(), state.media_counter, extension)
        };
        tokio::fs::create_dir_all(&self.media_dir)
            .await
            .map_err(|e| CameraError::platform(e.to_string()))?;
        let path = self.media_dir.join(name);
        tokio::fs::write(&path, b"mock media")
            .await
            .map_err(|e| CameraError::platform(e.to_string()))?;
        Ok(MediaRef::new(path))
    }
}

impl Default for MockPlatformCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlatformCamera for MockPlatformCamera {
    async fn initialize(
        &self,
        lens: LensDirection,
        resolution: ResolutionPreset,
        audio_enabled: bool,
    ) -> Result<CameraHandle, CameraError> {
        self.enter("initialize", PlatformCall::Initialize(lens)).await?;

        let mut state = self.state.lock();
        if state.unavailable.contains(&lens) {
            return Err(CameraError::HardwareUnavailable {
                details: format!("no {} camera", lens),
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.live.insert(id);
        let sensor_orientation_degrees = state.sensor_orientation.get(&lens).copied().unwrap_or(0);
        debug!(
            "Mock camera {} opened ({} lens, {}, audio: {})",
            id,
            lens,
            resolution.as_str(),
            audio_enabled
        );

        Ok(CameraHandle {
            id,
            lens,
            sensor_orientation_degrees,
        })
    }

    async fn dispose(&self, handle: &CameraHandle) -> Result<(), CameraError> {
        self.enter("dispose", PlatformCall::Dispose(handle.id)).await?;
        let mut state = self.state.lock();
        state.live.remove(&handle.id);
        state.recording = false;
        state.locked_rotation = None;
        Ok(())
    }

    async fn lock_capture_orientation(
        &self,
        handle: &CameraHandle,
        rotation_degrees: u16,
    ) -> Result<(), CameraError> {
        self.enter("lock", PlatformCall::LockCaptureOrientation(rotation_degrees))
            .await?;
        self.ensure_live(handle)?;
        self.state.lock().locked_rotation = Some(rotation_degrees);
        Ok(())
    }

    async fn unlock_capture_orientation(&self, handle: &CameraHandle) -> Result<(), CameraError> {
        self.enter("unlock", PlatformCall::UnlockCaptureOrientation).await?;
        self.ensure_live(handle)?;
        self.state.lock().locked_rotation = None;
        Ok(())
    }

    async fn pause_preview(&self, handle: &CameraHandle) -> Result<(), CameraError> {
        self.enter("pause", PlatformCall::PausePreview).await?;
        self.ensure_live(handle)
    }

    async fn resume_preview(&self, handle: &CameraHandle) -> Result<(), CameraError> {
        self.enter("resume", PlatformCall::ResumePreview).await?;
        self.ensure_live(handle)
    }

    async fn start_recording(&self, handle: &CameraHandle) -> Result<(), CameraError> {
        self.enter("start_recording", PlatformCall::StartRecording).await?;
        self.ensure_live(handle)?;
        self.state.lock().recording = true;
        Ok(())
    }

    async fn stop_recording(&self, handle: &CameraHandle) -> Result<MediaRef, CameraError> {
        self.enter("stop_recording", PlatformCall::StopRecording).await?;
        self.ensure_live(handle)?;
        self.state.lock().recording = false;
        self.write_media("mp4").await
    }

    async fn take_picture(&self, handle: &CameraHandle) -> Result<MediaRef, CameraError> {
        self.enter("take_picture", PlatformCall::TakePicture).await?;
        self.ensure_live(handle)?;
        self.write_media("jpg").await
    }

    async fn is_valid(&self, handle: &CameraHandle) -> bool {
        self.state.lock().live.contains(&handle.id)
    }
}

/// Permission subsystem with scripted answers
pub struct MockPermissions {
    statuses: Mutex<HashMap<Capability, PermissionStatus>>,
    grant_on_request: bool,
    requests: Mutex<usize>,
}

impl MockPermissions {
    /// Everything already granted
    pub fn granted() -> Self {
        let mut statuses = HashMap::new();
        for capability in [Capability::Camera, Capability::Microphone, Capability::Storage] {
            statuses.insert(capability, PermissionStatus::Granted);
        }
        Self {
            statuses: Mutex::new(statuses),
            grant_on_request: true,
            requests: Mutex::new(0),
        }
    }

    /// Nothing granted; `grant_on_request` decides how the user answers
    pub fn denied(grant_on_request: bool) -> Self {
        Self {
            statuses: Mutex::new(HashMap::new()),
            grant_on_request,
            requests: Mutex::new(0),
        }
    }

    pub fn set_status(&self, capability: Capability, status: PermissionStatus) {
        self.statuses.lock().insert(capability, status);
    }

    pub fn request_count(&self) -> usize {
        *self.requests.lock()
    }
}

#[async_trait]
impl PermissionProvider for MockPermissions {
    async fn status_for(&self, capability: Capability) -> PermissionStatus {
        self.statuses
            .lock()
            .get(&capability)
            .copied()
            .unwrap_or(PermissionStatus::Denied)
    }

    async fn request(&self, capabilities: &[Capability]) -> Vec<(Capability, PermissionStatus)> {
        *self.requests.lock() += 1;
        let mut statuses = self.statuses.lock();
        capabilities
            .iter()
            .map(|capability| {
                let status = statuses
                    .entry(*capability)
                    .or_insert(PermissionStatus::Denied);
                if *status == PermissionStatus::Denied && self.grant_on_request {
                    *status = PermissionStatus::Granted;
                }
                (*capability, *status)
            })
            .collect()
    }
}
