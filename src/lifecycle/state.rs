use crate::error::{CameraError, ErrorKind};
use crate::orientation::DeviceOrientation;
use serde::Serialize;

/// Failure carried by [`CameraLifecycleState::Error`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl LifecycleFailure {
    pub fn from_camera_error(error: &CameraError) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// UI should offer a permission prompt rather than a plain retry
    pub fn is_permission_related(&self) -> bool {
        self.kind == ErrorKind::PermissionDenied
    }
}

/// State of the camera session, owned by the lifecycle controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CameraLifecycleState {
    Uninitialized,
    RequestingPermission,
    Initializing,
    Ready,
    Suspended,
    Resuming,
    Recreating,
    Switching,
    Error(LifecycleFailure),
    Disposing,
}

impl CameraLifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            CameraLifecycleState::Uninitialized => "Uninitialized",
            CameraLifecycleState::RequestingPermission => "RequestingPermission",
            CameraLifecycleState::Initializing => "Initializing",
            CameraLifecycleState::Ready => "Ready",
            CameraLifecycleState::Suspended => "Suspended",
            CameraLifecycleState::Resuming => "Resuming",
            CameraLifecycleState::Recreating => "Recreating",
            CameraLifecycleState::Switching => "Switching",
            CameraLifecycleState::Error(_) => "Error",
            CameraLifecycleState::Disposing => "Disposing",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, CameraLifecycleState::Ready)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CameraLifecycleState::Error(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CameraLifecycleState::Disposing)
    }

    /// States only passed through while a transition runs
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            CameraLifecycleState::RequestingPermission
                | CameraLifecycleState::Initializing
                | CameraLifecycleState::Resuming
                | CameraLifecycleState::Recreating
                | CameraLifecycleState::Switching
        )
    }

    pub fn failure(&self) -> Option<&LifecycleFailure> {
        match self {
            CameraLifecycleState::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for CameraLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraLifecycleState::Error(failure) => {
                write!(f, "Error({}: {})", failure.kind, failure.message)
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Kinds of serialized transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransitionKind {
    Initialize,
    Recover,
    OrientationChange,
    Switch,
    Suspend,
    Resume,
    Capture,
    /// Asynchronous platform failure reported outside any transition
    Fault,
}

/// Why a request was accepted but had nothing to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Recording in progress, the capture stream must not flip
    Recording,
    /// Orientation did not change
    Unchanged,
    /// Inside the orientation cooldown window
    Debounced,
    /// Request does not apply in the current state
    NotApplicable,
}

/// Why a request was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Another transition is in flight
    TransitionInFlight(TransitionKind),
    /// Operation not valid from this state
    InvalidState(&'static str),
    /// Not allowed while a recording is running
    Recording,
    /// Requires a running recording
    NotRecording,
    Disposed,
}

/// Result of a transition request
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Completed,
    Ignored(IgnoreReason),
    Rejected(RejectReason),
    /// Cut short by dispose or a forced reset; not an error
    Cancelled,
    Failed(String),
}

impl TransitionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, TransitionOutcome::Completed)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, TransitionOutcome::Rejected(_))
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, TransitionOutcome::Ignored(_))
    }
}

/// Capture-orientation freeze held while recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrientationLockState {
    pub locked: bool,
    pub orientation: Option<DeviceOrientation>,
    pub rotation_degrees: Option<u16>,
}

impl OrientationLockState {
    pub fn locked_at(orientation: DeviceOrientation, rotation_degrees: u16) -> Self {
        Self {
            locked: true,
            orientation: Some(orientation),
            rotation_degrees: Some(rotation_degrees),
        }
    }
}
