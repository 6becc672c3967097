mod background;
mod capture;
mod controller;
mod operations;
mod shutdown;
mod state;
mod transitions;

#[cfg(test)]
mod tests;

pub use capture::{CaptureKind, CaptureMetadata, PhotoCapture, VideoCapture};
pub use controller::{CameraLifecycleController, CameraLifecycleControllerBuilder};
pub use operations::{OperationKind, OperationRegistry, OperationTicket};
pub use state::{
    CameraLifecycleState, IgnoreReason, LifecycleFailure, OrientationLockState, RejectReason,
    TransitionKind, TransitionOutcome,
};
