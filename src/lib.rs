pub mod config;
pub mod correction;
pub mod device;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod orientation;
pub mod platform;
pub mod recovery;
pub mod sensor;

pub use config::OrientcamConfig;
pub use correction::{CorrectionTable, LensDirection, ManufacturerCorrection};
pub use device::{DeviceIdentity, DeviceIdentityResolver, DeviceInfoProvider};
pub use error::{CameraError, ErrorKind, OrientcamError, Result};
pub use events::{EventFilter, EventReceiver, LifecycleEvent, LifecycleEventBus};
pub use lifecycle::{
    CameraLifecycleController, CameraLifecycleControllerBuilder, CameraLifecycleState,
    OrientationLockState, TransitionOutcome,
};
pub use orientation::{
    CaptureRotationResult, DeviceOrientation, DeviceOrientationReading, OrientationEstimator,
};
pub use platform::{
    AppLifecycleEvent, MediaStorage, OrientationNotification, PermissionProvider, PlatformCamera,
};
pub use recovery::{RecoveryAction, RecoveryManager, RetryPolicy};
pub use sensor::{MotionSensorSource, SensorSampler, Vector3};
