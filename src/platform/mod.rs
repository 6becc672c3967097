mod mock;
mod storage;
mod traits;
mod types;

pub use mock::{MockPermissions, MockPlatformCamera, PlatformCall};
pub use storage::FileMediaStorage;
pub use traits::{MediaStorage, PermissionProvider, PlatformCamera};
pub use types::{
    AppLifecycleEvent, CameraHandle, Capability, MediaRef, OrientationNotification,
    PermissionStatus, ResolutionPreset,
};
