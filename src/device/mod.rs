mod identity;
mod resolver;

pub use identity::DeviceIdentity;
pub use resolver::{DeviceIdentityResolver, DeviceInfoProvider, StaticDeviceInfo};
