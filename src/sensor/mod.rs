mod mock;
mod sampler;
mod types;

pub use mock::SimulatedMotionSensors;
pub use sampler::{MotionSensorSource, SensorReceiver, SensorSampler};
pub use types::{SensorKind, SensorSample, Vector3};
