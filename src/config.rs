use crate::correction::{CorrectionEntry, LensDirection};
use crate::platform::ResolutionPreset;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OrientcamConfig {
    pub camera: CameraConfig,
    pub sensor: SensorConfig,
    pub lifecycle: LifecycleConfig,
    pub recovery: RecoveryConfig,
    pub capture: CaptureConfig,
    /// Static device identity, used when no platform device-info query exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceConfig>,
    /// Extra manufacturer corrections layered over the built-in table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrections: Vec<CorrectionEntry>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Lens opened on initialize
    #[serde(default = "default_camera_lens")]
    pub lens: LensDirection,

    /// Requested capture resolution preset
    #[serde(default = "default_camera_resolution")]
    pub resolution: ResolutionPreset,

    /// Record audio alongside video (requires microphone permission)
    #[serde(default = "default_camera_audio")]
    pub audio: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SensorConfig {
    /// Accelerometer/gyroscope sampling period in milliseconds
    #[serde(default = "default_sampling_period_ms")]
    pub sampling_period_ms: u64,

    /// Horizontal gravity magnitude (m/s^2) below which the device counts as flat
    #[serde(default = "default_flat_threshold")]
    pub flat_threshold: f64,

    /// Accelerometer samples older than this are ignored
    #[serde(default = "default_max_sample_age_ms")]
    pub max_sample_age_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LifecycleConfig {
    /// Cooldown between non-priority orientation changes
    #[serde(default = "default_orientation_debounce_ms")]
    pub orientation_debounce_ms: u64,

    /// Upper bound for resuming the preview after foregrounding
    #[serde(default = "default_resume_timeout_ms")]
    pub resume_timeout_ms: u64,

    /// Lifecycle event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecoveryConfig {
    /// Maximum automatic retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay between retries
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Base path for saved photos and videos
    #[serde(default = "default_capture_path")]
    pub path: String,

    /// Write a JSON sidecar with the capture rotation next to each photo
    #[serde(default = "default_save_metadata")]
    pub save_metadata: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    pub manufacturer: String,
    pub model: String,
    #[serde(default)]
    pub os_version: String,
}

impl SensorConfig {
    pub fn sampling_period(&self) -> Duration {
        Duration::from_millis(self.sampling_period_ms)
    }

    pub fn max_sample_age(&self) -> Duration {
        Duration::from_millis(self.max_sample_age_ms)
    }
}

impl LifecycleConfig {
    pub fn orientation_debounce(&self) -> Duration {
        Duration::from_millis(self.orientation_debounce_ms)
    }

    pub fn resume_timeout(&self) -> Duration {
        Duration::from_millis(self.resume_timeout_ms)
    }
}

impl OrientcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("orientcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.lens", default_camera_lens().as_str())?
            .set_default("camera.resolution", default_camera_resolution().as_str())?
            .set_default("camera.audio", default_camera_audio())?
            .set_default("sensor.sampling_period_ms", default_sampling_period_ms())?
            .set_default("sensor.flat_threshold", default_flat_threshold())?
            .set_default("sensor.max_sample_age_ms", default_max_sample_age_ms())?
            .set_default(
                "lifecycle.orientation_debounce_ms",
                default_orientation_debounce_ms(),
            )?
            .set_default("lifecycle.resume_timeout_ms", default_resume_timeout_ms())?
            .set_default(
                "lifecycle.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default("recovery.max_retries", default_max_retries())?
            .set_default("recovery.base_delay_ms", default_base_delay_ms())?
            .set_default("recovery.max_delay_ms", default_max_delay_ms())?
            .set_default("recovery.exponential_backoff", default_exponential_backoff())?
            .set_default("capture.path", default_capture_path())?
            .set_default("capture.save_metadata", default_save_metadata())?
            .add_source(File::with_name(&path_str).required(false))
            // ORIENTCAM_LIFECYCLE__RESUME_TIMEOUT_MS=5000
            .add_source(Environment::with_prefix("ORIENTCAM").separator("__"))
            .build()?;

        let config: OrientcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor.sampling_period_ms == 0 {
            return Err(ConfigError::Message(
                "Sensor sampling_period_ms must be greater than 0".to_string(),
            ));
        }

        if !(self.sensor.flat_threshold.is_finite() && self.sensor.flat_threshold >= 0.0) {
            return Err(ConfigError::Message(
                "Sensor flat_threshold must be a non-negative number".to_string(),
            ));
        }

        if self.lifecycle.resume_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Lifecycle resume_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.lifecycle.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Lifecycle event_bus_capacity must be greater than 0".to_string(),
            ));
        }

        if self.recovery.base_delay_ms > self.recovery.max_delay_ms {
            return Err(ConfigError::Message(
                "Recovery base_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }

        if self.capture.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Capture path must not be empty".to_string(),
            ));
        }

        for entry in &self.corrections {
            if entry.rotation_offset_degrees % 90 != 0 || entry.rotation_offset_degrees >= 360 {
                return Err(ConfigError::Message(format!(
                    "Correction for '{}' has invalid rotation_offset_degrees {} (expected 0, 90, 180 or 270)",
                    entry.manufacturer, entry.rotation_offset_degrees
                )));
            }
            if entry.manufacturer.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Correction manufacturer must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for OrientcamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                lens: default_camera_lens(),
                resolution: default_camera_resolution(),
                audio: default_camera_audio(),
            },
            sensor: SensorConfig {
                sampling_period_ms: default_sampling_period_ms(),
                flat_threshold: default_flat_threshold(),
                max_sample_age_ms: default_max_sample_age_ms(),
            },
            lifecycle: LifecycleConfig {
                orientation_debounce_ms: default_orientation_debounce_ms(),
                resume_timeout_ms: default_resume_timeout_ms(),
                event_bus_capacity: default_event_bus_capacity(),
            },
            recovery: RecoveryConfig {
                max_retries: default_max_retries(),
                base_delay_ms: default_base_delay_ms(),
                max_delay_ms: default_max_delay_ms(),
                exponential_backoff: default_exponential_backoff(),
            },
            capture: CaptureConfig {
                path: default_capture_path(),
                save_metadata: default_save_metadata(),
            },
            device: None,
            corrections: Vec::new(),
        }
    }
}

// Default value functions
fn default_camera_lens() -> LensDirection {
    LensDirection::Back
}
fn default_camera_resolution() -> ResolutionPreset {
    ResolutionPreset::High
}
fn default_camera_audio() -> bool {
    true
}

fn default_sampling_period_ms() -> u64 {
    100
}
fn default_flat_threshold() -> f64 {
    3.0
}
fn default_max_sample_age_ms() -> u64 {
    1000
}

fn default_orientation_debounce_ms() -> u64 {
    2500
}
fn default_resume_timeout_ms() -> u64 {
    3000
}
fn default_event_bus_capacity() -> usize {
    64
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_exponential_backoff() -> bool {
    true
}

fn default_capture_path() -> String {
    "./captures".to_string()
}
fn default_save_metadata() -> bool {
    true
}
