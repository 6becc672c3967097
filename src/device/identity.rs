use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "Unknown";

/// Manufacturer, model and OS version of the running device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub os_version: String,
}

impl DeviceIdentity {
    pub fn new<M: Into<String>, D: Into<String>, V: Into<String>>(
        manufacturer: M,
        model: D,
        os_version: V,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            os_version: os_version.into(),
        }
    }

    /// Sentinel used when the platform query fails
    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, "")
    }

    pub fn is_unknown(&self) -> bool {
        *self == Self::unknown()
    }

    /// Model usable as a correction-table key, `None` for the sentinel
    pub fn model_key(&self) -> Option<&str> {
        if self.model.is_empty() || self.model == UNKNOWN {
            None
        } else {
            Some(&self.model)
        }
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::unknown()
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.os_version.is_empty() {
            write!(f, "{} {}", self.manufacturer, self.model)
        } else {
            write!(f, "{} {} ({})", self.manufacturer, self.model, self.os_version)
        }
    }
}
