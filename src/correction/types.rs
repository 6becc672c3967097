use serde::{Deserialize, Serialize};

/// Which way the camera lens faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensDirection {
    Back,
    Front,
    External,
}

impl LensDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            LensDirection::Back => "back",
            LensDirection::Front => "front",
            LensDirection::External => "external",
        }
    }

    /// Lens selected by a back/front toggle
    pub fn opposite(&self) -> LensDirection {
        match self {
            LensDirection::Back => LensDirection::Front,
            LensDirection::Front | LensDirection::External => LensDirection::Back,
        }
    }
}

impl std::fmt::Display for LensDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Empirical fix-up for camera stacks that misreport their orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturerCorrection {
    /// Extra clockwise rotation, one of 0/90/180/270
    pub rotation_offset_degrees: u16,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub requires_transform_matrix: bool,
}

impl ManufacturerCorrection {
    pub const IDENTITY: ManufacturerCorrection = ManufacturerCorrection {
        rotation_offset_degrees: 0,
        flip_horizontal: false,
        flip_vertical: false,
        requires_transform_matrix: false,
    };

    /// Correction that only rotates
    pub fn rotation(degrees: u16) -> Self {
        Self {
            rotation_offset_degrees: degrees % 360,
            ..Self::IDENTITY
        }
    }

    pub fn with_flip_horizontal(mut self) -> Self {
        self.flip_horizontal = true;
        self
    }

    pub fn with_flip_vertical(mut self) -> Self {
        self.flip_vertical = true;
        self
    }

    pub fn with_transform_matrix(mut self) -> Self {
        self.requires_transform_matrix = true;
        self
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for ManufacturerCorrection {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One configured correction row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionEntry {
    pub manufacturer: String,
    /// Exact model; `None` makes this the manufacturer default for the lens
    #[serde(default)]
    pub model: Option<String>,
    pub lens: LensDirection,
    #[serde(default)]
    pub rotation_offset_degrees: u16,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
    #[serde(default)]
    pub requires_transform_matrix: bool,
}

impl CorrectionEntry {
    pub fn correction(&self) -> ManufacturerCorrection {
        ManufacturerCorrection {
            rotation_offset_degrees: self.rotation_offset_degrees % 360,
            flip_horizontal: self.flip_horizontal,
            flip_vertical: self.flip_vertical,
            requires_transform_matrix: self.requires_transform_matrix,
        }
    }
}
