use super::types::{CorrectionEntry, LensDirection, ManufacturerCorrection};
use std::collections::HashMap;
use tracing::{debug, trace};

#[derive(Debug, Clone, Default)]
struct ManufacturerEntries {
    defaults: HashMap<LensDirection, ManufacturerCorrection>,
    models: HashMap<(String, LensDirection), ManufacturerCorrection>,
}

/// Data-driven lookup of manufacturer/model orientation quirks.
///
/// Keys are normalized (trimmed, lowercase) so "Samsung" and "samsung " resolve
/// to the same entries. The table is immutable once built.
#[derive(Debug, Clone, Default)]
pub struct CorrectionTable {
    manufacturers: HashMap<String, ManufacturerEntries>,
}

impl CorrectionTable {
    /// Table with no entries; every lookup yields the identity correction
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> CorrectionTableBuilder {
        CorrectionTableBuilder::new()
    }

    /// Quirks observed on shipping devices
    pub fn builtin() -> Self {
        Self::builder()
            .manufacturer_default(
                "samsung",
                LensDirection::Front,
                ManufacturerCorrection::IDENTITY.with_flip_horizontal(),
            )
            .model(
                "samsung",
                "SM-G960F",
                LensDirection::Back,
                ManufacturerCorrection::rotation(90).with_transform_matrix(),
            )
            .model(
                "samsung",
                "SM-G960F",
                LensDirection::Front,
                ManufacturerCorrection::rotation(270)
                    .with_flip_horizontal()
                    .with_transform_matrix(),
            )
            .manufacturer_default(
                "huawei",
                LensDirection::Front,
                ManufacturerCorrection::IDENTITY.with_flip_horizontal(),
            )
            .manufacturer_default(
                "xiaomi",
                LensDirection::Front,
                ManufacturerCorrection::rotation(180),
            )
            .build()
    }

    /// Built-in table with configured entries layered on top
    pub fn builtin_with(entries: &[CorrectionEntry]) -> Self {
        let mut builder = CorrectionTableBuilder::from_table(Self::builtin());
        for entry in entries {
            builder = builder.entry(entry);
        }
        builder.build()
    }

    /// Resolve the correction for a device and lens.
    ///
    /// Exact model match wins over the manufacturer default for the lens;
    /// anything unknown resolves to [`ManufacturerCorrection::IDENTITY`].
    pub fn correction_for(
        &self,
        manufacturer: &str,
        model: Option<&str>,
        lens: LensDirection,
    ) -> ManufacturerCorrection {
        let Some(entries) = self.manufacturers.get(&normalize(manufacturer)) else {
            trace!("No corrections registered for manufacturer '{}'", manufacturer);
            return ManufacturerCorrection::IDENTITY;
        };

        if let Some(model) = model {
            if let Some(correction) = entries.models.get(&(normalize(model), lens)) {
                trace!("Model correction for {} {} ({})", manufacturer, model, lens);
                return *correction;
            }
        }

        entries
            .defaults
            .get(&lens)
            .copied()
            .unwrap_or(ManufacturerCorrection::IDENTITY)
    }

    pub fn manufacturer_count(&self) -> usize {
        self.manufacturers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manufacturers.is_empty()
    }
}

/// Builder for [`CorrectionTable`]; later registrations replace earlier ones
pub struct CorrectionTableBuilder {
    manufacturers: HashMap<String, ManufacturerEntries>,
}

impl CorrectionTableBuilder {
    pub fn new() -> Self {
        Self {
            manufacturers: HashMap::new(),
        }
    }

    fn from_table(table: CorrectionTable) -> Self {
        Self {
            manufacturers: table.manufacturers,
        }
    }

    pub fn manufacturer_default(
        mut self,
        manufacturer: &str,
        lens: LensDirection,
        correction: ManufacturerCorrection,
    ) -> Self {
        self.manufacturers
            .entry(normalize(manufacturer))
            .or_default()
            .defaults
            .insert(lens, correction);
        self
    }

    pub fn model(
        mut self,
        manufacturer: &str,
        model: &str,
        lens: LensDirection,
        correction: ManufacturerCorrection,
    ) -> Self {
        self.manufacturers
            .entry(normalize(manufacturer))
            .or_default()
            .models
            .insert((normalize(model), lens), correction);
        self
    }

    pub fn entry(self, entry: &CorrectionEntry) -> Self {
        debug!(
            "Registering correction for {} {:?} ({}): {:?}",
            entry.manufacturer,
            entry.model,
            entry.lens,
            entry.correction()
        );
        match &entry.model {
            Some(model) => self.model(&entry.manufacturer, model, entry.lens, entry.correction()),
            None => self.manufacturer_default(&entry.manufacturer, entry.lens, entry.correction()),
        }
    }

    pub fn build(self) -> CorrectionTable {
        CorrectionTable {
            manufacturers: self.manufacturers,
        }
    }
}

impl Default for CorrectionTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}
