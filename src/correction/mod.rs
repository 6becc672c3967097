mod table;
mod types;

pub use table::{CorrectionTable, CorrectionTableBuilder};
pub use types::{CorrectionEntry, LensDirection, ManufacturerCorrection};
