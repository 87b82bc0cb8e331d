pub mod assignment;
pub mod detection;
pub mod provenance;
pub mod records;
pub mod teds;
pub mod tree_edit;

pub use detection::{mean_average_precision, DetectionReport, IouThresholds};
pub use records::{information_extraction_pr, PrecisionRecall, DEFAULT_FIELD_THRESHOLD};
pub use teds::{teds_pair, Teds, TedsScores};
