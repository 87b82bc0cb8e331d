pub mod config;
pub mod core;
pub mod export;
pub mod metrics;
pub mod parser;
pub mod pipeline;
pub mod table;

pub use config::EvalConfig;
pub use core::model::{CellDescriptor, GridCell, LogicalCell, Record};
pub use pipeline::{BatchReport, DocumentScores};
