mod chunk;
pub mod config;
mod convert;
pub mod error;
mod join;
pub mod naming;
pub mod runner;

pub use config::{ConversionSettings, PipelineConfig};
pub use error::StageError;
pub use runner::{Pipeline, StageOutcome};
