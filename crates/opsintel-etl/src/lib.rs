//! ETL orchestration for OpsIntel.
//!
//! Reads the five raw metric sources, cleans them and replaces the fact
//! tables through a [`MetricStore`](opsintel_core::store::MetricStore), then
//! runs post-load quality checks and writes `etl_summary.json`.
//!
//! Only schema initialisation (and source generation, when requested) is
//! fatal. Each table load is an independent unit whose outcome lands in the
//! [`PipelineReport`].

mod clean;
mod generate;
mod pipeline;
mod source;

pub mod error;

pub use clean::{clean, parse_source_date};
pub use error::{Error, Result};
pub use generate::{DataGenerator, SyntheticGenerator};
pub use pipeline::{
  EtlPipeline, EtlSummary, PipelineReport, QualityCheck, SchemaSource, TableReport,
  SUMMARY_FILE,
};
pub use source::{CsvDirSource, DataSource, RawTable};
