//! Error types for the ETL orchestrator.

use std::path::PathBuf;

use opsintel_core::table::{Column, FactTable};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The schema file is missing or unreadable. Aborts the run.
  #[error("schema definition unavailable at {path}: {source}")]
  SchemaUnavailable {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The store rejected the schema script. Aborts the run.
  #[error("malformed schema: {0}")]
  SchemaScript(Box<dyn std::error::Error + Send + Sync>),

  #[error("source for {0} not found")]
  MissingSource(FactTable),

  #[error("{table}: source has no `{column}` column")]
  MissingColumn { table: FactTable, column: Column },

  #[error("{table}: row {row}: invalid date {value:?}")]
  InvalidDate { table: FactTable, row: usize, value: String },

  #[error("{table}: row {row}: `{column}` is not numeric: {value:?}")]
  InvalidNumber {
    table:  FactTable,
    column: Column,
    row:    usize,
    value:  String,
  },

  #[error("data generation failed: {0}")]
  Generate(String),

  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("core error: {0}")]
  Core(#[from] opsintel_core::Error),
}

impl Error {
  /// Whether this error aborts the whole pipeline rather than one table.
  pub fn is_fatal(&self) -> bool {
    matches!(
      self,
      Self::SchemaUnavailable { .. } | Self::SchemaScript(_) | Self::Generate(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
