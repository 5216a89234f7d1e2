//! Error type for the analytics engines.

use opsintel_core::table::{Column, FactTable};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),

  #[error("core error: {0}")]
  Core(#[from] opsintel_core::Error),

  #[error("{table}.{column} has a missing value in row {row}")]
  MissingValue { table: FactTable, column: Column, row: usize },

  #[error("{metric}: need at least {needed} observations, got {got}")]
  InsufficientData { metric: String, needed: usize, got: usize },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

impl Error {
  pub(crate) fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
