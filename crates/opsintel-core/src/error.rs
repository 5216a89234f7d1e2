//! Error types for `opsintel-core`.

use thiserror::Error;

use crate::table::{Column, FactTable};

#[derive(Debug, Error)]
pub enum Error {
  #[error("column {column} does not belong to table {table}")]
  UnknownColumn { table: FactTable, column: Column },

  #[error("unknown table identifier: {0:?}")]
  UnknownTable(String),

  #[error("unknown column identifier: {0:?}")]
  UnknownColumnName(String),

  #[error("frame row {row} has {got} values, expected {expected}")]
  RowWidth { row: usize, got: usize, expected: usize },

  #[error("invalid date {0:?}")]
  InvalidDate(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
