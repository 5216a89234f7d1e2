//! Raw tabular sources, one per fact table.

use std::path::{Path, PathBuf};

use opsintel_core::table::FactTable;

use crate::{Error, Result};

/// Header plus string cells, as read from a source. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
  pub headers: Vec<String>,
  pub records: Vec<Vec<Option<String>>>,
}

/// Where raw metric tables come from.
pub trait DataSource: Send + Sync {
  fn exists(&self, table: FactTable) -> bool;

  fn read(&self, table: FactTable) -> Result<RawTable>;
}

// ─── CSV directory ───────────────────────────────────────────────────────────

/// `<dir>/<table>.csv` files with a header row.
#[derive(Debug, Clone)]
pub struct CsvDirSource {
  dir: PathBuf,
}

impl CsvDirSource {
  pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

  pub fn dir(&self) -> &Path { &self.dir }

  pub fn path_of(&self, table: FactTable) -> PathBuf {
    self.dir.join(format!("{}.csv", table.as_str()))
  }
}

impl DataSource for CsvDirSource {
  fn exists(&self, table: FactTable) -> bool { self.path_of(table).is_file() }

  fn read(&self, table: FactTable) -> Result<RawTable> {
    let path = self.path_of(table);
    if !path.is_file() {
      return Err(Error::MissingSource(table));
    }

    let mut reader = csv::Reader::from_path(&path)?;
    let headers = reader
      .headers()?
      .iter()
      .map(|h| h.trim().to_owned())
      .collect();

    let mut records = Vec::new();
    for result in reader.records() {
      let record = result?;
      records.push(
        record
          .iter()
          .map(|cell| {
            let cell = cell.trim();
            (!cell.is_empty()).then(|| cell.to_owned())
          })
          .collect(),
      );
    }

    Ok(RawTable { headers, records })
  }
}
