//! A metric column with the display name used in derived rows.

use opsintel_core::table::{Column, FactTable};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSpec {
  pub table:        FactTable,
  pub column:       Column,
  pub display_name: &'static str,
}

impl MetricSpec {
  /// Checked constructor; the column must belong to the table.
  pub fn new(table: FactTable, column: Column, display_name: &'static str) -> Result<Self> {
    table.check_column(column)?;
    Ok(Self { table, column, display_name })
  }

  pub(crate) const fn of(
    table: FactTable,
    column: Column,
    display_name: &'static str,
  ) -> Self {
    Self { table, column, display_name }
  }
}
