//! Closed enumerations of the fact tables and their columns.
//!
//! Every SQL statement the pipeline issues is assembled from these
//! identifiers only. Free-text table or column names never reach the store.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

// ─── Tables ──────────────────────────────────────────────────────────────────

/// The five raw metric tables replaced wholesale on every ETL run.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumIter,
  EnumString,
  IntoStaticStr,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FactTable {
  Finance,
  Sales,
  Operations,
  Hr,
  ItTickets,
}

/// How a column's cells are typed, cleaned, and stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
  /// Normalised to `YYYY-MM-DD`.
  Date,
  /// Integer or real; nulls imputed with the column median.
  Numeric,
  /// Free text; nulls imputed with [`UNKNOWN_CATEGORY`].
  Categorical,
}

/// Sentinel written into missing categorical cells at load time.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

const FINANCE: &[(Column, ColumnKind)] = &[
  (Column::Date, ColumnKind::Date),
  (Column::Revenue, ColumnKind::Numeric),
  (Column::Expenses, ColumnKind::Numeric),
  (Column::Profit, ColumnKind::Numeric),
  (Column::Budget, ColumnKind::Numeric),
  (Column::BudgetVariancePct, ColumnKind::Numeric),
  (Column::ProfitMarginPct, ColumnKind::Numeric),
];

const SALES: &[(Column, ColumnKind)] = &[
  (Column::Date, ColumnKind::Date),
  (Column::Region, ColumnKind::Categorical),
  (Column::UnitsSold, ColumnKind::Numeric),
  (Column::LeadsGenerated, ColumnKind::Numeric),
  (Column::ConversionRatePct, ColumnKind::Numeric),
  (Column::AvgDealSize, ColumnKind::Numeric),
  (Column::TotalRevenue, ColumnKind::Numeric),
];

const OPERATIONS: &[(Column, ColumnKind)] = &[
  (Column::Date, ColumnKind::Date),
  (Column::OrdersProcessed, ColumnKind::Numeric),
  (Column::AvgProcessingTimeHours, ColumnKind::Numeric),
  (Column::OntimeDeliveryPct, ColumnKind::Numeric),
  (Column::DowntimeHours, ColumnKind::Numeric),
  (Column::DefectRatePct, ColumnKind::Numeric),
  (Column::OperationalEfficiencyPct, ColumnKind::Numeric),
];

const HR: &[(Column, ColumnKind)] = &[
  (Column::Date, ColumnKind::Date),
  (Column::EmployeeCount, ColumnKind::Numeric),
  (Column::NewHires, ColumnKind::Numeric),
  (Column::Terminations, ColumnKind::Numeric),
  (Column::TurnoverRatePct, ColumnKind::Numeric),
  (Column::AbsenteeismRatePct, ColumnKind::Numeric),
  (Column::TrainingCost, ColumnKind::Numeric),
  (Column::SatisfactionScore, ColumnKind::Numeric),
];

const IT_TICKETS: &[(Column, ColumnKind)] = &[
  (Column::Date, ColumnKind::Date),
  (Column::Priority, ColumnKind::Categorical),
  (Column::TicketsOpened, ColumnKind::Numeric),
  (Column::TicketsClosed, ColumnKind::Numeric),
  (Column::TicketsPending, ColumnKind::Numeric),
  (Column::AvgResolutionTimeHours, ColumnKind::Numeric),
  (Column::FirstResponseTimeHours, ColumnKind::Numeric),
];

impl FactTable {
  /// Load order used by the ETL orchestrator.
  pub const ALL: [Self; 5] =
    [Self::Finance, Self::Sales, Self::Operations, Self::Hr, Self::ItTickets];

  pub fn as_str(self) -> &'static str { self.into() }

  /// Ordered column layout of the table.
  pub fn schema(self) -> &'static [(Column, ColumnKind)] {
    match self {
      Self::Finance => FINANCE,
      Self::Sales => SALES,
      Self::Operations => OPERATIONS,
      Self::Hr => HR,
      Self::ItTickets => IT_TICKETS,
    }
  }

  pub fn kind_of(self, column: Column) -> Option<ColumnKind> {
    self
      .schema()
      .iter()
      .find(|(c, _)| *c == column)
      .map(|(_, k)| *k)
  }

  /// Reject any column that is not part of this table.
  pub fn check_column(self, column: Column) -> Result<ColumnKind> {
    self
      .kind_of(column)
      .ok_or(Error::UnknownColumn { table: self, column })
  }

  /// Parse a table identifier, e.g. `"it_tickets"`.
  pub fn parse(name: &str) -> Result<Self> {
    name
      .parse()
      .map_err(|_| Error::UnknownTable(name.to_owned()))
  }
}

// ─── Columns ─────────────────────────────────────────────────────────────────

/// Every column that appears in a fact table.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  EnumIter,
  EnumString,
  IntoStaticStr,
  strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Column {
  Date,
  // finance
  Revenue,
  Expenses,
  Profit,
  Budget,
  BudgetVariancePct,
  ProfitMarginPct,
  // sales
  Region,
  UnitsSold,
  LeadsGenerated,
  ConversionRatePct,
  AvgDealSize,
  TotalRevenue,
  // operations
  OrdersProcessed,
  AvgProcessingTimeHours,
  OntimeDeliveryPct,
  DowntimeHours,
  DefectRatePct,
  OperationalEfficiencyPct,
  // hr
  EmployeeCount,
  NewHires,
  Terminations,
  TurnoverRatePct,
  AbsenteeismRatePct,
  TrainingCost,
  SatisfactionScore,
  // it_tickets
  Priority,
  TicketsOpened,
  TicketsClosed,
  TicketsPending,
  AvgResolutionTimeHours,
  FirstResponseTimeHours,
}

impl Column {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(name: &str) -> Result<Self> {
    name
      .parse()
      .map_err(|_| Error::UnknownColumnName(name.to_owned()))
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn identifiers_are_snake_case() {
    assert_eq!(FactTable::ItTickets.as_str(), "it_tickets");
    assert_eq!(Column::OntimeDeliveryPct.as_str(), "ontime_delivery_pct");
    assert_eq!(Column::BudgetVariancePct.as_str(), "budget_variance_pct");
    assert_eq!(FactTable::parse("hr").unwrap(), FactTable::Hr);
  }

  #[test]
  fn every_table_starts_with_date() {
    for table in FactTable::iter() {
      assert_eq!(table.schema()[0], (Column::Date, ColumnKind::Date));
    }
  }

  #[test]
  fn foreign_column_is_rejected() {
    let err = FactTable::Finance.check_column(Column::Region).unwrap_err();
    assert!(matches!(
      err,
      Error::UnknownColumn { table: FactTable::Finance, column: Column::Region }
    ));
    assert!(Column::parse("revenue; DROP TABLE finance").is_err());
  }
}
