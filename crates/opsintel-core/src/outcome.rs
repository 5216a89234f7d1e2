//! Per-unit results for the recoverable stages of a run.
//!
//! A unit is one table load, one metric scan, one insight domain, or one
//! forecast. Failures are caught at the unit boundary and reported here rather
//! than propagated, so a caller can tell "no data" from "error" from
//! "threshold not met".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UnitOutcome {
  /// The unit ran; `count` is rows loaded, anomalies flagged, insights
  /// emitted or points forecast.
  Completed { count: usize },
  /// The unit had nothing to act on.
  Skipped { reason: String },
  /// The unit raised; siblings were unaffected.
  Failed { error: String },
}

impl UnitOutcome {
  pub fn failed(e: impl std::fmt::Display) -> Self { Self::Failed { error: e.to_string() } }

  pub fn skipped(reason: impl Into<String>) -> Self { Self::Skipped { reason: reason.into() } }

  pub fn is_failed(&self) -> bool { matches!(self, Self::Failed { .. }) }

  pub fn count(&self) -> usize {
    match self {
      Self::Completed { count } => *count,
      _ => 0,
    }
  }
}

/// A named unit and how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
  pub unit:    String,
  #[serde(flatten)]
  pub outcome: UnitOutcome,
}

impl UnitReport {
  pub fn new(unit: impl Into<String>, outcome: UnitOutcome) -> Self {
    Self { unit: unit.into(), outcome }
  }
}
