//! Tabular data exchanged with the store: typed cells in a column-labelled
//! frame.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, table::Column};

/// Canonical on-disk date format for every `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String { date.format(DATE_FORMAT).to_string() }

pub fn parse_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| Error::InvalidDate(s.to_owned()))
}

/// Last day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
  date
    .with_day(1)
    .and_then(|first| first.checked_add_months(Months::new(1)))
    .and_then(|next| next.pred_opt())
    .unwrap_or(date)
}

/// Shift `date` by `n` months. Month-end dates stay on month ends.
pub fn add_months(date: NaiveDate, n: u32) -> NaiveDate {
  if date == month_end(date) {
    date
      .with_day(1)
      .and_then(|first| first.checked_add_months(Months::new(n)))
      .map_or(date, month_end)
  } else {
    date.checked_add_months(Months::new(n)).unwrap_or(date)
  }
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A single cell. Mirrors SQLite's storage classes minus BLOB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Self::Integer(i) => Some(*i as f64),
      Self::Real(r) => Some(*r),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  /// Dates travel as `YYYY-MM-DD` text.
  pub fn as_date(&self) -> Option<NaiveDate> {
    self.as_str().and_then(|s| parse_date(s).ok())
  }
}

impl From<NaiveDate> for Value {
  fn from(d: NaiveDate) -> Self { Self::Text(format_date(d)) }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self { Self::Real(v) }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

// ─── Frame ───────────────────────────────────────────────────────────────────

/// Rows of cells under a fixed column header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
  pub columns: Vec<Column>,
  pub rows:    Vec<Vec<Value>>,
}

impl Frame {
  pub fn new(columns: Vec<Column>) -> Self { Self { columns, rows: Vec::new() } }

  /// Append a row, checking its width against the header.
  pub fn push(&mut self, row: Vec<Value>) -> Result<()> {
    if row.len() != self.columns.len() {
      return Err(Error::RowWidth {
        row:      self.rows.len(),
        got:      row.len(),
        expected: self.columns.len(),
      });
    }
    self.rows.push(row);
    Ok(())
  }

  pub fn len(&self) -> usize { self.rows.len() }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }

  pub fn index_of(&self, column: Column) -> Option<usize> {
    self.columns.iter().position(|c| *c == column)
  }

  pub fn get(&self, row: usize, column: Column) -> Option<&Value> {
    let idx = self.index_of(column)?;
    self.rows.get(row).and_then(|r| r.get(idx))
  }

  pub fn f64_at(&self, row: usize, column: Column) -> Option<f64> {
    self.get(row, column).and_then(Value::as_f64)
  }

  pub fn date_at(&self, row: usize, column: Column) -> Option<NaiveDate> {
    self.get(row, column).and_then(Value::as_date)
  }

  pub fn str_at(&self, row: usize, column: Column) -> Option<&str> {
    self.get(row, column).and_then(Value::as_str)
  }

  /// `(date, value)` pairs where both cells are present.
  pub fn series(&self, date: Column, value: Column) -> Vec<(NaiveDate, f64)> {
    (0..self.len())
      .filter_map(|i| Some((self.date_at(i, date)?, self.f64_at(i, value)?)))
      .collect()
  }

  /// Reverse row order in place; used to turn a "latest N" fetch into
  /// chronological order.
  pub fn reverse(&mut self) { self.rows.reverse(); }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn push_rejects_wrong_width() {
    let mut f = Frame::new(vec![Column::Date, Column::Revenue]);
    f.push(vec!["2024-01-31".into(), 10.0.into()]).unwrap();
    let err = f.push(vec![Value::Null]).unwrap_err();
    assert!(matches!(err, Error::RowWidth { got: 1, expected: 2, .. }));
  }

  #[test]
  fn month_ends_stay_month_ends() {
    let jan = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
    assert_eq!(add_months(jan, 1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
    assert_eq!(add_months(jan, 12), NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    let mid = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    assert_eq!(add_months(mid, 2), NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
    assert_eq!(month_end(mid), jan);
  }

  #[test]
  fn series_skips_nulls() {
    let mut f = Frame::new(vec![Column::Date, Column::Revenue]);
    f.push(vec!["2024-01-31".into(), 10.0.into()]).unwrap();
    f.push(vec!["2024-02-29".into(), Value::Null]).unwrap();
    f.push(vec![Value::Null, 3.0.into()]).unwrap();
    f.push(vec!["2024-03-31".into(), Value::Integer(7)]).unwrap();

    let s = f.series(Column::Date, Column::Revenue);
    assert_eq!(s.len(), 2);
    assert_eq!(s[1].1, 7.0);
  }
}
