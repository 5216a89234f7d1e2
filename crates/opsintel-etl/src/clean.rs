//! Cleaning a raw source into a typed fact-table frame.
//!
//! Steps, in order: map headers onto the table schema, parse cells by column
//! kind, drop exact duplicate rows (first occurrence wins), then impute
//! numeric nulls with the column median and categorical nulls with
//! [`UNKNOWN_CATEGORY`]. Null dates are kept so the quality check can see
//! them.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use opsintel_core::{
  frame::{Frame, Value},
  table::{ColumnKind, FactTable, UNKNOWN_CATEGORY},
};
use tracing::warn;

use crate::{Error, RawTable, Result};

/// Parse the date spellings sources are known to use.
pub fn parse_source_date(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .or_else(|| {
      NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.date())
    })
    .or_else(|| {
      NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.date())
    })
    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn parse_number(s: &str) -> Option<Value> {
  if let Ok(i) = s.parse::<i64>() {
    return Some(Value::Integer(i));
  }
  s.parse::<f64>().ok().map(|f| {
    if f.is_finite() { Value::Real(f) } else { Value::Null }
  })
}

/// Hashable image of a row for duplicate detection.
#[derive(PartialEq, Eq, Hash)]
enum CellKey<'a> {
  Null,
  Integer(i64),
  Real(u64),
  Text(&'a str),
}

fn row_key(row: &[Value]) -> Vec<CellKey<'_>> {
  row
    .iter()
    .map(|v| match v {
      Value::Null => CellKey::Null,
      Value::Integer(i) => CellKey::Integer(*i),
      Value::Real(r) => CellKey::Real(r.to_bits()),
      Value::Text(s) => CellKey::Text(s),
    })
    .collect()
}

fn median(values: &mut [f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  values.sort_by(f64::total_cmp);
  let mid = values.len() / 2;
  if values.len() % 2 == 0 {
    (values[mid - 1] + values[mid]) / 2.0
  } else {
    values[mid]
  }
}

/// Turn `raw` into a frame with exactly `table`'s schema columns.
pub fn clean(table: FactTable, raw: RawTable) -> Result<Frame> {
  let schema = table.schema();

  let mut positions = Vec::with_capacity(schema.len());
  for (column, _) in schema {
    let pos = raw
      .headers
      .iter()
      .position(|h| h == column.as_str())
      .ok_or(Error::MissingColumn { table, column: *column })?;
    positions.push(pos);
  }
  for header in &raw.headers {
    if !schema.iter().any(|(c, _)| c.as_str() == header) {
      warn!(table = %table, column = %header, "ignoring column not in schema");
    }
  }

  // Parse.
  let mut rows: Vec<Vec<Value>> = Vec::with_capacity(raw.records.len());
  for (i, record) in raw.records.into_iter().enumerate() {
    let mut row = Vec::with_capacity(schema.len());
    for ((column, kind), pos) in schema.iter().zip(&positions) {
      let cell = record.get(*pos).and_then(Option::as_deref);
      let value = match (kind, cell) {
        (_, None) => Value::Null,
        (ColumnKind::Date, Some(s)) => parse_source_date(s)
          .map(Value::from)
          .ok_or_else(|| Error::InvalidDate { table, row: i, value: s.to_owned() })?,
        (ColumnKind::Numeric, Some(s)) => {
          parse_number(s).ok_or_else(|| Error::InvalidNumber {
            table,
            column: *column,
            row: i,
            value: s.to_owned(),
          })?
        }
        (ColumnKind::Categorical, Some(s)) => Value::Text(s.to_owned()),
      };
      row.push(value);
    }
    rows.push(row);
  }

  // A numeric column holding any real or null is a real column throughout.
  for (idx, (_, kind)) in schema.iter().enumerate() {
    if *kind != ColumnKind::Numeric {
      continue;
    }
    let promote = rows
      .iter()
      .any(|r| matches!(r[idx], Value::Real(_) | Value::Null));
    if promote {
      for row in &mut rows {
        if let Value::Integer(n) = row[idx] {
          row[idx] = Value::Real(n as f64);
        }
      }
    }
  }

  // Deduplicate.
  let mut keep = Vec::with_capacity(rows.len());
  {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in &rows {
      keep.push(seen.insert(row_key(row)));
    }
  }
  let mut flags = keep.into_iter();
  rows.retain(|_| flags.next().unwrap_or(false));

  // Impute.
  for (idx, (_, kind)) in schema.iter().enumerate() {
    let fill = match kind {
      ColumnKind::Date => continue,
      ColumnKind::Categorical => Value::Text(UNKNOWN_CATEGORY.to_owned()),
      ColumnKind::Numeric => {
        let mut present: Vec<f64> = rows.iter().filter_map(|r| r[idx].as_f64()).collect();
        if present.len() == rows.len() {
          continue;
        }
        Value::Real(median(&mut present))
      }
    };
    for row in &mut rows {
      if row[idx].is_null() {
        row[idx] = fill.clone();
      }
    }
  }

  let mut frame = Frame::new(schema.iter().map(|(c, _)| *c).collect());
  for row in rows {
    frame.push(row)?;
  }
  Ok(frame)
}
