//! Synthetic monthly business data.
//!
//! Shapes: finance grows 3% a month with a yearly cycle, sales splits across
//! four regions, operations improves gradually, HR grows with seasonal
//! turnover, IT tickets come in four priorities. All draws come from one
//! seeded RNG, so a given seed and window always produce the same files.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use opsintel_core::{config::DataWindow, frame, table::FactTable};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Exp, Normal, Poisson};
use tracing::info;

use crate::{Error, Result};

/// Produces the raw sources when they are absent or a refresh asks for it.
pub trait DataGenerator: Send + Sync {
  /// Write every source, returning the rows written per table.
  fn generate(&self) -> Result<Vec<(FactTable, usize)>>;
}

const REGIONS: [(&str, f64); 4] =
  [("North", 1.2), ("South", 0.9), ("East", 1.1), ("West", 1.0)];

/// `(priority, share of tickets, base resolution hours)`
const PRIORITIES: [(&str, f64, f64); 4] = [
  ("Critical", 0.10, 4.0),
  ("High", 0.25, 16.0),
  ("Medium", 0.40, 40.0),
  ("Low", 0.25, 72.0),
];

// ─── Sampling helpers ────────────────────────────────────────────────────────

fn normal(rng: &mut StdRng, mean: f64, std_dev: f64) -> f64 {
  Normal::new(mean, std_dev).map_or(mean, |d| d.sample(rng))
}

fn poisson(rng: &mut StdRng, lambda: f64) -> f64 {
  Poisson::new(lambda).map_or(lambda, |d| d.sample(rng))
}

fn exponential(rng: &mut StdRng, mean: f64) -> f64 {
  Exp::new(1.0 / mean).map_or(mean, |d| d.sample(rng))
}

fn round2(v: f64) -> f64 { (v * 100.0).round() / 100.0 }

/// `periods` consecutive month-end dates starting with the month of `start`.
pub(crate) fn month_ends(start: NaiveDate, periods: u32) -> Vec<NaiveDate> {
  let mut dates = Vec::with_capacity(periods as usize);
  let first = frame::month_end(start);
  for i in 0..periods {
    dates.push(frame::add_months(first, i));
  }
  dates
}

// ─── Generator ───────────────────────────────────────────────────────────────

/// Writes `<dir>/<table>.csv` for all five tables.
#[derive(Debug, Clone)]
pub struct SyntheticGenerator {
  dir:    PathBuf,
  window: DataWindow,
  seed:   u64,
}

type Rows = Vec<Vec<String>>;

impl SyntheticGenerator {
  pub fn new(dir: impl Into<PathBuf>, window: DataWindow, seed: u64) -> Self {
    Self { dir: dir.into(), window, seed }
  }

  fn dates(&self) -> Vec<NaiveDate> { month_ends(self.window.start_date, self.window.periods) }

  fn finance(&self, rng: &mut StdRng) -> Rows {
    let dates = self.dates();
    let revenue: Vec<f64> = (0..dates.len())
      .map(|i| {
        let trend = 500_000.0 * 1.03_f64.powi(i as i32);
        let season = (i as f64 * 2.0 * std::f64::consts::PI / 12.0).sin() * 50_000.0;
        (trend + season + normal(rng, 0.0, 20_000.0)).max(0.0)
      })
      .collect();
    let expenses: Vec<f64> = revenue
      .iter()
      .map(|r| r * rng.random_range(0.65..0.75) + normal(rng, 0.0, 15_000.0))
      .collect();
    let budget: Vec<f64> = revenue
      .iter()
      .map(|r| r * rng.random_range(0.95..1.05))
      .collect();

    dates
      .iter()
      .enumerate()
      .map(|(i, date)| {
        let (r, e, b) = (revenue[i], expenses[i], budget[i]);
        let profit = r - e;
        let margin = if r > 0.0 { profit / r * 100.0 } else { 0.0 };
        vec![
          frame::format_date(*date),
          r.to_string(),
          e.to_string(),
          profit.to_string(),
          b.to_string(),
          ((r - b) / b * 100.0).to_string(),
          margin.to_string(),
        ]
      })
      .collect()
  }

  fn sales(&self, rng: &mut StdRng) -> Rows {
    let mut rows = Vec::new();
    for date in self.dates() {
      for (region, mult) in REGIONS {
        let units = normal(rng, 1000.0 * mult, 150.0).trunc();
        let conversion = rng.random_range(0.15..0.35) * mult;
        let deal = normal(rng, 5000.0, 500.0);
        let leads = (units / conversion.max(0.01)).trunc();
        rows.push(vec![
          frame::format_date(date),
          region.to_owned(),
          (units.max(0.0) as i64).to_string(),
          (leads.max(0.0) as i64).to_string(),
          round2(conversion * 100.0).to_string(),
          round2(deal.max(1000.0)).to_string(),
          round2((units * deal).max(0.0)).to_string(),
        ]);
      }
    }
    rows
  }

  fn operations(&self, rng: &mut StdRng) -> Rows {
    self
      .dates()
      .into_iter()
      .enumerate()
      .map(|(i, date)| {
        let improvement = 1.0 - i as f64 * 0.01;
        let orders = normal(rng, 3500.0, 300.0) as i64;
        let processing = normal(rng, 48.0 * improvement, 8.0).max(1.0);
        let ontime = normal(rng, 90.0 + i as f64 * 0.3, 5.0).clamp(70.0, 100.0);
        let downtime = (exponential(rng, 4.0) * improvement).max(0.0);
        let defects = normal(rng, 3.0 * improvement, 1.0).clamp(0.0, 10.0);
        vec![
          frame::format_date(date),
          orders.to_string(),
          round2(processing).to_string(),
          round2(ontime).to_string(),
          round2(downtime).to_string(),
          round2(defects).to_string(),
          round2((ontime + (100.0 - defects)) / 2.0).to_string(),
        ]
      })
      .collect()
  }

  fn hr(&self, rng: &mut StdRng) -> Rows {
    self
      .dates()
      .into_iter()
      .enumerate()
      .map(|(i, date)| {
        let employees = (250.0 + i as f64 * 2.0 + normal(rng, 0.0, 5.0)) as i64;
        let season = (i as f64 * 2.0 * std::f64::consts::PI / 12.0).sin() * 3.0;
        let turnover = normal(rng, 12.0 + season, 2.0).clamp(0.0, 25.0);
        let absenteeism = normal(rng, 3.5, 1.0).clamp(0.0, 10.0);
        let training = employees as f64 * rng.random_range(200.0..400.0);
        let satisfaction = normal(rng, 7.5, 0.8).clamp(5.0, 10.0);
        vec![
          frame::format_date(date),
          employees.to_string(),
          (poisson(rng, 5.0) as i64).to_string(),
          (poisson(rng, 3.0) as i64).to_string(),
          round2(turnover).to_string(),
          round2(absenteeism).to_string(),
          round2(training).to_string(),
          round2(satisfaction).to_string(),
        ]
      })
      .collect()
  }

  fn it_tickets(&self, rng: &mut StdRng) -> Rows {
    let mut rows = Vec::new();
    for (i, date) in self.dates().into_iter().enumerate() {
      let improvement = 1.0 - i as f64 * 0.015;
      for (priority, share, base) in PRIORITIES {
        let opened = poisson(rng, 300.0 * share) as i64;
        let closed = (opened as f64 * rng.random_range(0.85..1.1)) as i64;
        let resolution = normal(rng, base * improvement, base * 0.3).max(1.0);
        rows.push(vec![
          frame::format_date(date),
          priority.to_owned(),
          opened.to_string(),
          closed.to_string(),
          (opened - closed).max(0).to_string(),
          round2(resolution).to_string(),
          round2(resolution * 0.2).to_string(),
        ]);
      }
    }
    rows
  }

  fn write(&self, table: FactTable, rows: &Rows) -> Result<()> {
    let mut writer = csv::Writer::from_path(csv_path(&self.dir, table))?;
    writer.write_record(table.schema().iter().map(|(c, _)| c.as_str()))?;
    for row in rows {
      writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
  }
}

fn csv_path(dir: &Path, table: FactTable) -> PathBuf {
  dir.join(format!("{}.csv", table.as_str()))
}

impl DataGenerator for SyntheticGenerator {
  fn generate(&self) -> Result<Vec<(FactTable, usize)>> {
    if self.window.periods == 0 {
      return Err(Error::Generate("data window has zero periods".to_owned()));
    }
    std::fs::create_dir_all(&self.dir)?;

    let mut rng = StdRng::seed_from_u64(self.seed);
    let mut written = Vec::with_capacity(FactTable::ALL.len());
    for table in FactTable::ALL {
      let rows = match table {
        FactTable::Finance => self.finance(&mut rng),
        FactTable::Sales => self.sales(&mut rng),
        FactTable::Operations => self.operations(&mut rng),
        FactTable::Hr => self.hr(&mut rng),
        FactTable::ItTickets => self.it_tickets(&mut rng),
      };
      self.write(table, &rows)?;
      info!(table = %table, rows = rows.len(), "generated source");
      written.push((table, rows.len()));
    }
    Ok(written)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{CsvDirSource, DataSource, clean};

  fn window(periods: u32) -> DataWindow {
    DataWindow { start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), periods }
  }

  #[test]
  fn month_ends_roll_over_years() {
    let dates = month_ends(NaiveDate::from_ymd_opt(2023, 11, 1).unwrap(), 4);
    let expected = ["2023-11-30", "2023-12-31", "2024-01-31", "2024-02-29"];
    let got: Vec<String> = dates.into_iter().map(frame::format_date).collect();
    assert_eq!(got, expected);
  }

  #[test]
  fn writes_every_table_with_expected_shapes() {
    let dir = tempfile::tempdir().unwrap();
    let counts = SyntheticGenerator::new(dir.path(), window(24), 42)
      .generate()
      .unwrap();

    let by_table: std::collections::HashMap<_, _> = counts.into_iter().collect();
    assert_eq!(by_table[&FactTable::Finance], 24);
    assert_eq!(by_table[&FactTable::Sales], 24 * 4);
    assert_eq!(by_table[&FactTable::ItTickets], 24 * 4);

    let source = CsvDirSource::new(dir.path());
    for table in FactTable::ALL {
      let frame = clean(table, source.read(table).unwrap()).unwrap();
      assert!(!frame.is_empty(), "{table} is empty");
    }
  }

  #[test]
  fn same_seed_same_files() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    SyntheticGenerator::new(a.path(), window(6), 7).generate().unwrap();
    SyntheticGenerator::new(b.path(), window(6), 7).generate().unwrap();

    let read = |dir: &Path| std::fs::read_to_string(dir.join("hr.csv")).unwrap();
    assert_eq!(read(a.path()), read(b.path()));
  }

  #[test]
  fn zero_periods_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SyntheticGenerator::new(dir.path(), window(0), 1)
      .generate()
      .unwrap_err();
    assert!(err.is_fatal());
  }
}
