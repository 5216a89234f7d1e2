//! In-sample accuracy of a forecast against the history it was fitted on.

use std::collections::HashMap;

use chrono::NaiveDate;
use opsintel_core::record::{AccuracyMetrics, ForecastPoint};

fn round2(v: f64) -> f64 { (v * 100.0).round() / 100.0 }

/// RMSE, MAE and MAPE over the dates both series share.
///
/// A zero actual divides the MAPE term by 1 instead. All metrics are zero
/// when the series share no dates.
pub fn accuracy(history: &[(NaiveDate, f64)], forecast: &[ForecastPoint]) -> AccuracyMetrics {
  let predicted: HashMap<NaiveDate, f64> =
    forecast.iter().map(|p| (p.date, p.forecast_value)).collect();

  let pairs: Vec<(f64, f64)> = history
    .iter()
    .filter_map(|(date, actual)| predicted.get(date).map(|p| (*actual, *p)))
    .collect();
  if pairs.is_empty() {
    return AccuracyMetrics::default();
  }

  let n = pairs.len() as f64;
  let mse = pairs.iter().map(|(a, p)| (a - p).powi(2)).sum::<f64>() / n;
  let mae = pairs.iter().map(|(a, p)| (a - p).abs()).sum::<f64>() / n;
  let mape = pairs
    .iter()
    .map(|(a, p)| {
      let denom = if *a != 0.0 { *a } else { 1.0 };
      ((a - p) / denom).abs()
    })
    .sum::<f64>()
    / n
    * 100.0;

  AccuracyMetrics { rmse: round2(mse.sqrt()), mae: round2(mae), mape: round2(mape) }
}
