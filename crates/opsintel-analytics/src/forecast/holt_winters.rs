//! Additive Holt-Winters exponential smoothing over monthly series.

use chrono::NaiveDate;
use opsintel_core::{config::ForecastConfig, frame::add_months, record::ForecastPoint};

use crate::{Error, Result};

/// Months per seasonal cycle.
const YEAR: usize = 12;

/// A model that can be fitted to a dated history.
pub trait ForecastModel: Send + Sync {
  type Fitted: FittedModel;

  /// Stored in the `model_used` column.
  fn name(&self) -> &'static str;

  /// `history` is in date order.
  fn fit(&self, history: &[(NaiveDate, f64)]) -> Result<Self::Fitted>;
}

pub trait FittedModel {
  /// One in-sample point per history date, then `horizon` future points.
  fn predict(&self, horizon: usize) -> Vec<ForecastPoint>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct HoltWinters {
  alpha:      f64,
  beta:       f64,
  gamma:      f64,
  interval_z: f64,
  yearly:     bool,
}

impl HoltWinters {
  pub fn new(config: &ForecastConfig) -> Self {
    Self {
      alpha:      config.alpha,
      beta:       config.beta,
      gamma:      config.gamma,
      interval_z: config.interval_z,
      yearly:     config.yearly_seasonality,
    }
  }
}

fn mean(values: &[f64]) -> f64 { values.iter().sum::<f64>() / values.len() as f64 }

/// Smoothed state after the last observation.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedHoltWinters {
  dates:     Vec<NaiveDate>,
  fitted:    Vec<f64>,
  level:     f64,
  trend:     f64,
  /// Empty when the series is too short for a seasonal fit.
  seasonals: Vec<f64>,
  sigma:     f64,
  z:         f64,
}

impl FittedHoltWinters {
  fn seasonal(&self, t: usize) -> f64 {
    if self.seasonals.is_empty() { 0.0 } else { self.seasonals[t % self.seasonals.len()] }
  }
}

impl ForecastModel for HoltWinters {
  type Fitted = FittedHoltWinters;

  fn name(&self) -> &'static str { "holt_winters" }

  fn fit(&self, history: &[(NaiveDate, f64)]) -> Result<FittedHoltWinters> {
    let n = history.len();
    if n < 2 {
      return Err(Error::InsufficientData { metric: self.name().to_owned(), needed: 2, got: n });
    }
    let y: Vec<f64> = history.iter().map(|(_, v)| *v).collect();

    // Initial state, expressed as the state just before the first point.
    let seasonal = self.yearly && n >= 2 * YEAR;
    let (mut level, mut trend, mut seasonals) = if seasonal {
      let first = mean(&y[..YEAR]);
      let trend = (mean(&y[YEAR..2 * YEAR]) - first) / YEAR as f64;
      let level0 = first - trend * (YEAR - 1) as f64 / 2.0;
      let seasonals = (0..YEAR).map(|i| y[i] - (level0 + trend * i as f64)).collect();
      (level0 - trend, trend, seasonals)
    } else {
      let trend = (y[n - 1] - y[0]) / (n - 1) as f64;
      (y[0] - trend, trend, Vec::new())
    };

    let mut fitted = Vec::with_capacity(n);
    for (t, value) in y.iter().enumerate() {
      let idx = if seasonal { t % YEAR } else { 0 };
      let s = seasonals.get(idx).copied().unwrap_or(0.0);

      // Predict before seeing the value.
      fitted.push(level + trend + s);

      let last_level = level;
      level = self.alpha * (value - s) + (1.0 - self.alpha) * (last_level + trend);
      trend = self.beta * (level - last_level) + (1.0 - self.beta) * trend;
      if seasonal {
        seasonals[idx] = self.gamma * (value - level) + (1.0 - self.gamma) * s;
      }
    }

    let sse: f64 = y.iter().zip(&fitted).map(|(a, f)| (a - f).powi(2)).sum();
    let sigma = (sse / n as f64).sqrt();

    Ok(FittedHoltWinters {
      dates: history.iter().map(|(d, _)| *d).collect(),
      fitted,
      level,
      trend,
      seasonals,
      sigma,
      z: self.interval_z,
    })
  }
}

impl FittedModel for FittedHoltWinters {
  fn predict(&self, horizon: usize) -> Vec<ForecastPoint> {
    let half = self.z * self.sigma;
    let point = |date, value: f64, width: f64| ForecastPoint {
      date,
      forecast_value: value,
      lower_bound: value - width,
      upper_bound: value + width,
    };

    let mut out: Vec<ForecastPoint> = self
      .dates
      .iter()
      .zip(&self.fitted)
      .map(|(d, v)| point(*d, *v, half))
      .collect();

    let Some(last) = self.dates.last().copied() else {
      return out;
    };
    let n = self.dates.len();
    for h in 1..=horizon {
      let value = self.level + h as f64 * self.trend + self.seasonal(n + h - 1);
      out.push(point(add_months(last, h as u32), value, half * (h as f64).sqrt()));
    }
    out
  }
}
