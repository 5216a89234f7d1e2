//! Analytics configuration: data window, forecast, anomaly and KPI
//! thresholds.
//!
//! Every struct deserialises with defaults so a partial config file (or none
//! at all) yields the stock settings.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::record::DetectionMethod;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
  pub data:       DataWindow,
  pub forecast:   ForecastConfig,
  pub anomaly:    AnomalyConfig,
  pub thresholds: KpiThresholds,
}

// ─── Data window ─────────────────────────────────────────────────────────────

/// Range of months the synthetic source covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataWindow {
  pub start_date: NaiveDate,
  pub periods:    u32,
}

impl Default for DataWindow {
  fn default() -> Self {
    Self {
      start_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
      periods:    24,
    }
  }
}

// ─── Forecast ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
  /// Months to forecast past the last observation.
  pub periods:            usize,
  pub yearly_seasonality: bool,
  /// Accepted for compatibility; monthly data carries no weekly cycle.
  pub weekly_seasonality: bool,
  /// Accepted for compatibility; monthly data carries no daily cycle.
  pub daily_seasonality:  bool,
  /// Level smoothing factor.
  pub alpha:              f64,
  /// Trend smoothing factor.
  pub beta:               f64,
  /// Seasonal smoothing factor.
  pub gamma:              f64,
  /// Half-width of the prediction interval in residual standard deviations.
  pub interval_z:         f64,
}

impl Default for ForecastConfig {
  fn default() -> Self {
    Self {
      periods:            6,
      yearly_seasonality: true,
      weekly_seasonality: false,
      daily_seasonality:  false,
      alpha:              0.5,
      beta:               0.1,
      gamma:              0.3,
      interval_z:         1.2816,
    }
  }
}

// ─── Anomaly ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
  /// Expected share of outliers for the isolation forest.
  pub contamination:     f64,
  pub z_score_threshold: f64,
  pub method:            DetectionMethod,
  pub n_estimators:      usize,
  pub seed:              u64,
}

impl Default for AnomalyConfig {
  fn default() -> Self {
    Self {
      contamination:     0.1,
      z_score_threshold: 3.0,
      method:            DetectionMethod::ZScore,
      n_estimators:      100,
      seed:              42,
    }
  }
}

// ─── KPI thresholds ──────────────────────────────────────────────────────────

/// A `{good, warning, critical}` triple. Direction (higher-is-better or
/// lower-is-better) is fixed by the rule that reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
  pub good:     f64,
  pub warning:  f64,
  pub critical: f64,
}

impl Threshold {
  pub const fn new(good: f64, warning: f64, critical: f64) -> Self {
    Self { good, warning, critical }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiThresholds {
  /// Month-over-month revenue growth, percent.
  pub revenue_growth:          Threshold,
  pub profit_margin:           Threshold,
  pub employee_turnover:       Threshold,
  pub ticket_resolution_hours: Threshold,
  pub ontime_delivery:         Threshold,
}

impl Default for KpiThresholds {
  fn default() -> Self {
    Self {
      revenue_growth:          Threshold::new(5.0, 0.0, -5.0),
      profit_margin:           Threshold::new(20.0, 10.0, 5.0),
      employee_turnover:       Threshold::new(10.0, 15.0, 20.0),
      ticket_resolution_hours: Threshold::new(24.0, 48.0, 72.0),
      ontime_delivery:         Threshold::new(95.0, 90.0, 85.0),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_json_keeps_defaults() {
    let cfg: AnalyticsConfig = serde_json::from_str(
      r#"{"anomaly":{"z_score_threshold":2.5},
          "thresholds":{"ontime_delivery":{"good":97,"warning":92,"critical":88}}}"#,
    )
    .unwrap();

    assert_eq!(cfg.anomaly.z_score_threshold, 2.5);
    assert_eq!(cfg.anomaly.contamination, 0.1);
    assert_eq!(cfg.thresholds.ontime_delivery.critical, 88.0);
    assert_eq!(cfg.thresholds.revenue_growth, Threshold::new(5.0, 0.0, -5.0));
    assert_eq!(cfg.data.periods, 24);
  }

  #[test]
  fn detection_method_uses_wire_names() {
    let cfg: AnomalyConfig =
      serde_json::from_str(r#"{"method":"isolation_forest"}"#).unwrap();
    assert_eq!(cfg.method, DetectionMethod::IsolationForest);
  }
}
