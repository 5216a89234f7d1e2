//! Anomaly engine: scans metric columns and persists flagged points.
//!
//! Each [`MetricSpec`] is one unit. A unit that fails (missing table, store
//! error) is logged and reported as [`UnitOutcome::Failed`]; the remaining
//! metrics still run.

mod isolation;
mod zscore;

use std::{collections::BTreeMap, sync::Arc};

use chrono::{Days, NaiveDate, Utc};
use opsintel_core::{
  config::AnomalyConfig,
  frame::format_date,
  outcome::{UnitOutcome, UnitReport},
  record::{Anomaly, DetectionMethod, RunStamp, StoredAnomaly},
  store::{FetchQuery, MetricStore},
  table::{Column, FactTable},
};
use serde::Serialize;
use tracing::{info, warn};

pub use self::{
  isolation::{IsolationForest, OutlierModel, OutlierScore, standardize},
  zscore::{ZScores, flagged, z_scores},
};
use crate::{Error, MetricSpec, Result};

/// The metrics scanned by [`AnomalyEngine::detect_all_anomalies`].
pub const DEFAULT_METRICS: [MetricSpec; 8] = [
  MetricSpec::of(FactTable::Finance, Column::Revenue, "Revenue"),
  MetricSpec::of(FactTable::Finance, Column::Expenses, "Expenses"),
  MetricSpec::of(FactTable::Finance, Column::Profit, "Profit"),
  MetricSpec::of(FactTable::Finance, Column::ProfitMarginPct, "Profit Margin"),
  MetricSpec::of(FactTable::Operations, Column::AvgProcessingTimeHours, "Processing Time"),
  MetricSpec::of(FactTable::Operations, Column::OntimeDeliveryPct, "On-Time Delivery"),
  MetricSpec::of(FactTable::Hr, Column::TurnoverRatePct, "Turnover Rate"),
  MetricSpec::of(FactTable::Hr, Column::AbsenteeismRatePct, "Absenteeism Rate"),
];

// ─── Results ─────────────────────────────────────────────────────────────────

/// One metric's line in [`AnomalyRun::summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalySummary {
  pub metric:         String,
  pub count:          usize,
  pub latest_anomaly: NaiveDate,
  pub method:         DetectionMethod,
}

/// Result of a full scan.
#[derive(Debug, Clone, Default)]
pub struct AnomalyRun {
  /// Display name to flagged points in date order. Metrics with no
  /// anomalies are absent.
  pub anomalies: BTreeMap<String, Vec<Anomaly>>,
  pub outcomes:  Vec<UnitReport>,
}

impl AnomalyRun {
  pub fn total(&self) -> usize { self.anomalies.values().map(Vec::len).sum() }

  pub fn summary(&self) -> Vec<AnomalySummary> {
    self
      .anomalies
      .iter()
      .filter_map(|(metric, list)| {
        let latest = list.iter().map(|a| a.date).max()?;
        Some(AnomalySummary {
          metric:         metric.clone(),
          count:          list.len(),
          latest_anomaly: latest,
          method:         list.first()?.detection_method,
        })
      })
      .collect()
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct AnomalyEngine<S> {
  store:   Arc<S>,
  config:  AnomalyConfig,
  metrics: Vec<MetricSpec>,
}

impl<S: MetricStore> AnomalyEngine<S> {
  pub fn new(store: Arc<S>, config: AnomalyConfig) -> Self {
    Self { store, config, metrics: DEFAULT_METRICS.to_vec() }
  }

  /// Replace the scanned metric list.
  pub fn with_metrics(mut self, metrics: Vec<MetricSpec>) -> Self {
    self.metrics = metrics;
    self
  }

  /// Flagged points of one metric, in date order. An empty history yields
  /// an empty result.
  pub async fn detect_metric(
    &self,
    metric: &MetricSpec,
    method: DetectionMethod,
  ) -> Result<Vec<Anomaly>> {
    let query = FetchQuery::new(metric.table, &[Column::Date, metric.column])?
      .non_null(metric.column)?;
    let frame = self.store.fetch(&query).await.map_err(Error::store)?;
    let series = frame.series(Column::Date, metric.column);
    if series.is_empty() {
      return Ok(Vec::new());
    }

    let anomaly = |(date, value): (NaiveDate, f64), expected, score| Anomaly {
      date,
      metric_name: metric.display_name.to_owned(),
      table_name: metric.table,
      column: metric.column,
      metric_value: value,
      expected_value: expected,
      anomaly_score: score,
      detection_method: method,
    };

    let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
    let found: Vec<Anomaly> = match method {
      DetectionMethod::ZScore => {
        let scores = z_scores(&values);
        flagged(&scores, self.config.z_score_threshold)
          .into_iter()
          .map(|i| anomaly(series[i], Some(scores.mean), scores.scores[i]))
          .collect()
      }
      DetectionMethod::IsolationForest => {
        let matrix: Vec<Vec<Option<f64>>> = values.iter().map(|v| vec![Some(*v)]).collect();
        let forest = IsolationForest::new(
          self.config.n_estimators,
          self.config.contamination,
          self.config.seed,
        );
        forest
          .fit_predict(&standardize(&matrix))
          .into_iter()
          .zip(&series)
          .filter(|(s, _)| s.is_outlier)
          .map(|(s, point)| anomaly(*point, None, s.score))
          .collect()
      }
    };
    Ok(found)
  }

  /// Scan every configured metric with the configured method and persist
  /// what is flagged.
  pub async fn detect_all_anomalies(&self) -> AnomalyRun {
    self.detect_all_with(self.config.method).await
  }

  pub async fn detect_all_with(&self, method: DetectionMethod) -> AnomalyRun {
    let stamp = RunStamp::now();
    let mut run = AnomalyRun::default();

    for metric in &self.metrics {
      let outcome = match self.detect_metric(metric, method).await {
        Ok(found) => {
          info!(metric = metric.display_name, anomalies = found.len(), "scanned metric");
          for a in &found {
            if let Err(e) = self.store.record_anomaly(a, stamp).await {
              warn!(metric = metric.display_name, date = %a.date, error = %e, "could not save anomaly");
            }
          }
          let count = found.len();
          if count > 0 {
            run.anomalies.insert(metric.display_name.to_owned(), found);
          }
          UnitOutcome::Completed { count }
        }
        Err(e) => {
          warn!(metric = metric.display_name, error = %e, "anomaly scan failed");
          UnitOutcome::failed(e)
        }
      };
      run.outcomes.push(UnitReport::new(metric.display_name, outcome));
    }

    info!(total = run.total(), metrics = run.anomalies.len(), "anomaly detection complete");
    run
  }

  /// Stored anomalies from the last `days` days of wall-clock time.
  pub async fn recent_anomalies(&self, days: u64) -> Result<Vec<StoredAnomaly>> {
    let today = Utc::now().date_naive();
    let since = today.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
    self.store.recent_anomalies(since).await.map_err(Error::store)
  }
}

// ─── Narratives ──────────────────────────────────────────────────────────────

/// Short narratives for the three most recent anomalies of one metric.
pub fn generate_anomaly_insights(anomalies: &[Anomaly], display_name: &str) -> Vec<String> {
  let mut recent: Vec<&Anomaly> = anomalies.iter().collect();
  recent.sort_by(|a, b| b.date.cmp(&a.date));

  recent
    .into_iter()
    .take(3)
    .map(|a| {
      let date = format_date(a.date);
      let value = a.metric_value;
      match a.expected_value {
        Some(expected) => {
          let deviation =
            if expected != 0.0 { (value - expected) / expected * 100.0 } else { 0.0 };
          let direction = if value > expected { "higher" } else { "lower" };
          format!(
            "{display_name} on {date} was {:.1}% {direction} than expected ({value:.2} vs {expected:.2})",
            deviation.abs()
          )
        }
        None => format!("{display_name} showed unusual value on {date}: {value:.2}"),
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use opsintel_core::frame::Frame;

  use super::*;
  use crate::testing::{d, store};

  fn revenue_frame(values: &[f64]) -> Frame {
    let mut f = Frame::new(vec![Column::Date, Column::Revenue]);
    let mut date = d(2023, 1, 31);
    for v in values {
      f.push(vec![date.into(), (*v).into()]).unwrap();
      date = opsintel_core::frame::add_months(date, 1);
    }
    f
  }

  fn spiky() -> Vec<f64> {
    let mut v: Vec<f64> = (0..23).map(|i| 1000.0 + (i % 4) as f64 * 10.0).collect();
    v.insert(12, 5000.0);
    v
  }

  fn revenue() -> MetricSpec { DEFAULT_METRICS[0] }

  #[tokio::test]
  async fn zscore_flags_and_persists_spike() {
    let s = store().await;
    s.replace_table(FactTable::Finance, revenue_frame(&spiky())).await.unwrap();

    let engine = AnomalyEngine::new(s.clone(), AnomalyConfig::default())
      .with_metrics(vec![revenue()]);
    let run = engine.detect_all_anomalies().await;

    let found = &run.anomalies["Revenue"];
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].metric_value, 5000.0);
    assert_eq!(found[0].table_name, FactTable::Finance);
    assert!(found[0].expected_value.is_some());
    assert_eq!(run.outcomes[0].outcome, UnitOutcome::Completed { count: 1 });

    let stored = s.recent_anomalies(NaiveDate::MIN).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].detection_method, DetectionMethod::ZScore);
  }

  #[tokio::test]
  async fn rerun_does_not_duplicate() {
    let s = store().await;
    s.replace_table(FactTable::Finance, revenue_frame(&spiky())).await.unwrap();
    let engine = AnomalyEngine::new(s.clone(), AnomalyConfig::default())
      .with_metrics(vec![revenue()]);

    engine.detect_all_anomalies().await;
    engine.detect_all_anomalies().await;
    assert_eq!(s.recent_anomalies(NaiveDate::MIN).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn forest_method_has_no_expected_value() {
    let s = store().await;
    s.replace_table(FactTable::Finance, revenue_frame(&spiky())).await.unwrap();
    let engine = AnomalyEngine::new(s.clone(), AnomalyConfig::default());

    let found = engine
      .detect_metric(&revenue(), DetectionMethod::IsolationForest)
      .await
      .unwrap();
    assert!(!found.is_empty());
    assert!(found.iter().all(|a| a.expected_value.is_none()));
    assert!(found.iter().any(|a| a.metric_value == 5000.0));
  }

  #[tokio::test]
  async fn empty_history_is_empty_not_error() {
    let s = store().await;
    let engine = AnomalyEngine::new(s, AnomalyConfig::default());
    let found = engine.detect_metric(&revenue(), DetectionMethod::ZScore).await.unwrap();
    assert!(found.is_empty());
  }

  #[tokio::test]
  async fn failing_metric_does_not_stop_others() {
    let s = store().await;
    s.replace_table(FactTable::Finance, revenue_frame(&spiky())).await.unwrap();
    s.run_schema_script("DROP TABLE hr;".to_owned()).await.unwrap();

    let engine = AnomalyEngine::new(s, AnomalyConfig::default());
    let run = engine.detect_all_anomalies().await;

    assert_eq!(run.outcomes.len(), DEFAULT_METRICS.len());
    let failed: Vec<&str> = run
      .outcomes
      .iter()
      .filter(|r| r.outcome.is_failed())
      .map(|r| r.unit.as_str())
      .collect();
    assert_eq!(failed, vec!["Turnover Rate", "Absenteeism Rate"]);
    assert!(run.anomalies.contains_key("Revenue"));

    let summary = run.summary();
    assert_eq!(summary[0].metric, "Revenue");
    assert_eq!(summary[0].latest_anomaly, d(2024, 1, 31));
  }

  #[test]
  fn narratives_take_three_most_recent() {
    let make = |day: u32, expected: Option<f64>| Anomaly {
      date:             d(2024, 1, day),
      metric_name:      "Revenue".to_owned(),
      table_name:       FactTable::Finance,
      column:           Column::Revenue,
      metric_value:     150.0,
      expected_value:   expected,
      anomaly_score:    3.5,
      detection_method: DetectionMethod::ZScore,
    };
    let list = vec![
      make(1, Some(100.0)),
      make(2, Some(100.0)),
      make(3, None),
      make(4, Some(200.0)),
    ];

    let texts = generate_anomaly_insights(&list, "Revenue");
    assert_eq!(texts.len(), 3);
    assert_eq!(
      texts[0],
      "Revenue on 2024-01-04 was 25.0% lower than expected (150.00 vs 200.00)"
    );
    assert_eq!(texts[1], "Revenue showed unusual value on 2024-01-03: 150.00");
    assert!(texts[2].contains("50.0% higher"));
  }
}
