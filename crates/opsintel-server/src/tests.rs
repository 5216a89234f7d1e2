//! End-to-end runs of the pipeline over a temp directory and an in-memory
//! store.

use std::{fs, sync::Arc};

use opsintel_core::{
  config::{DataWindow, Threshold},
  record::DetectionMethod,
  refresh::{RefreshRequest, RefreshRunner, RefreshState},
  store::MetricStore,
};
use opsintel_store_sqlite::SqliteStore;
use tempfile::TempDir;

use crate::{AppConfig, PipelineRunner, RunnerError};

fn config_in(dir: &TempDir) -> AppConfig {
  let mut config = AppConfig {
    data_dir: dir.path().join("data"),
    artifact_dir: dir.path().to_path_buf(),
    ..AppConfig::default()
  };
  config.analytics.data = DataWindow { periods: 24, ..DataWindow::default() };
  config
}

async fn runner(config: AppConfig) -> (Arc<SqliteStore>, PipelineRunner<SqliteStore>) {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  (store.clone(), PipelineRunner::new(store, config))
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[test]
fn missing_config_file_yields_defaults() {
  let dir = tempfile::tempdir().unwrap();
  let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
  assert_eq!(config, AppConfig::default());
  assert_eq!(config.address(), "0.0.0.0:8000");
}

#[test]
fn partial_file_overrides_only_named_keys() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("opsintel.toml");
  fs::write(
    &path,
    r#"
port = 9100
database_path = "/var/lib/opsintel/metrics.db"

[analytics.anomaly]
method = "isolation_forest"
contamination = 0.05

[analytics.thresholds.revenue_growth]
good = 8.0
warning = 2.0
critical = -3.0
"#,
  )
  .unwrap();

  let config = AppConfig::load(&path).unwrap();
  assert_eq!(config.port, 9100);
  assert_eq!(config.host, "0.0.0.0");
  assert_eq!(config.database_path.to_str(), Some("/var/lib/opsintel/metrics.db"));
  assert_eq!(config.analytics.anomaly.method, DetectionMethod::IsolationForest);
  assert_eq!(config.analytics.anomaly.contamination, 0.05);
  assert_eq!(config.analytics.anomaly.z_score_threshold, 3.0);
  assert_eq!(config.analytics.thresholds.revenue_growth, Threshold::new(8.0, 2.0, -3.0));
  assert_eq!(config.analytics.thresholds.profit_margin, Threshold::new(20.0, 10.0, 5.0));
  assert_eq!(config.analytics.forecast.periods, 6);
}

// ─── Refresh ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_refresh_populates_every_derived_table() {
  let dir = tempfile::tempdir().unwrap();
  let (store, runner) = runner(config_in(&dir)).await;
  let state = RefreshState::new();

  let message = runner
    .run(RefreshRequest { regenerate_data: true, ..RefreshRequest::default() }, &state)
    .await
    .unwrap();
  assert_eq!(message, "Data refresh completed successfully");
  assert_eq!(state.snapshot().message, "Generating insights...");

  assert!(dir.path().join("data/finance.csv").is_file());
  assert!(dir.path().join("etl_summary.json").is_file());
  assert!(dir.path().join("insights.json").is_file());

  let forecasts = store.forecasts("Revenue").await.unwrap();
  assert_eq!(forecasts.len(), 6);
  assert!(!store.latest_insights(50).await.unwrap().is_empty());
}

#[tokio::test]
async fn refresh_skips_unrequested_stages() {
  let dir = tempfile::tempdir().unwrap();
  let (store, runner) = runner(config_in(&dir)).await;
  let state = RefreshState::new();

  let request = RefreshRequest {
    regenerate_data:       false,
    run_forecasting:       false,
    run_anomaly_detection: false,
    run_insights:          false,
  };
  runner.run(request, &state).await.unwrap();

  // Sources were absent, so ETL generated them anyway.
  assert!(dir.path().join("data/hr.csv").is_file());
  assert_eq!(state.snapshot().message, "Running ETL pipeline...");
  assert!(store.forecasts("Revenue").await.unwrap().is_empty());
  assert!(store.latest_insights(10).await.unwrap().is_empty());
  assert!(!dir.path().join("insights.json").exists());
}

#[tokio::test]
async fn missing_schema_file_fails_the_refresh() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = config_in(&dir);
  config.schema_path = Some(dir.path().join("missing.sql"));
  let (_, runner) = runner(config).await;

  let err = runner
    .run(RefreshRequest::default(), &RefreshState::new())
    .await
    .unwrap_err();
  let RunnerError::Etl(inner) = err;
  assert!(inner.is_fatal());
}

#[tokio::test]
async fn detection_method_override_is_recorded() {
  let dir = tempfile::tempdir().unwrap();
  let (_, runner) = runner(config_in(&dir)).await;
  runner.run_etl(true).await.unwrap();

  let run = runner.run_detection(Some(DetectionMethod::IsolationForest)).await;
  assert!(run.outcomes.iter().all(|o| !o.outcome.is_failed()));
  assert!(
    run
      .anomalies
      .values()
      .flatten()
      .all(|a| a.detection_method == DetectionMethod::IsolationForest)
  );
}
