//! Composition root for the `opsintel` binary.
//!
//! [`AppConfig`] is the layered runtime configuration. [`PipelineRunner`]
//! wires the ETL orchestrator and the three analytics engines over one
//! shared store, and is what the API's refresh trigger runs.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use opsintel_analytics::{
  AnomalyEngine, AnomalyRun, ForecastAdapter, ForecastRun, InsightEngine, InsightRun,
};
use opsintel_core::{
  config::AnalyticsConfig,
  record::DetectionMethod,
  refresh::{RefreshRequest, RefreshRunner, RefreshState},
  store::MetricStore,
};
use opsintel_etl::{CsvDirSource, EtlPipeline, PipelineReport, SchemaSource, SyntheticGenerator};
use serde::{Deserialize, Serialize};
use tracing::info;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Environment prefix, e.g. `OPSINTEL_PORT` or
/// `OPSINTEL_ANALYTICS__ANOMALY__METHOD`.
pub const ENV_PREFIX: &str = "OPSINTEL";

/// Runtime configuration, deserialised from `opsintel.toml` and the
/// environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub host:          String,
  pub port:          u16,
  pub database_path: PathBuf,
  pub data_dir:      PathBuf,
  pub artifact_dir:  PathBuf,
  /// DDL file to run instead of the built-in schema.
  pub schema_path:   Option<PathBuf>,
  pub analytics:     AnalyticsConfig,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      host:          "0.0.0.0".to_owned(),
      port:          8000,
      database_path: PathBuf::from("database/opsintel.db"),
      data_dir:      PathBuf::from("data"),
      artifact_dir:  PathBuf::from("."),
      schema_path:   None,
      analytics:     AnalyticsConfig::default(),
    }
  }
}

impl AppConfig {
  /// Layer `path` (optional) under `OPSINTEL_*` environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  fn schema(&self) -> SchemaSource {
    match &self.schema_path {
      Some(path) => SchemaSource::File(path.clone()),
      None => SchemaSource::Inline(opsintel_store_sqlite::default_schema()),
    }
  }
}

// ─── Runner ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
  #[error(transparent)]
  Etl(#[from] opsintel_etl::Error),
}

/// ETL followed by the analytics stages a [`RefreshRequest`] selects.
pub struct PipelineRunner<S> {
  store:  Arc<S>,
  config: AppConfig,
}

impl<S: MetricStore> PipelineRunner<S> {
  pub fn new(store: Arc<S>, config: AppConfig) -> Self { Self { store, config } }

  pub fn config(&self) -> &AppConfig { &self.config }

  pub async fn run_etl(&self, regenerate: bool) -> Result<PipelineReport, RunnerError> {
    let pipeline = EtlPipeline::new(
      self.store.clone(),
      CsvDirSource::new(&self.config.data_dir),
      SyntheticGenerator::new(
        &self.config.data_dir,
        self.config.analytics.data.clone(),
        self.config.analytics.anomaly.seed,
      ),
      self.config.schema(),
      &self.config.artifact_dir,
      self.config.database_path.display().to_string(),
    );
    Ok(pipeline.run_full_pipeline(regenerate).await?)
  }

  pub async fn run_forecasts(&self) -> ForecastRun {
    ForecastAdapter::new(self.store.clone(), &self.config.analytics.forecast)
      .forecast_all_key_metrics()
      .await
  }

  /// Scan with `method`, or the configured one when `None`.
  pub async fn run_detection(&self, method: Option<DetectionMethod>) -> AnomalyRun {
    let method = method.unwrap_or(self.config.analytics.anomaly.method);
    AnomalyEngine::new(self.store.clone(), self.config.analytics.anomaly.clone())
      .detect_all_with(method)
      .await
  }

  pub async fn run_insights(&self) -> InsightRun {
    InsightEngine::new(self.store.clone(), self.config.analytics.thresholds.clone())
      .with_artifact_dir(&self.config.artifact_dir)
      .generate_all_insights()
      .await
  }
}

impl<S: MetricStore> RefreshRunner for PipelineRunner<S> {
  type Error = RunnerError;

  async fn run(&self, request: RefreshRequest, state: &RefreshState) -> Result<String, RunnerError> {
    state.set_message("Running ETL pipeline...");
    let report = self.run_etl(request.regenerate_data).await?;
    info!(
      tables_loaded = report.summary.tables_loaded,
      total_rows = report.summary.total_rows,
      "refresh: ETL done"
    );

    if request.run_forecasting {
      state.set_message("Generating forecasts...");
      let run = self.run_forecasts().await;
      info!(forecasts = run.forecasts.len(), "refresh: forecasts done");
    }

    if request.run_anomaly_detection {
      state.set_message("Detecting anomalies...");
      let run = self.run_detection(None).await;
      info!(anomalies = run.total(), "refresh: anomaly detection done");
    }

    if request.run_insights {
      state.set_message("Generating insights...");
      let run = self.run_insights().await;
      info!(insights = run.insights.len(), "refresh: insights done");
    }

    Ok("Data refresh completed successfully".to_owned())
  }
}

#[cfg(test)]
mod tests;
