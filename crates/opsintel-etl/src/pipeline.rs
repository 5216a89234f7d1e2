//! The ETL orchestrator: schema, sources, loads, quality checks, summary.

use std::{
  collections::BTreeMap,
  fs::File,
  io::BufWriter,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use opsintel_core::{
  outcome::UnitOutcome,
  store::{MetricStore, TableStats},
  table::FactTable,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{DataGenerator, DataSource, Error, Result, clean};

/// File name of the pipeline summary artifact.
pub const SUMMARY_FILE: &str = "etl_summary.json";

// ─── Schema source ───────────────────────────────────────────────────────────

/// Where the DDL comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
  Inline(String),
  /// A missing or unreadable file aborts the run.
  File(PathBuf),
}

impl SchemaSource {
  pub fn load(&self) -> Result<String> {
    match self {
      Self::Inline(ddl) => Ok(ddl.clone()),
      Self::File(path) => {
        std::fs::read_to_string(path).map_err(|source| Error::SchemaUnavailable {
          path: path.clone(),
          source,
        })
      }
    }
  }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Post-load checks for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityCheck {
  /// The table holds at least one row.
  pub passed:   bool,
  pub stats:    Option<TableStats>,
  pub warnings: Vec<String>,
  pub error:    Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
  pub table:   FactTable,
  pub load:    UnitOutcome,
  pub quality: QualityCheck,
}

impl TableReport {
  /// Rows written by the load; 0 when it failed.
  pub fn rows_loaded(&self) -> usize { self.load.count() }
}

/// Contents of `etl_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlSummary {
  pub pipeline_run_date: DateTime<Utc>,
  /// Tables whose load completed.
  pub tables_loaded:     usize,
  pub total_rows:        usize,
  pub database_path:     String,
  pub tables:            BTreeMap<FactTable, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
  pub regenerated:   bool,
  pub tables:        Vec<TableReport>,
  pub checks_passed: usize,
  pub checks_failed: usize,
  pub summary:       EtlSummary,
  /// Where the summary landed, if it could be written.
  pub artifact:      Option<PathBuf>,
}

impl PipelineReport {
  pub fn table(&self, table: FactTable) -> Option<&TableReport> {
    self.tables.iter().find(|t| t.table == table)
  }
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct EtlPipeline<S, D, G> {
  store:         Arc<S>,
  source:        D,
  generator:     G,
  schema:        SchemaSource,
  artifact_dir:  PathBuf,
  database_path: String,
}

impl<S, D, G> EtlPipeline<S, D, G>
where
  S: MetricStore,
  D: DataSource,
  G: DataGenerator,
{
  pub fn new(
    store: Arc<S>,
    source: D,
    generator: G,
    schema: SchemaSource,
    artifact_dir: impl Into<PathBuf>,
    database_path: impl Into<String>,
  ) -> Self {
    Self {
      store,
      source,
      generator,
      schema,
      artifact_dir: artifact_dir.into(),
      database_path: database_path.into(),
    }
  }

  /// Run every stage. Only schema and generation failures return `Err`;
  /// table-level failures are reported in the result.
  pub async fn run_full_pipeline(&self, regenerate: bool) -> Result<PipelineReport> {
    info!("ETL pipeline starting");

    // 1. Schema.
    let ddl = self.schema.load().inspect_err(|e| error!(error = %e, "schema load failed"))?;
    self
      .store
      .run_schema_script(ddl)
      .await
      .map_err(|e| Error::SchemaScript(Box::new(e)))
      .inspect_err(|e| error!(error = %e, "schema initialisation failed"))?;
    info!("schema initialised");

    // 2. Sources.
    let missing = FactTable::ALL.iter().any(|t| !self.source.exists(*t));
    let regenerated = regenerate || missing;
    if regenerated {
      info!(requested = regenerate, "generating source data");
      self.generator.generate()?;
    } else {
      info!("source data found");
    }

    // 3. Loads.
    let mut loads = Vec::with_capacity(FactTable::ALL.len());
    for table in FactTable::ALL {
      let outcome = match self.load_table(table).await {
        Ok(rows) => {
          info!(table = %table, rows, "loaded");
          UnitOutcome::Completed { count: rows }
        }
        Err(e) => {
          warn!(table = %table, error = %e, "load failed");
          UnitOutcome::failed(e)
        }
      };
      loads.push((table, outcome));
    }

    // 4. Quality checks.
    let mut tables = Vec::with_capacity(loads.len());
    let (mut checks_passed, mut checks_failed) = (0, 0);
    for (table, load) in loads {
      let quality = self.check_quality(table).await;
      if quality.passed {
        checks_passed += 1;
      } else {
        checks_failed += 1;
      }
      tables.push(TableReport { table, load, quality });
    }
    info!(checks_passed, checks_failed, "quality checks finished");

    // 5. Summary.
    let summary = EtlSummary {
      pipeline_run_date: Utc::now(),
      tables_loaded:     tables.iter().filter(|t| !t.load.is_failed()).count(),
      total_rows:        tables.iter().map(TableReport::rows_loaded).sum(),
      database_path:     self.database_path.clone(),
      tables:            tables.iter().map(|t| (t.table, t.rows_loaded())).collect(),
    };
    let artifact = match write_summary(&self.artifact_dir, &summary) {
      Ok(path) => {
        info!(path = %path.display(), "summary written");
        Some(path)
      }
      Err(e) => {
        warn!(error = %e, "could not write summary");
        None
      }
    };

    info!(
      tables_loaded = summary.tables_loaded,
      total_rows = summary.total_rows,
      "ETL pipeline finished"
    );
    Ok(PipelineReport {
      regenerated,
      tables,
      checks_passed,
      checks_failed,
      summary,
      artifact,
    })
  }

  async fn load_table(&self, table: FactTable) -> Result<usize> {
    let frame = clean(table, self.source.read(table)?)?;
    self
      .store
      .replace_table(table, frame)
      .await
      .map_err(|e| Error::Store(Box::new(e)))
  }

  async fn check_quality(&self, table: FactTable) -> QualityCheck {
    match self.store.table_stats(table).await {
      Ok(stats) => {
        let mut warnings = Vec::new();
        if stats.row_count == 0 {
          warn!(table = %table, "no data found");
        }
        if stats.null_dates > 0 {
          warn!(table = %table, null_dates = stats.null_dates, "rows with null dates");
          warnings.push(format!("{} rows with null dates", stats.null_dates));
        }
        info!(
          table = %table,
          rows = stats.row_count,
          min_date = ?stats.min_date,
          max_date = ?stats.max_date,
          "quality check"
        );
        QualityCheck {
          passed: stats.row_count > 0,
          stats: Some(stats),
          warnings,
          error: None,
        }
      }
      Err(e) => {
        warn!(table = %table, error = %e, "quality check failed");
        QualityCheck {
          passed:   false,
          stats:    None,
          warnings: Vec::new(),
          error:    Some(e.to_string()),
        }
      }
    }
  }
}

fn write_summary(dir: &Path, summary: &EtlSummary) -> Result<PathBuf> {
  std::fs::create_dir_all(dir)?;
  let path = dir.join(SUMMARY_FILE);
  let writer = BufWriter::new(File::create(&path)?);
  serde_json::to_writer_pretty(writer, summary)?;
  Ok(path)
}

#[cfg(test)]
mod tests {
  use std::{
    fs,
    sync::atomic::{AtomicUsize, Ordering},
  };

  use opsintel_core::{
    config::DataWindow,
    store::FetchQuery,
    table::Column,
  };
  use opsintel_store_sqlite::{SqliteStore, default_schema};

  use super::*;
  use crate::{CsvDirSource, SyntheticGenerator};

  /// Counts calls and writes nothing.
  #[derive(Default)]
  struct CountingGenerator(AtomicUsize);

  impl DataGenerator for CountingGenerator {
    fn generate(&self) -> Result<Vec<(FactTable, usize)>> {
      self.0.fetch_add(1, Ordering::SeqCst);
      Ok(Vec::new())
    }
  }

  fn window() -> DataWindow {
    DataWindow {
      start_date: chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
      periods:    12,
    }
  }

  async fn generated_pipeline(
    dir: &Path,
  ) -> EtlPipeline<SqliteStore, CsvDirSource, SyntheticGenerator> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    EtlPipeline::new(
      store,
      CsvDirSource::new(dir.join("data")),
      SyntheticGenerator::new(dir.join("data"), window(), 42),
      SchemaSource::Inline(default_schema()),
      dir,
      ":memory:",
    )
  }

  #[tokio::test]
  async fn generates_loads_and_summarises() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = generated_pipeline(dir.path()).await;

    let report = pipeline.run_full_pipeline(false).await.unwrap();
    assert!(report.regenerated);
    assert_eq!(report.checks_passed, 5);
    assert_eq!(report.summary.tables_loaded, 5);
    assert_eq!(report.summary.tables[&FactTable::Sales], 48);
    assert_eq!(report.summary.total_rows, 12 + 48 + 12 + 12 + 48);

    let written: serde_json::Value =
      serde_json::from_str(&fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap())
        .unwrap();
    assert_eq!(written["tables_loaded"], 5);
    assert_eq!(written["database_path"], ":memory:");
    assert!(written["pipeline_run_date"].is_string());
  }

  #[tokio::test]
  async fn second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = generated_pipeline(dir.path()).await;

    pipeline.run_full_pipeline(false).await.unwrap();
    let q = FetchQuery::new(FactTable::Finance, &[Column::Date, Column::Revenue]).unwrap();
    let first = pipeline.store.fetch(&q).await.unwrap();

    let report = pipeline.run_full_pipeline(false).await.unwrap();
    assert!(!report.regenerated);
    let second = pipeline.store.fetch(&q).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(report.table(FactTable::Finance).unwrap().rows_loaded(), 12);
  }

  #[tokio::test]
  async fn one_bad_table_does_not_stop_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    SyntheticGenerator::new(&data, window(), 1).generate().unwrap();
    fs::write(data.join("hr.csv"), "date,employee_count\n2024-01-31,10\n").unwrap();

    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let generator = CountingGenerator::default();
    let pipeline = EtlPipeline::new(
      store,
      CsvDirSource::new(&data),
      generator,
      SchemaSource::Inline(default_schema()),
      dir.path(),
      "test.db",
    );

    let report = pipeline.run_full_pipeline(false).await.unwrap();
    assert_eq!(pipeline.generator.0.load(Ordering::SeqCst), 0);

    let hr = report.table(FactTable::Hr).unwrap();
    assert!(hr.load.is_failed());
    assert_eq!(hr.rows_loaded(), 0);
    assert!(!hr.quality.passed);
    assert_eq!(report.summary.tables_loaded, 4);
    assert_eq!(report.summary.tables[&FactTable::Hr], 0);
    assert_eq!(report.table(FactTable::Operations).unwrap().rows_loaded(), 12);
  }

  #[tokio::test]
  async fn missing_schema_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let pipeline = EtlPipeline::new(
      store,
      CsvDirSource::new(dir.path()),
      CountingGenerator::default(),
      SchemaSource::File(dir.path().join("schema.sql")),
      dir.path(),
      "test.db",
    );

    let err = pipeline.run_full_pipeline(true).await.unwrap_err();
    assert!(matches!(err, Error::SchemaUnavailable { .. }));
    assert!(err.is_fatal());
    assert_eq!(pipeline.generator.0.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join(SUMMARY_FILE).exists());
  }

  #[tokio::test]
  async fn malformed_schema_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let pipeline = EtlPipeline::new(
      store,
      CsvDirSource::new(dir.path()),
      CountingGenerator::default(),
      SchemaSource::Inline("CREATE TABLE (".to_owned()),
      dir.path(),
      "test.db",
    );

    let err = pipeline.run_full_pipeline(false).await.unwrap_err();
    assert!(matches!(err, Error::SchemaScript(_)));
  }
}
