//! `opsintel` binary.
//!
//! Reads `opsintel.toml` (or the path given with `--config`) layered under
//! `OPSINTEL_*` environment variables, opens the SQLite store, and either
//! serves the JSON API or runs one pipeline stage and prints its report.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use opsintel_api::AppState;
use opsintel_core::{
  outcome::UnitReport,
  record::DetectionMethod,
  refresh::{RefreshRequest, RefreshRunner, RefreshState},
};
use opsintel_server::{AppConfig, PipelineRunner};
use opsintel_store_sqlite::SqliteStore;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "OpsIntel analytics pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "opsintel.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API.
  Serve,
  /// Load the raw sources into the fact tables.
  Etl {
    /// Regenerate the synthetic sources first.
    #[arg(long)]
    regenerate: bool,
  },
  /// Forecast the key metrics.
  Forecast,
  /// Scan the monitored metrics for anomalies.
  Detect {
    /// `z-score` or `isolation_forest`; defaults to the configured method.
    #[arg(long)]
    method: Option<DetectionMethod>,
  },
  /// Evaluate the insight rules.
  Insights,
  /// ETL followed by every analytics stage.
  Refresh {
    #[arg(long)]
    regenerate: bool,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let config = AppConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

  if let Some(parent) = config.database_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&config.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.database_path))?;
  let store = Arc::new(store);
  let runner = PipelineRunner::new(store.clone(), config.clone());

  match cli.command {
    Command::Serve => serve(store, runner).await,
    Command::Etl { regenerate } => {
      let report = runner.run_etl(regenerate).await.context("ETL failed")?;
      print_json(&report)
    }
    Command::Forecast => {
      let run = runner.run_forecasts().await;
      for forecast in run.forecasts.values() {
        tracing::info!(
          metric = %forecast.metric,
          mae = forecast.accuracy.mae,
          rmse = forecast.accuracy.rmse,
          mape = forecast.accuracy.mape,
          "forecast accuracy"
        );
      }
      print_json(&run.outcomes)
    }
    Command::Detect { method } => {
      let run = runner.run_detection(method).await;
      print_json(&Report { outcomes: &run.outcomes, detail: run.summary() })
    }
    Command::Insights => {
      let run = runner.run_insights().await;
      print_json(&Report { outcomes: &run.outcomes, detail: &run.insights })
    }
    Command::Refresh { regenerate } => {
      let state = RefreshState::new();
      let request = RefreshRequest { regenerate_data: regenerate, ..RefreshRequest::default() };
      let message = runner.run(request, &state).await.context("refresh failed")?;
      println!("{message}");
      Ok(())
    }
  }
}

async fn serve(store: Arc<SqliteStore>, runner: PipelineRunner<SqliteStore>) -> anyhow::Result<()> {
  let address = runner.config().address();
  let state = AppState::new(store, Arc::new(runner));
  let app = opsintel_api::router(state).layer(TraceLayer::new_for_http());

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

#[derive(Serialize)]
struct Report<'a, T> {
  outcomes: &'a [UnitReport],
  detail:   T,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
