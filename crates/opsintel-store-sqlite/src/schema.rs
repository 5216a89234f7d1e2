//! SQL schema for the OpsIntel SQLite store.
//!
//! Fact tables are declared here for a fresh database but are dropped and
//! recreated by every load. Derived tables persist across runs; their UNIQUE
//! natural keys turn re-runs into upserts.

use opsintel_core::table::{ColumnKind, FactTable};

/// DDL for the derived tables; idempotent thanks to `IF NOT EXISTS`.
const DERIVED: &str = "
-- Written only by the anomaly engine.
CREATE TABLE IF NOT EXISTS anomalies (
    anomaly_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    date             TEXT NOT NULL,
    metric_name      TEXT NOT NULL,   -- display name, e.g. 'Revenue'
    metric_value     REAL NOT NULL,
    expected_value   REAL,
    anomaly_score    REAL NOT NULL,
    detection_method TEXT NOT NULL,   -- 'z-score' | 'isolation_forest'
    table_name       TEXT NOT NULL,
    run_id           TEXT NOT NULL,
    created_at       TEXT NOT NULL,   -- RFC 3339 UTC
    UNIQUE (date, metric_name, detection_method)
);

-- Written only by the insight engine.
CREATE TABLE IF NOT EXISTS insights (
    insight_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    date         TEXT NOT NULL,
    category     TEXT NOT NULL,       -- finance | sales | operations | hr | it
    rule         TEXT NOT NULL,
    insight_text TEXT NOT NULL,
    severity     TEXT NOT NULL,
    metric_value REAL,
    run_id       TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    UNIQUE (date, category, rule),
    CHECK  (severity IN ('info', 'warning', 'critical'))
);

-- Written only by the forecast adapter; future-dated rows only.
CREATE TABLE IF NOT EXISTS forecasts (
    forecast_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    date           TEXT NOT NULL,
    forecast_value REAL NOT NULL,
    lower_bound    REAL NOT NULL,
    upper_bound    REAL NOT NULL,
    metric_name    TEXT NOT NULL,
    model_used     TEXT NOT NULL,
    run_id         TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    UNIQUE (date, metric_name, model_used)
);

CREATE INDEX IF NOT EXISTS anomalies_date_idx  ON anomalies(date);
CREATE INDEX IF NOT EXISTS insights_created_idx ON insights(created_at);
CREATE INDEX IF NOT EXISTS forecasts_metric_idx ON forecasts(metric_name);

PRAGMA user_version = 1;
";

fn sql_type(kind: ColumnKind) -> &'static str {
  match kind {
    ColumnKind::Date | ColumnKind::Categorical => "TEXT",
    ColumnKind::Numeric => "NUMERIC",
  }
}

/// `CREATE TABLE` for one fact table, built from its closed column list.
pub fn create_fact_table(table: FactTable, if_not_exists: bool) -> String {
  let cols = table
    .schema()
    .iter()
    .map(|(c, k)| format!("    {} {}", c.as_str(), sql_type(*k)))
    .collect::<Vec<_>>()
    .join(",\n");
  let guard = if if_not_exists { "IF NOT EXISTS " } else { "" };
  format!("CREATE TABLE {guard}{} (\n{cols}\n);\n", table.as_str())
}

/// The complete stock schema: pragmas, the five fact tables and the derived
/// tables.
pub fn default_schema() -> String {
  let mut ddl = String::from("PRAGMA journal_mode = WAL;\n");
  for table in FactTable::ALL {
    ddl.push_str(&create_fact_table(table, true));
  }
  ddl.push_str(DERIVED);
  ddl
}
