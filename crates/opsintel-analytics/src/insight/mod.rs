//! Insight engine: per-domain threshold analysis over recent metric windows.
//!
//! Five analyzers (finance, sales, operations, HR, IT) run independently. A
//! failing analyzer is reported as a failed unit and the others carry on.
//! Every insight is upserted into the store and echoed to `insights.json`;
//! an insight whose write fails is still returned.

pub mod rules;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Months, NaiveDate, Utc};
use opsintel_core::{
  config::KpiThresholds,
  frame::Frame,
  outcome::{UnitOutcome, UnitReport},
  record::{Category, Insight, RunStamp, Severity},
  store::{FetchQuery, MetricStore},
  table::{Column, FactTable},
};
use serde::Serialize;
use tracing::{info, warn};

use self::rules::{Finding, RuleResult, Skip};
use crate::{Error, Result};

/// File name of the export artifact.
pub const INSIGHTS_FILE: &str = "insights.json";

/// Rows read by the finance, operations and HR analyzers.
const RECENT_ROWS: usize = 6;
/// Months of history the sales and IT analyzers look at.
const TRAILING_MONTHS: u32 = 3;

// ─── Results ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InsightRun {
  /// In domain order: finance, sales, operations, hr, it.
  pub insights: Vec<Insight>,
  /// One report per domain, plus one per skipped rule.
  pub outcomes: Vec<UnitReport>,
  /// Where the export landed, if it was written.
  pub artifact: Option<PathBuf>,
}

impl InsightRun {
  pub fn insights_by_severity(&self, severity: Severity) -> Vec<&Insight> {
    self.insights.iter().filter(|i| i.severity == severity).collect()
  }

  pub fn insights_by_category(&self, category: Category) -> Vec<&Insight> {
    self.insights.iter().filter(|i| i.category == category).collect()
  }
}

#[derive(Serialize)]
struct ExportedInsight<'a> {
  date:         NaiveDate,
  category:     Category,
  insight_text: &'a str,
  severity:     Severity,
  metric_value: Option<f64>,
}

#[derive(Serialize)]
struct InsightExport<'a> {
  generated_at:   DateTime<Utc>,
  total_insights: usize,
  insights:       Vec<ExportedInsight<'a>>,
}

/// What one analyzer produced.
#[derive(Debug, Default)]
struct Analysis {
  insights: Vec<Insight>,
  skipped:  Vec<Skip>,
}

impl Analysis {
  fn push(&mut self, date: NaiveDate, category: Category, finding: Finding) {
    self.insights.push(Insight {
      date,
      category,
      rule: finding.rule,
      insight_text: finding.text,
      severity: finding.severity,
      metric_value: Some(finding.value),
    });
  }

  fn apply(&mut self, date: NaiveDate, category: Category, result: RuleResult) {
    match result {
      Ok(Some(finding)) => self.push(date, category, finding),
      Ok(None) => {}
      Err(skip) => self.skipped.push(skip),
    }
  }
}

// ─── Frame helpers ───────────────────────────────────────────────────────────

fn value_at(frame: &Frame, table: FactTable, row: usize, column: Column) -> Result<f64> {
  frame.f64_at(row, column).ok_or(Error::MissingValue { table, column, row })
}

fn date_at(frame: &Frame, table: FactTable, row: usize) -> Result<NaiveDate> {
  frame
    .date_at(row, Column::Date)
    .ok_or(Error::MissingValue { table, column: Column::Date, row })
}

fn column_values(frame: &Frame, table: FactTable, column: Column) -> Result<Vec<f64>> {
  (0..frame.len()).map(|row| value_at(frame, table, row, column)).collect()
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct InsightEngine<S> {
  store:        Arc<S>,
  thresholds:   KpiThresholds,
  artifact_dir: Option<PathBuf>,
}

impl<S: MetricStore> InsightEngine<S> {
  pub fn new(store: Arc<S>, thresholds: KpiThresholds) -> Self {
    Self { store, thresholds, artifact_dir: None }
  }

  /// Write `insights.json` into `dir` after each run.
  pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.artifact_dir = Some(dir.into());
    self
  }

  /// The `RECENT_ROWS` newest rows in chronological order.
  async fn recent(&self, table: FactTable, columns: &[Column]) -> Result<Frame> {
    let query = FetchQuery::new(table, columns)?
      .non_null(Column::Date)?
      .latest(RECENT_ROWS);
    let mut frame = self.store.fetch(&query).await.map_err(Error::store)?;
    frame.reverse();
    Ok(frame)
  }

  /// Rows from the `TRAILING_MONTHS` months before the table's latest date,
  /// with that date. `None` when the table is empty.
  async fn trailing(
    &self,
    table: FactTable,
    columns: &[Column],
  ) -> Result<Option<(NaiveDate, Frame)>> {
    let newest = FetchQuery::new(table, &[Column::Date])?
      .non_null(Column::Date)?
      .latest(1);
    let head = self.store.fetch(&newest).await.map_err(Error::store)?;
    let Some(latest) = head.date_at(0, Column::Date) else {
      return Ok(None);
    };

    let since = latest
      .checked_sub_months(Months::new(TRAILING_MONTHS))
      .unwrap_or(NaiveDate::MIN);
    let query = FetchQuery::new(table, columns)?
      .non_null(Column::Date)?
      .since(since);
    let frame = self.store.fetch(&query).await.map_err(Error::store)?;
    Ok(Some((latest, frame)))
  }

  // ── Analyzers ─────────────────────────────────────────────────────────

  async fn analyze_finance(&self) -> Result<Analysis> {
    let table = FactTable::Finance;
    let frame = self
      .recent(table, &[Column::Date, Column::Revenue, Column::ProfitMarginPct])
      .await?;
    let mut out = Analysis::default();
    if frame.len() < 2 {
      return Ok(out);
    }

    let last = frame.len() - 1;
    let date = date_at(&frame, table, last)?;
    let previous = value_at(&frame, table, last - 1, Column::Revenue)?;
    let latest = value_at(&frame, table, last, Column::Revenue)?;
    let margin = value_at(&frame, table, last, Column::ProfitMarginPct)?;

    let t = &self.thresholds;
    out.apply(date, Category::Finance, rules::revenue_growth(previous, latest, &t.revenue_growth));
    out.apply(date, Category::Finance, Ok(rules::profit_margin(margin, &t.profit_margin)));
    Ok(out)
  }

  async fn analyze_sales(&self) -> Result<Analysis> {
    let table = FactTable::Sales;
    let mut out = Analysis::default();
    let Some((latest, frame)) = self
      .trailing(table, &[Column::Date, Column::Region, Column::UnitsSold])
      .await?
    else {
      return Ok(out);
    };

    // Units per region in the latest month, regions in first-seen order.
    let mut by_region: Vec<(String, f64)> = Vec::new();
    for row in 0..frame.len() {
      if frame.date_at(row, Column::Date) != Some(latest) {
        continue;
      }
      let region = frame.str_at(row, Column::Region).ok_or(Error::MissingValue {
        table,
        column: Column::Region,
        row,
      })?;
      let units = value_at(&frame, table, row, Column::UnitsSold)?;
      match by_region.iter_mut().find(|(r, _)| r == region) {
        Some((_, total)) => *total += units,
        None => by_region.push((region.to_owned(), units)),
      }
    }

    for finding in rules::regional_sales(&by_region) {
      out.push(latest, Category::Sales, finding);
    }
    Ok(out)
  }

  async fn analyze_operations(&self) -> Result<Analysis> {
    let table = FactTable::Operations;
    let frame = self
      .recent(table, &[
        Column::Date,
        Column::OntimeDeliveryPct,
        Column::AvgProcessingTimeHours,
      ])
      .await?;
    let mut out = Analysis::default();
    if frame.is_empty() {
      return Ok(out);
    }

    let last = frame.len() - 1;
    let date = date_at(&frame, table, last)?;
    let ontime = value_at(&frame, table, last, Column::OntimeDeliveryPct)?;
    let hours = column_values(&frame, table, Column::AvgProcessingTimeHours)?;

    out.apply(
      date,
      Category::Operations,
      Ok(rules::ontime_delivery(ontime, &self.thresholds.ontime_delivery)),
    );
    out.apply(date, Category::Operations, rules::processing_time_trend(&hours));
    Ok(out)
  }

  async fn analyze_hr(&self) -> Result<Analysis> {
    let table = FactTable::Hr;
    let frame = self
      .recent(table, &[Column::Date, Column::EmployeeCount, Column::TurnoverRatePct])
      .await?;
    let mut out = Analysis::default();
    if frame.is_empty() {
      return Ok(out);
    }

    let last = frame.len() - 1;
    let date = date_at(&frame, table, last)?;
    let turnover = value_at(&frame, table, last, Column::TurnoverRatePct)?;
    let counts = column_values(&frame, table, Column::EmployeeCount)?;

    out.apply(
      date,
      Category::Hr,
      Ok(rules::turnover(turnover, &self.thresholds.employee_turnover)),
    );
    out.apply(date, Category::Hr, Ok(rules::headcount_growth(&counts)));
    Ok(out)
  }

  async fn analyze_it(&self) -> Result<Analysis> {
    let table = FactTable::ItTickets;
    let mut out = Analysis::default();
    let Some((latest, frame)) = self
      .trailing(table, &[
        Column::Date,
        Column::Priority,
        Column::TicketsOpened,
        Column::TicketsClosed,
        Column::AvgResolutionTimeHours,
      ])
      .await?
    else {
      return Ok(out);
    };

    // Critical tickets: mean resolution on the newest date that has any.
    let critical: Vec<usize> = (0..frame.len())
      .filter(|row| frame.str_at(*row, Column::Priority) == Some("Critical"))
      .collect();
    let newest_critical = critical
      .iter()
      .filter_map(|row| frame.date_at(*row, Column::Date))
      .max();
    if let Some(date) = newest_critical {
      let mut hours = Vec::new();
      for row in critical {
        if frame.date_at(row, Column::Date) == Some(date) {
          hours.push(value_at(&frame, table, row, Column::AvgResolutionTimeHours)?);
        }
      }
      let mean = hours.iter().sum::<f64>() / hours.len() as f64;
      out.apply(
        date,
        Category::It,
        Ok(rules::critical_resolution(mean, &self.thresholds.ticket_resolution_hours)),
      );
    }

    let (mut opened, mut closed) = (0.0, 0.0);
    for row in 0..frame.len() {
      if frame.date_at(row, Column::Date) == Some(latest) {
        opened += value_at(&frame, table, row, Column::TicketsOpened)?;
        closed += value_at(&frame, table, row, Column::TicketsClosed)?;
      }
    }
    out.apply(latest, Category::It, Ok(rules::ticket_backlog(opened, closed)));
    Ok(out)
  }

  // ── Orchestration ─────────────────────────────────────────────────────

  /// Run all five analyzers, persist and export what they produce.
  pub async fn generate_all_insights(&self) -> InsightRun {
    let mut run = InsightRun::default();

    for category in [
      Category::Finance,
      Category::Sales,
      Category::Operations,
      Category::Hr,
      Category::It,
    ] {
      let result = match category {
        Category::Finance => self.analyze_finance().await,
        Category::Sales => self.analyze_sales().await,
        Category::Operations => self.analyze_operations().await,
        Category::Hr => self.analyze_hr().await,
        Category::It => self.analyze_it().await,
      };

      let outcome = match result {
        Ok(analysis) => {
          info!(category = %category, insights = analysis.insights.len(), "analyzed domain");
          for skip in analysis.skipped {
            run.outcomes.push(UnitReport::new(
              format!("{category}.{}", skip.rule),
              UnitOutcome::skipped(skip.reason),
            ));
          }
          let count = analysis.insights.len();
          run.insights.extend(analysis.insights);
          UnitOutcome::Completed { count }
        }
        Err(e) => {
          warn!(category = %category, error = %e, "insight analysis failed");
          UnitOutcome::failed(e)
        }
      };
      run.outcomes.push(UnitReport::new(category.as_str(), outcome));
    }

    let stamp = RunStamp::now();
    for insight in &run.insights {
      if let Err(e) = self.store.record_insight(insight, stamp).await {
        warn!(category = %insight.category, rule = %insight.rule, error = %e, "could not save insight");
      }
    }

    if let Some(dir) = &self.artifact_dir {
      match export(dir, &run.insights) {
        Ok(path) => run.artifact = Some(path),
        Err(e) => warn!(error = %e, "could not write insight export"),
      }
    }

    info!(total = run.insights.len(), "insight generation complete");
    run
  }
}

fn export(dir: &Path, insights: &[Insight]) -> Result<PathBuf> {
  let doc = InsightExport {
    generated_at:   Utc::now(),
    total_insights: insights.len(),
    insights:       insights
      .iter()
      .map(|i| ExportedInsight {
        date:         i.date,
        category:     i.category,
        insight_text: &i.insight_text,
        severity:     i.severity,
        metric_value: i.metric_value,
      })
      .collect(),
  };
  std::fs::create_dir_all(dir)?;
  let path = dir.join(INSIGHTS_FILE);
  let file = std::fs::File::create(&path)?;
  serde_json::to_writer_pretty(file, &doc)?;
  Ok(path)
}

#[cfg(test)]
mod tests {
  use opsintel_core::frame::{Value, add_months};

  use super::*;
  use crate::testing::{d, store};

  fn monthly(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n as u32).map(|i| add_months(start, i)).collect()
  }

  fn finance(revenues: &[f64], margin: f64) -> Frame {
    let mut f = Frame::new(vec![Column::Date, Column::Revenue, Column::ProfitMarginPct]);
    for (date, rev) in monthly(d(2024, 1, 31), revenues.len()).into_iter().zip(revenues) {
      f.push(vec![date.into(), (*rev).into(), margin.into()]).unwrap();
    }
    f
  }

  fn it_tickets(date: NaiveDate, rows: &[(&str, i64, i64, f64)]) -> Frame {
    let mut f = Frame::new(vec![
      Column::Date,
      Column::Priority,
      Column::TicketsOpened,
      Column::TicketsClosed,
      Column::AvgResolutionTimeHours,
    ]);
    for (priority, opened, closed, hours) in rows {
      f.push(vec![
        date.into(),
        (*priority).into(),
        Value::Integer(*opened),
        Value::Integer(*closed),
        (*hours).into(),
      ])
      .unwrap();
    }
    f
  }

  async fn seed_all(s: &opsintel_store_sqlite::SqliteStore) {
    s.replace_table(FactTable::Finance, finance(&[100.0, 106.0], 15.0)).await.unwrap();

    let mut sales = Frame::new(vec![Column::Date, Column::Region, Column::UnitsSold]);
    for (date, region, units) in [
      (d(2023, 12, 31), "North", 5000),
      (d(2024, 2, 29), "North", 1000),
      (d(2024, 2, 29), "South", 600),
      (d(2024, 2, 29), "North", 200),
    ] {
      sales
        .push(vec![date.into(), region.into(), Value::Integer(units)])
        .unwrap();
    }
    s.replace_table(FactTable::Sales, sales).await.unwrap();

    let mut ops = Frame::new(vec![
      Column::Date,
      Column::OntimeDeliveryPct,
      Column::AvgProcessingTimeHours,
    ]);
    let hours = [50.0, 50.0, 50.0, 40.0, 40.0, 40.0];
    for (date, hours) in monthly(d(2023, 9, 30), 6).into_iter().zip(hours) {
      ops.push(vec![date.into(), 96.0.into(), hours.into()]).unwrap();
    }
    s.replace_table(FactTable::Operations, ops).await.unwrap();

    let mut hr = Frame::new(vec![Column::Date, Column::EmployeeCount, Column::TurnoverRatePct]);
    for (date, count) in monthly(d(2023, 9, 30), 3).into_iter().zip([250, 255, 262]) {
      hr.push(vec![date.into(), Value::Integer(count), 12.0.into()]).unwrap();
    }
    s.replace_table(FactTable::Hr, hr).await.unwrap();

    let it = it_tickets(d(2024, 2, 29), &[("Critical", 60, 50, 30.0), ("Low", 40, 35, 70.0)]);
    s.replace_table(FactTable::ItTickets, it).await.unwrap();
  }

  #[tokio::test]
  async fn six_percent_growth_yields_one_info_insight() {
    let s = store().await;
    s.replace_table(FactTable::Finance, finance(&[100.0, 106.0], 15.0)).await.unwrap();

    let run = InsightEngine::new(s, KpiThresholds::default())
      .generate_all_insights()
      .await;
    let finance = run.insights_by_category(Category::Finance);
    assert_eq!(finance.len(), 1);
    assert_eq!(finance[0].severity, Severity::Info);
    assert!(finance[0].insight_text.contains("6.0%"));
    assert_eq!(finance[0].date, d(2024, 2, 29));
  }

  #[tokio::test]
  async fn seven_percent_decline_is_critical() {
    let s = store().await;
    s.replace_table(FactTable::Finance, finance(&[100.0, 93.0], 15.0)).await.unwrap();

    let run = InsightEngine::new(s, KpiThresholds::default())
      .generate_all_insights()
      .await;
    assert_eq!(run.insights_by_severity(Severity::Critical).len(), 1);
  }

  #[tokio::test]
  async fn every_domain_contributes() {
    let s = store().await;
    seed_all(&s).await;

    let run = InsightEngine::new(s.clone(), KpiThresholds::default())
      .generate_all_insights()
      .await;
    let rules: Vec<_> = run.insights.iter().map(|i| i.rule.as_str()).collect();
    assert_eq!(rules, vec![
      "revenue_growth",
      "best_region",
      "underperforming_region",
      "ontime_delivery",
      "processing_time",
      "headcount",
      "ticket_backlog",
    ]);

    // North sums both latest-month rows; December is outside the latest month.
    assert_eq!(run.insights[1].metric_value, Some(1200.0));
    assert_eq!(run.insights[2].metric_value, Some(600.0));
    assert!(run.insights[6].insight_text.contains("15.0%"));
    assert!(run.outcomes.iter().all(|o| !o.outcome.is_failed()));
    assert_eq!(s.latest_insights(50).await.unwrap().len(), 7);
  }

  #[tokio::test]
  async fn backlog_under_threshold_is_quiet() {
    let s = store().await;
    let it = it_tickets(d(2024, 2, 29), &[("High", 100, 95, 30.0)]);
    s.replace_table(FactTable::ItTickets, it).await.unwrap();

    let run = InsightEngine::new(s, KpiThresholds::default())
      .generate_all_insights()
      .await;
    assert!(run.insights_by_category(Category::It).is_empty());
  }

  #[tokio::test]
  async fn failing_hr_does_not_block_other_domains() {
    let s = store().await;
    seed_all(&s).await;
    s.run_schema_script("DROP TABLE hr;".to_owned()).await.unwrap();

    let run = InsightEngine::new(s.clone(), KpiThresholds::default())
      .generate_all_insights()
      .await;

    let hr = run.outcomes.iter().find(|o| o.unit == "hr").unwrap();
    assert!(hr.outcome.is_failed());
    for category in [Category::Finance, Category::Sales, Category::Operations, Category::It] {
      assert!(!run.insights_by_category(category).is_empty(), "{category} missing");
    }
    assert_eq!(s.latest_insights(50).await.unwrap().len(), run.insights.len());
  }

  #[tokio::test]
  async fn failed_write_keeps_insight() {
    let s = store().await;
    s.replace_table(FactTable::Finance, finance(&[100.0, 106.0], 15.0)).await.unwrap();
    s.run_schema_script("DROP TABLE insights;".to_owned()).await.unwrap();

    let run = InsightEngine::new(s, KpiThresholds::default())
      .generate_all_insights()
      .await;
    assert_eq!(run.insights.len(), 1);
  }

  #[tokio::test]
  async fn zero_previous_revenue_is_reported_as_skipped() {
    let s = store().await;
    s.replace_table(FactTable::Finance, finance(&[0.0, 50.0], 15.0)).await.unwrap();

    let run = InsightEngine::new(s, KpiThresholds::default())
      .generate_all_insights()
      .await;
    let skipped = run
      .outcomes
      .iter()
      .find(|o| o.unit == "finance.revenue_growth")
      .unwrap();
    assert!(matches!(skipped.outcome, UnitOutcome::Skipped { .. }));
    assert!(run.insights.is_empty());
  }

  #[tokio::test]
  async fn writes_export_artifact() {
    let s = store().await;
    s.replace_table(FactTable::Finance, finance(&[100.0, 106.0], 25.0)).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let run = InsightEngine::new(s, KpiThresholds::default())
      .with_artifact_dir(dir.path())
      .generate_all_insights()
      .await;

    let path = run.artifact.unwrap();
    let doc: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(doc["total_insights"], 2);
    assert_eq!(doc["insights"][0]["category"], "finance");
    assert_eq!(doc["insights"][0]["date"], "2024-02-29");
    assert_eq!(doc["insights"][1]["severity"], "info");
  }
}
