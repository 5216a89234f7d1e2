//! Forecast adapter: fits a [`ForecastModel`] per metric, scores it against
//! its own history and stores the future-dated points.

mod accuracy;
mod holt_winters;

use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;
use opsintel_core::{
  config::ForecastConfig,
  outcome::{UnitOutcome, UnitReport},
  record::{AccuracyMetrics, ForecastPoint, RunStamp},
  store::{FetchQuery, MetricStore},
  table::{Column, FactTable},
};
use tracing::{info, warn};

pub use self::{
  accuracy::accuracy,
  holt_winters::{FittedHoltWinters, FittedModel, ForecastModel, HoltWinters},
};
use crate::{Error, MetricSpec, Result};

/// The metrics forecast by [`ForecastAdapter::forecast_all_key_metrics`].
pub const KEY_METRICS: [MetricSpec; 5] = [
  MetricSpec::of(FactTable::Finance, Column::Revenue, "Revenue"),
  MetricSpec::of(FactTable::Finance, Column::Expenses, "Expenses"),
  MetricSpec::of(FactTable::Finance, Column::Profit, "Profit"),
  MetricSpec::of(FactTable::Hr, Column::TurnoverRatePct, "Employee Turnover Rate"),
  MetricSpec::of(FactTable::Hr, Column::EmployeeCount, "Employee Count"),
];

/// One metric's forecast.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricForecast {
  pub metric:      String,
  /// In-sample fits followed by the future points, in date order.
  pub series:      Vec<ForecastPoint>,
  pub accuracy:    AccuracyMetrics,
  /// Last observed date; points after it are the forecast proper.
  pub history_end: NaiveDate,
}

impl MetricForecast {
  pub fn future(&self) -> impl Iterator<Item = &ForecastPoint> {
    self.series.iter().filter(|p| p.date > self.history_end)
  }
}

#[derive(Debug, Clone, Default)]
pub struct ForecastRun {
  pub forecasts: BTreeMap<String, MetricForecast>,
  pub outcomes:  Vec<UnitReport>,
}

pub struct ForecastAdapter<S, M = HoltWinters> {
  store:   Arc<S>,
  model:   M,
  horizon: usize,
}

impl<S: MetricStore> ForecastAdapter<S> {
  pub fn new(store: Arc<S>, config: &ForecastConfig) -> Self {
    Self { store, model: HoltWinters::new(config), horizon: config.periods }
  }
}

impl<S: MetricStore, M: ForecastModel> ForecastAdapter<S, M> {
  /// Swap in another model.
  pub fn with_model<N: ForecastModel>(self, model: N) -> ForecastAdapter<S, N> {
    ForecastAdapter { store: self.store, model, horizon: self.horizon }
  }

  pub fn horizon(&self) -> usize { self.horizon }

  /// Fit `value_col` of `table` and forecast `horizon` months ahead.
  pub async fn forecast_metric(
    &self,
    table: FactTable,
    date_col: Column,
    value_col: Column,
    display_name: &str,
    horizon: usize,
  ) -> Result<MetricForecast> {
    let query = FetchQuery::new(table, &[date_col, value_col])?
      .non_null(date_col)?
      .non_null(value_col)?;
    let frame = self.store.fetch(&query).await.map_err(Error::store)?;
    let history = frame.series(date_col, value_col);
    let Some((history_end, _)) = history.last().copied() else {
      return Err(Error::InsufficientData {
        metric: display_name.to_owned(),
        needed: 2,
        got:    0,
      });
    };

    let series = self.model.fit(&history)?.predict(horizon);
    let accuracy = accuracy(&history, &series);
    Ok(MetricForecast { metric: display_name.to_owned(), series, accuracy, history_end })
  }

  /// Upsert the future points of `forecast`. Returns how many were written.
  pub async fn save_forecast(&self, forecast: &MetricForecast, stamp: RunStamp) -> Result<usize> {
    let mut written = 0;
    for point in forecast.future() {
      self
        .store
        .record_forecast(&forecast.metric, self.model.name(), point, stamp)
        .await
        .map_err(Error::store)?;
      written += 1;
    }
    Ok(written)
  }

  /// Forecast and store every key metric. A failing metric is reported and
  /// skipped.
  pub async fn forecast_all_key_metrics(&self) -> ForecastRun {
    let stamp = RunStamp::now();
    let mut run = ForecastRun::default();

    for metric in KEY_METRICS {
      let result = async {
        let forecast = self
          .forecast_metric(
            metric.table,
            Column::Date,
            metric.column,
            metric.display_name,
            self.horizon,
          )
          .await?;
        let stored = self.save_forecast(&forecast, stamp).await?;
        Ok::<_, Error>((forecast, stored))
      }
      .await;

      let outcome = match result {
        Ok((forecast, stored)) => {
          info!(
            metric = metric.display_name,
            rmse = forecast.accuracy.rmse,
            mape = forecast.accuracy.mape,
            stored,
            "forecast metric"
          );
          run.forecasts.insert(metric.display_name.to_owned(), forecast);
          UnitOutcome::Completed { count: stored }
        }
        Err(e) => {
          warn!(metric = metric.display_name, error = %e, "forecast failed");
          UnitOutcome::failed(e)
        }
      };
      run.outcomes.push(UnitReport::new(metric.display_name, outcome));
    }

    info!(forecasts = run.forecasts.len(), "forecasting complete");
    run
  }
}
