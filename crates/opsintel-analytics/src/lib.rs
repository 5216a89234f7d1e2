//! Analytics engines for OpsIntel.
//!
//! - [`anomaly`]: per-metric z-score and isolation-forest scanning.
//! - [`insight`]: threshold rules turning recent metric windows into
//!   categorised, severity-ranked recommendations.
//! - [`forecast`]: Holt-Winters forecasts with in-sample accuracy.
//!
//! Engines read fact tables and write their own derived table through a
//! [`MetricStore`](opsintel_core::store::MetricStore). None of them share
//! in-memory state, so each can run on its own.

pub mod anomaly;
pub mod error;
pub mod forecast;
pub mod insight;
mod metric;

pub use anomaly::{AnomalyEngine, AnomalyRun};
pub use error::{Error, Result};
pub use forecast::{ForecastAdapter, ForecastRun, HoltWinters};
pub use insight::{InsightEngine, InsightRun};
pub use metric::MetricSpec;

#[cfg(test)]
mod testing;
