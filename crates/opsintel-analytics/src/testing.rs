//! Shared fixtures for engine tests.

use std::sync::Arc;

use chrono::NaiveDate;
use opsintel_store_sqlite::SqliteStore;

pub(crate) async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

pub(crate) fn d(y: i32, m: u32, day: u32) -> NaiveDate {
  NaiveDate::from_ymd_opt(y, m, day).unwrap()
}
