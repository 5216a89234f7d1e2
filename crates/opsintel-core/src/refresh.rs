//! Single-flight refresh state and the runner abstraction.
//!
//! [`RefreshState`] is an injectable holder shared by the task that runs a
//! refresh and by status queries. Entry into `Running` is a compare-and-set on
//! an atomic status, so a second trigger while one refresh is in flight is
//! rejected without touching the state.

use std::{
  future::Future,
  sync::{
    RwLock,
    atomic::{AtomicU8, Ordering},
  },
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum RefreshStatus {
  Idle = 0,
  Running = 1,
  Completed = 2,
  Failed = 3,
}

impl RefreshStatus {
  fn from_u8(v: u8) -> Self {
    match v {
      1 => Self::Running,
      2 => Self::Completed,
      3 => Self::Failed,
      _ => Self::Idle,
    }
  }
}

/// Point-in-time copy of the refresh state, as served to status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSnapshot {
  pub status:       RefreshStatus,
  pub last_refresh: Option<DateTime<Utc>>,
  pub message:      String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Refresh already in progress")]
pub struct RefreshConflict;

#[derive(Debug, Default)]
struct Detail {
  last_refresh: Option<DateTime<Utc>>,
  message:      String,
}

// ─── State holder ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RefreshState {
  status: AtomicU8,
  detail: RwLock<Detail>,
}

impl Default for RefreshState {
  fn default() -> Self { Self::new() }
}

impl RefreshState {
  pub fn new() -> Self {
    Self {
      status: AtomicU8::new(RefreshStatus::Idle as u8),
      detail: RwLock::new(Detail::default()),
    }
  }

  pub fn status(&self) -> RefreshStatus {
    RefreshStatus::from_u8(self.status.load(Ordering::Acquire))
  }

  /// Move into `Running` unless a refresh is already running. On conflict
  /// nothing is modified.
  pub fn try_begin(&self, message: impl Into<String>) -> Result<(), RefreshConflict> {
    let mut current = self.status.load(Ordering::Acquire);
    loop {
      if current == RefreshStatus::Running as u8 {
        return Err(RefreshConflict);
      }
      match self.status.compare_exchange(
        current,
        RefreshStatus::Running as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
      ) {
        Ok(_) => break,
        Err(actual) => current = actual,
      }
    }
    self.set_message(message);
    Ok(())
  }

  /// Progress note from the running task.
  pub fn set_message(&self, message: impl Into<String>) {
    if let Ok(mut d) = self.detail.write() {
      d.message = message.into();
    }
  }

  pub fn complete(&self, message: impl Into<String>) {
    if let Ok(mut d) = self.detail.write() {
      d.message = message.into();
      d.last_refresh = Some(Utc::now());
    }
    self.status.store(RefreshStatus::Completed as u8, Ordering::Release);
  }

  pub fn fail(&self, message: impl Into<String>) {
    self.set_message(message);
    self.status.store(RefreshStatus::Failed as u8, Ordering::Release);
  }

  pub fn snapshot(&self) -> RefreshSnapshot {
    let (last_refresh, message) = match self.detail.read() {
      Ok(d) => (d.last_refresh, d.message.clone()),
      Err(_) => (None, String::new()),
    };
    RefreshSnapshot { status: self.status(), last_refresh, message }
  }
}

// ─── Runner ──────────────────────────────────────────────────────────────────

/// Which stages a refresh should run after ETL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
  pub regenerate_data:       bool,
  pub run_forecasting:       bool,
  pub run_anomaly_detection: bool,
  pub run_insights:          bool,
}

impl Default for RefreshRequest {
  fn default() -> Self {
    Self {
      regenerate_data:       false,
      run_forecasting:       true,
      run_anomaly_detection: true,
      run_insights:          true,
    }
  }
}

/// The full pipeline as seen from the presentation boundary.
///
/// Implementations report progress through [`RefreshState::set_message`] and
/// return the completion message. The caller owns the status transitions.
pub trait RefreshRunner: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn run<'a>(
    &'a self,
    request: RefreshRequest,
    state: &'a RefreshState,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_begin_is_rejected_and_leaves_state_alone() {
    let state = RefreshState::new();
    state.try_begin("Starting data refresh...").unwrap();
    state.set_message("Running ETL pipeline...");
    let before = state.snapshot();

    assert_eq!(state.try_begin("again"), Err(RefreshConflict));
    assert_eq!(state.snapshot(), before);
    assert_eq!(before.status, RefreshStatus::Running);
  }

  #[test]
  fn finished_refresh_can_restart() {
    let state = RefreshState::new();
    assert_eq!(state.snapshot().last_refresh, None);

    state.try_begin("go").unwrap();
    state.complete("done");
    let snap = state.snapshot();
    assert_eq!(snap.status, RefreshStatus::Completed);
    assert!(snap.last_refresh.is_some());

    state.try_begin("go").unwrap();
    state.fail("boom");
    assert_eq!(state.status(), RefreshStatus::Failed);
    assert!(state.try_begin("retry").is_ok());
  }

  #[test]
  fn status_serialises_lowercase() {
    let json = serde_json::to_string(&RefreshStatus::Completed).unwrap();
    assert_eq!(json, "\"completed\"");
  }
}
