//! Isolation forest outlier scoring.
//!
//! Each tree recursively splits a random subsample on a random feature at a
//! random cut between the feature's min and max. Outliers isolate in fewer
//! splits, so a short average path length means a high score. Scores follow
//! the usual normalisation `2^(-E[h(x)] / c(ψ))`, in `(0, 1]`, higher is more
//! anomalous.

use rand::{Rng, SeedableRng, rngs::StdRng};

/// Per-row result of an [`OutlierModel`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierScore {
  pub is_outlier: bool,
  /// Higher is more anomalous.
  pub score:      f64,
}

/// A multivariate outlier model over a row-major feature matrix.
pub trait OutlierModel: Send + Sync {
  fn fit_predict(&self, rows: &[Vec<f64>]) -> Vec<OutlierScore>;
}

/// Standardise columns to zero mean and unit population variance.
///
/// Missing cells take the column mean first. A column with zero variance is
/// divided by 1, and a column with no values at all becomes zeros.
pub fn standardize(rows: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
  let Some(width) = rows.iter().map(Vec::len).max() else {
    return Vec::new();
  };

  let mut out = vec![vec![0.0; width]; rows.len()];
  for col in 0..width {
    let present: Vec<f64> = rows.iter().filter_map(|r| r.get(col).copied().flatten()).collect();
    let mean = if present.is_empty() {
      0.0
    } else {
      present.iter().sum::<f64>() / present.len() as f64
    };
    let filled: Vec<f64> = rows
      .iter()
      .map(|r| r.get(col).copied().flatten().unwrap_or(mean))
      .collect();
    let var = filled.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / filled.len() as f64;
    let std = if var > 0.0 { var.sqrt() } else { 1.0 };
    for (row, v) in out.iter_mut().zip(filled) {
      row[col] = (v - mean) / std;
    }
  }
  out
}

// ─── Forest ──────────────────────────────────────────────────────────────────

const MAX_SAMPLES: usize = 256;

/// Average path length of an unsuccessful BST search over `n` points.
fn c_factor(n: usize) -> f64 {
  match n {
    0 | 1 => 0.0,
    2 => 1.0,
    _ => {
      let n = n as f64;
      let harmonic = (n - 1.0).ln() + 0.577_215_664_901_532_9;
      2.0 * harmonic - 2.0 * (n - 1.0) / n
    }
  }
}

enum Node {
  Leaf { size: usize },
  Split { feature: usize, cut: f64, left: Box<Node>, right: Box<Node> },
}

impl Node {
  fn build(rows: &[&[f64]], depth: usize, limit: usize, rng: &mut StdRng) -> Self {
    if depth >= limit || rows.len() <= 1 {
      return Node::Leaf { size: rows.len() };
    }

    let width = rows[0].len();
    // Features that still vary within this node.
    let candidates: Vec<(usize, f64, f64)> = (0..width)
      .filter_map(|f| {
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), r| {
          (lo.min(r[f]), hi.max(r[f]))
        });
        (hi > lo).then_some((f, lo, hi))
      })
      .collect();
    if candidates.is_empty() {
      return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let cut = rng.random_range(lo..hi);
    let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
      rows.iter().copied().partition(|r| r[feature] < cut);

    Node::Split {
      feature,
      cut,
      left: Box::new(Node::build(&left, depth + 1, limit, rng)),
      right: Box::new(Node::build(&right, depth + 1, limit, rng)),
    }
  }

  fn path_length(&self, row: &[f64], depth: usize) -> f64 {
    match self {
      Node::Leaf { size } => depth as f64 + c_factor(*size),
      Node::Split { feature, cut, left, right } => {
        let next = if row[*feature] < *cut { left } else { right };
        next.path_length(row, depth + 1)
      }
    }
  }
}

/// Seeded isolation forest. The same seed and input give the same scores.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolationForest {
  pub n_estimators:  usize,
  /// Expected share of outliers, in `[0, 0.5]`.
  pub contamination: f64,
  pub seed:          u64,
}

impl IsolationForest {
  pub fn new(n_estimators: usize, contamination: f64, seed: u64) -> Self {
    Self { n_estimators: n_estimators.max(1), contamination, seed }
  }

  /// Raw anomaly scores, one per row.
  pub fn scores(&self, rows: &[Vec<f64>]) -> Vec<f64> {
    let n = rows.len();
    if n == 0 {
      return Vec::new();
    }

    let psi = n.min(MAX_SAMPLES);
    let limit = (psi as f64).log2().ceil() as usize;
    let mut rng = StdRng::seed_from_u64(self.seed);

    let mut total = vec![0.0; n];
    for _ in 0..self.n_estimators {
      let sample: Vec<&[f64]> = rand::seq::index::sample(&mut rng, n, psi)
        .into_iter()
        .map(|i| rows[i].as_slice())
        .collect();
      let tree = Node::build(&sample, 0, limit, &mut rng);
      for (acc, row) in total.iter_mut().zip(rows) {
        *acc += tree.path_length(row, 0);
      }
    }

    let norm = c_factor(psi);
    total
      .into_iter()
      .map(|sum| {
        let mean_path = sum / self.n_estimators as f64;
        if norm > 0.0 { 2f64.powf(-mean_path / norm) } else { 0.5 }
      })
      .collect()
  }
}

/// Linear-interpolated percentile, `q` in `[0, 1]`.
fn percentile(values: &[f64], q: f64) -> f64 {
  let mut sorted = values.to_vec();
  sorted.sort_by(f64::total_cmp);
  let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
  sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

impl OutlierModel for IsolationForest {
  fn fit_predict(&self, rows: &[Vec<f64>]) -> Vec<OutlierScore> {
    let scores = self.scores(rows);
    if scores.is_empty() {
      return Vec::new();
    }
    let cutoff = percentile(&scores, 1.0 - self.contamination);
    scores
      .into_iter()
      .map(|score| OutlierScore { is_outlier: score > cutoff, score })
      .collect()
  }
}
