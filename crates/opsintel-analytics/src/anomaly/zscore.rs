//! Univariate z-score scoring.

/// Scores for one series: `|x - μ| / σ` per point, with the series mean.
#[derive(Debug, Clone, PartialEq)]
pub struct ZScores {
  pub mean:   f64,
  pub scores: Vec<f64>,
}

fn mean(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1). Zero below two observations.
fn sample_std(values: &[f64], mean: f64) -> f64 {
  if values.len() < 2 {
    return 0.0;
  }
  let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
  (ss / (values.len() - 1) as f64).sqrt()
}

/// Every score is 0 when σ is 0 or undefined.
pub fn z_scores(values: &[f64]) -> ZScores {
  let mean = mean(values);
  let std = sample_std(values, mean);
  let scores = if std == 0.0 || !std.is_finite() {
    vec![0.0; values.len()]
  } else {
    values.iter().map(|v| ((v - mean) / std).abs()).collect()
  };
  ZScores { mean, scores }
}

/// Indices whose score strictly exceeds `threshold`.
pub fn flagged(scores: &ZScores, threshold: f64) -> Vec<usize> {
  scores
    .scores
    .iter()
    .enumerate()
    .filter(|(_, s)| **s > threshold)
    .map(|(i, _)| i)
    .collect()
}
