//! Threshold rules. Pure functions from metric values to findings; the
//! analyzers attach dates and categories.

use opsintel_core::{
  config::Threshold,
  record::{InsightRule, Severity},
};

/// A rule that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
  pub rule:     InsightRule,
  pub severity: Severity,
  pub text:     String,
  pub value:    f64,
}

impl Finding {
  fn new(rule: InsightRule, severity: Severity, text: String, value: f64) -> Self {
    Self { rule, severity, text, value }
  }
}

/// A rule that could not be evaluated on this data.
#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
  pub rule:   InsightRule,
  pub reason: String,
}

/// `Ok(None)`: evaluated, threshold not met.
pub type RuleResult = Result<Option<Finding>, Skip>;

fn mean(values: &[f64]) -> f64 { values.iter().sum::<f64>() / values.len() as f64 }

// ─── Finance ─────────────────────────────────────────────────────────────────

/// Month-over-month growth. Always produces a finding when evaluable.
pub fn revenue_growth(previous: f64, latest: f64, t: &Threshold) -> RuleResult {
  let rule = InsightRule::RevenueGrowth;
  if previous == 0.0 {
    return Err(Skip { rule, reason: "previous revenue is zero".to_owned() });
  }

  let growth = (latest - previous) / previous * 100.0;
  let (severity, text) = if growth >= t.good {
    (
      Severity::Info,
      format!(
        "Revenue growth accelerated by {growth:.1}% MoM. Consider scaling successful \
         marketing channels and expanding sales team."
      ),
    )
  } else if growth < t.critical {
    (
      Severity::Critical,
      format!(
        "Revenue declined by {:.1}% MoM. Immediate action needed: Review pricing strategy, \
         competitor analysis, and customer retention programs.",
        growth.abs()
      ),
    )
  } else if growth < t.warning {
    (
      Severity::Warning,
      format!(
        "Revenue growth slowed to {growth:.1}% MoM. Monitor closely and consider promotional \
         campaigns or new customer acquisition strategies."
      ),
    )
  } else {
    (
      Severity::Info,
      format!(
        "Revenue growing steadily at {growth:.1}% MoM. Maintain current strategies while \
         exploring new market opportunities."
      ),
    )
  };
  Ok(Some(Finding::new(rule, severity, text, growth)))
}

pub fn profit_margin(margin: f64, t: &Threshold) -> Option<Finding> {
  let rule = InsightRule::ProfitMargin;
  if margin < t.critical {
    Some(Finding::new(
      rule,
      Severity::Critical,
      format!(
        "Profit margin critically low at {margin:.1}%. Urgent review of cost structure and \
         pricing needed."
      ),
      margin,
    ))
  } else if margin > t.good {
    Some(Finding::new(
      rule,
      Severity::Info,
      format!(
        "Strong profit margin at {margin:.1}%. Opportunity to reinvest in growth initiatives."
      ),
      margin,
    ))
  } else {
    None
  }
}

// ─── Sales ───────────────────────────────────────────────────────────────────

/// Best region always; worst region too when it sells under 70% of the best.
/// Ties go to the region listed first.
pub fn regional_sales(units_by_region: &[(String, f64)]) -> Vec<Finding> {
  let Some(first) = units_by_region.first() else {
    return Vec::new();
  };
  let (mut best, mut worst) = (first, first);
  for entry in units_by_region {
    if entry.1 > best.1 {
      best = entry;
    }
    if entry.1 < worst.1 {
      worst = entry;
    }
  }

  let mut out = vec![Finding::new(
    InsightRule::BestRegion,
    Severity::Info,
    format!(
      "{} region is outperforming with {:.0} units sold. Consider replicating successful \
       strategies in other regions.",
      best.0, best.1
    ),
    best.1,
  )];
  if worst.1 < best.1 * 0.7 {
    out.push(Finding::new(
      InsightRule::UnderperformingRegion,
      Severity::Warning,
      format!(
        "{} region underperforming with only {:.0} units sold. Requires targeted support and \
         sales enablement.",
        worst.0, worst.1
      ),
      worst.1,
    ));
  }
  out
}

// ─── Operations ──────────────────────────────────────────────────────────────

pub fn ontime_delivery(pct: f64, t: &Threshold) -> Option<Finding> {
  let rule = InsightRule::OntimeDelivery;
  if pct < t.critical {
    Some(Finding::new(
      rule,
      Severity::Critical,
      format!(
        "On-time delivery dropped to {pct:.1}%. Critical: Review logistics processes and \
         staffing levels."
      ),
      pct,
    ))
  } else if pct > t.good {
    Some(Finding::new(
      rule,
      Severity::Info,
      format!("Excellent on-time delivery at {pct:.1}%. Maintain current operational excellence."),
      pct,
    ))
  } else {
    None
  }
}

/// Compares the mean of the last three processing times with the first
/// three, in chronological order.
pub fn processing_time_trend(hours: &[f64]) -> RuleResult {
  let rule = InsightRule::ProcessingTime;
  if hours.len() < 3 {
    return Ok(None);
  }
  let older = mean(&hours[..3]);
  let recent = mean(&hours[hours.len() - 3..]);
  if older == 0.0 {
    return Err(Skip { rule, reason: "earliest processing time is zero".to_owned() });
  }

  let improvement = (older - recent) / older * 100.0;
  Ok((improvement > 10.0).then(|| {
    Finding::new(
      rule,
      Severity::Info,
      format!(
        "Processing time improved by {improvement:.1}%. Great progress on operational \
         efficiency!"
      ),
      improvement,
    )
  }))
}

// ─── HR ──────────────────────────────────────────────────────────────────────

/// Higher is worse.
pub fn turnover(pct: f64, t: &Threshold) -> Option<Finding> {
  let rule = InsightRule::Turnover;
  if pct > t.critical {
    Some(Finding::new(
      rule,
      Severity::Critical,
      format!(
        "Employee turnover at critical level: {pct:.1}%. Immediate action: Review \
         compensation, culture, and exit interviews."
      ),
      pct,
    ))
  } else if pct < t.good {
    Some(Finding::new(
      rule,
      Severity::Info,
      format!(
        "Healthy turnover rate at {pct:.1}%. Strong employee retention indicates positive \
         culture."
      ),
      pct,
    ))
  } else {
    None
  }
}

/// Headcount growth since the first point of the window, in chronological
/// order.
pub fn headcount_growth(counts: &[f64]) -> Option<Finding> {
  let (first, last) = (counts.first()?, counts.last()?);
  if counts.len() < 2 {
    return None;
  }
  let growth = last - first;
  (growth > 10.0).then(|| {
    Finding::new(
      InsightRule::Headcount,
      Severity::Info,
      format!(
        "Team grew by {growth:.0} employees. Ensure onboarding processes can scale with growth."
      ),
      growth,
    )
  })
}

// ─── IT ──────────────────────────────────────────────────────────────────────

/// Slow critical tickets warn rather than escalate.
pub fn critical_resolution(hours: f64, t: &Threshold) -> Option<Finding> {
  let rule = InsightRule::CriticalResolution;
  if hours > t.critical {
    Some(Finding::new(
      rule,
      Severity::Warning,
      format!(
        "Critical ticket resolution time at {hours:.1} hours. Consider increasing IT support \
         staffing or implementing automation."
      ),
      hours,
    ))
  } else if hours < t.good {
    Some(Finding::new(
      rule,
      Severity::Info,
      format!("Excellent critical ticket resolution: {hours:.1} hours. IT team is performing well."),
      hours,
    ))
  } else {
    None
  }
}

/// Warns when fewer than 90% of opened tickets were closed.
pub fn ticket_backlog(opened: f64, closed: f64) -> Option<Finding> {
  if opened <= 0.0 || closed >= opened * 0.9 {
    return None;
  }
  let rate = (opened - closed) / opened * 100.0;
  Some(Finding::new(
    InsightRule::TicketBacklog,
    Severity::Warning,
    format!(
      "Ticket backlog growing ({rate:.1}% of opened tickets pending). Review resource \
       allocation and ticket prioritization."
    ),
    rate,
  ))
}
