//! Diagnostic counters
//!
//! Aggregated once per interaction context at exhaustion, plus the
//! document-level counters the orchestrator bumps directly. Purely
//! informational: nothing here feeds back into detection decisions.

use log::debug;
use serde::Serialize;

/// Why an interaction context did or did not become a soft navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SoftNavigationOutcome {
  /// Graduated: all four criteria held and a navigation id was assigned.
  Detected,
  /// DOM was modified but attributed paint never reached the threshold.
  InsufficientPaints,
  /// No DOM modification was ever attributed to the context.
  NoDomModification,
  /// A same-document URL change arrived with no context to attach to.
  /// Counted at the document level, not against any single context.
  NoContextAtUrlChange,
}

/// Running totals for one document lifetime.
#[derive(Debug, Default, Clone, Serialize)]
pub struct TimingMetrics {
  pub detected: u64,
  pub insufficient_paints: u64,
  pub no_dom_modification: u64,
  pub no_context_at_url_change: u64,
  /// Sum of attributed paint area across finalized contexts.
  pub total_attributed_paint_area: u64,
  /// Sum of the deduplicated repaint tallies across finalized contexts.
  pub total_repainted_area: u64,
}

impl TimingMetrics {
  pub fn new() -> Self {
    Self::default()
  }

  /// Folds one finalized context into the totals. Called exactly once per
  /// context, at exhaustion or shutdown.
  pub fn record_context(
    &mut self,
    outcome: SoftNavigationOutcome,
    attributed_area: u64,
    repainted_area: u64,
  ) {
    self.bump(outcome);
    self.total_attributed_paint_area += attributed_area;
    self.total_repainted_area += repainted_area;
    debug!(
      "context finalized: {:?}, attributed {}px, repainted {}px",
      outcome, attributed_area, repainted_area
    );
  }

  /// A same-document URL change that could not be attributed to any context.
  pub fn record_unattributed_url_change(&mut self) {
    self.bump(SoftNavigationOutcome::NoContextAtUrlChange);
  }

  pub fn count_for(&self, outcome: SoftNavigationOutcome) -> u64 {
    match outcome {
      SoftNavigationOutcome::Detected => self.detected,
      SoftNavigationOutcome::InsufficientPaints => self.insufficient_paints,
      SoftNavigationOutcome::NoDomModification => self.no_dom_modification,
      SoftNavigationOutcome::NoContextAtUrlChange => self.no_context_at_url_change,
    }
  }

  fn bump(&mut self, outcome: SoftNavigationOutcome) {
    match outcome {
      SoftNavigationOutcome::Detected => self.detected += 1,
      SoftNavigationOutcome::InsufficientPaints => self.insufficient_paints += 1,
      SoftNavigationOutcome::NoDomModification => self.no_dom_modification += 1,
      SoftNavigationOutcome::NoContextAtUrlChange => self.no_context_at_url_change += 1,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn contexts_fold_into_totals() {
    let mut metrics = TimingMetrics::new();
    metrics.record_context(SoftNavigationOutcome::Detected, 1200, 300);
    metrics.record_context(SoftNavigationOutcome::InsufficientPaints, 40, 0);
    assert_eq!(metrics.detected, 1);
    assert_eq!(metrics.insufficient_paints, 1);
    assert_eq!(metrics.total_attributed_paint_area, 1240);
    assert_eq!(metrics.total_repainted_area, 300);
  }

  #[test]
  fn unattributed_url_changes_count_at_document_level() {
    let mut metrics = TimingMetrics::new();
    metrics.record_unattributed_url_change();
    assert_eq!(
      metrics.count_for(SoftNavigationOutcome::NoContextAtUrlChange),
      1
    );
  }

  #[test]
  fn metrics_serialize_for_embedder_dumps() {
    let mut metrics = TimingMetrics::new();
    metrics.record_context(SoftNavigationOutcome::Detected, 1200, 300);
    let json = serde_json::to_string(&metrics).unwrap();
    assert!(json.contains("\"detected\":1"));
    assert!(json.contains("\"total_attributed_paint_area\":1200"));
  }
}
