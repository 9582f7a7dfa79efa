//! Per-kind largest-candidate tracking
//!
//! Measurement completes in two steps: a record is observed (area known) and
//! only later presented (timestamp known). The tracker therefore keeps two
//! maxima — the largest *painted* record and the largest still-*pending* one
//! — and reports the pending one optimistically when it is strictly larger,
//! without letting it corrupt authoritative metrics until it resolves.

use crate::dom::CandidateId;
use crate::records::record::CandidateSummary;

/// Tracks the largest painted and largest pending candidate of one kind.
#[derive(Debug, Default)]
pub struct LargestCandidateTracker {
  largest_painted: Option<CandidateSummary>,
  largest_pending: Option<CandidateSummary>,
}

impl LargestCandidateTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Offers a record that has been queued for timestamp resolution.
  ///
  /// Replaces the pending leader only on strict increase; ties keep the
  /// incumbent (first seen wins).
  pub fn offer_pending(&mut self, candidate: CandidateSummary) {
    match &self.largest_pending {
      Some(leader) if candidate.area <= leader.area => {}
      _ => self.largest_pending = Some(candidate),
    }
  }

  /// Offers a record whose presentation timestamp has resolved.
  ///
  /// If the record was the pending leader it stops being pending. The
  /// painted leader is replaced only on strict increase.
  pub fn offer_painted(&mut self, candidate: CandidateSummary) {
    debug_assert!(candidate.paint_time.is_some());
    if self.pending_id() == Some(candidate.id) {
      self.largest_pending = None;
    }
    match &self.largest_painted {
      Some(leader) if candidate.area <= leader.area => {}
      _ => self.largest_painted = Some(candidate),
    }
  }

  /// The externally visible largest candidate: the painted leader, unless a
  /// strictly larger measurement is still awaiting its timestamp, in which
  /// case the pending one is reported optimistically.
  pub fn current(&self) -> Option<&CandidateSummary> {
    match (&self.largest_painted, &self.largest_pending) {
      (Some(painted), Some(pending)) => {
        if pending.area > painted.area {
          Some(pending)
        } else {
          Some(painted)
        }
      }
      (Some(painted), None) => Some(painted),
      (None, pending) => pending.as_ref(),
    }
  }

  /// The authoritative leader: resolved timestamps only. This is what feeds
  /// metrics and the monotonic LCP floor.
  pub fn authoritative(&self) -> Option<&CandidateSummary> {
    self.largest_painted.as_ref()
  }

  pub fn pending_id(&self) -> Option<CandidateId> {
    self.largest_pending.as_ref().map(|p| p.id)
  }

  /// Drops the pending leader without resolving it (shutdown: in-flight
  /// measurements are discarded, not retried).
  pub fn drop_pending(&mut self) {
    self.largest_pending = None;
  }
}
