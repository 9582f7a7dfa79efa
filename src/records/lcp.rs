//! Largest-contentful-paint merge
//!
//! Two independent monotonic max-trackers (image, text) feed this one merge
//! step. The calculator remembers the last candidate of each kind that was
//! notified with a resolved timestamp, reports whichever is larger, and
//! enforces the monotonic floor: within one navigation epoch the reported
//! size never decreases. Advancing the epoch (a detected navigation) resets
//! the floor to zero.

use crate::dom::DomNodeId;
use crate::geometry::Rect;
use crate::records::record::CandidateKind;
use crate::records::record::CandidateSummary;
use crate::timing::Timestamp;
use serde::Serialize;

/// Extra detail carried on image candidates for change notifications.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LcpDebugInfo {
  pub node: DomNodeId,
  pub frame_rect: Rect,
  pub entropy_bpp: f64,
  pub high_priority: bool,
}

/// The currently reported largest contentful paint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LcpCandidate {
  pub kind: CandidateKind,
  pub area: u64,
  pub paint_time: Timestamp,
  pub debug: Option<LcpDebugInfo>,
}

/// Merges per-kind leaders into one reported LCP with a monotonic floor.
#[derive(Debug, Default)]
pub struct LcpCalculator {
  latest_text: Option<LcpCandidate>,
  latest_image: Option<LcpCandidate>,
  reported: Option<LcpCandidate>,
  /// Size floor for acceptance within the current epoch.
  floor: u64,
  epoch: u64,
}

impl LcpCalculator {
  pub fn new() -> Self {
    Self::default()
  }

  /// Considers a new text leader. Returns whether the externally reported
  /// LCP changed.
  pub fn notify_if_text_candidate_changed(&mut self, paint_time: Timestamp, area: u64) -> bool {
    if area < self.floor {
      return false;
    }
    self.latest_text = Some(LcpCandidate {
      kind: CandidateKind::Text,
      area,
      paint_time,
      debug: None,
    });
    self.remerge()
  }

  /// Considers a new image leader. Returns whether the externally reported
  /// LCP changed.
  pub fn notify_if_image_candidate_changed(
    &mut self,
    paint_time: Timestamp,
    area: u64,
    record: &CandidateSummary,
    entropy_bpp: f64,
    high_priority: bool,
  ) -> bool {
    if area < self.floor {
      return false;
    }
    self.latest_image = Some(LcpCandidate {
      kind: CandidateKind::Image,
      area,
      paint_time,
      debug: Some(LcpDebugInfo {
        node: record.node,
        frame_rect: record.frame_rect,
        entropy_bpp,
        high_priority,
      }),
    });
    self.remerge()
  }

  /// The reported LCP, if any candidate has been accepted this epoch.
  pub fn latest(&self) -> Option<&LcpCandidate> {
    self.reported.as_ref()
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  /// Starts a new navigation epoch: the floor drops to zero and previously
  /// notified candidates no longer compete.
  pub fn advance_epoch(&mut self) {
    self.epoch += 1;
    self.floor = 0;
    self.latest_text = None;
    self.latest_image = None;
    self.reported = None;
  }

  /// Recomputes the merged leader. On an exact area tie the most recently
  /// notified kind wins, which is whichever `latest_*` slot was just
  /// written; stability over strict determinism, ties are rare in practice.
  fn remerge(&mut self) -> bool {
    let merged = match (&self.latest_text, &self.latest_image) {
      (Some(text), Some(image)) => {
        if text.area > image.area {
          Some(*text)
        } else if image.area > text.area {
          Some(*image)
        } else {
          // Tie: prefer the one notified last. The caller just overwrote
          // exactly one slot, so compare against the previous report.
          match &self.reported {
            Some(prev) if prev.kind == CandidateKind::Text => Some(*image),
            Some(_) => Some(*text),
            None => Some(*image),
          }
        }
      }
      (Some(text), None) => Some(*text),
      (None, Some(image)) => Some(*image),
      (None, None) => None,
    };

    let changed = match (&self.reported, &merged) {
      (None, Some(_)) => true,
      (Some(prev), Some(next)) => {
        prev.area != next.area
          || prev.kind != next.kind
          || prev.paint_time != next.paint_time
      }
      _ => false,
    };

    if let Some(next) = merged {
      self.floor = next.area;
      self.reported = Some(next);
    }
    changed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::dom::CandidateId;
  use crate::timing::FrameIndex;

  fn image_summary(node: u64, area: u64) -> CandidateSummary {
    CandidateSummary {
      id: CandidateId::for_image(DomNodeId(node), "src"),
      node: DomNodeId(node),
      kind: CandidateKind::Image,
      area,
      paint_time: Some(Timestamp::from_millis(5.0)),
      frame_rect: Rect::from_xywh(0.0, 0.0, 10.0, 10.0),
      frame_index: FrameIndex::ZERO,
    }
  }

  #[test]
  fn larger_kind_wins_the_merge() {
    let mut lcp = LcpCalculator::new();
    assert!(lcp.notify_if_text_candidate_changed(Timestamp::from_millis(1.0), 300));
    let img = image_summary(1, 500);
    assert!(lcp.notify_if_image_candidate_changed(
      Timestamp::from_millis(2.0),
      500,
      &img,
      1.2,
      true
    ));
    assert_eq!(lcp.latest().unwrap().kind, CandidateKind::Image);
    assert_eq!(lcp.latest().unwrap().area, 500);
  }

  #[test]
  fn smaller_candidates_are_rejected_by_the_floor() {
    let mut lcp = LcpCalculator::new();
    lcp.notify_if_text_candidate_changed(Timestamp::from_millis(1.0), 300);
    assert!(!lcp.notify_if_text_candidate_changed(Timestamp::from_millis(2.0), 200));
    assert_eq!(lcp.latest().unwrap().area, 300);
  }

  #[test]
  fn reported_size_is_monotonic_within_an_epoch() {
    let mut lcp = LcpCalculator::new();
    let sizes = [100, 50, 150, 120, 600, 599];
    let mut last = 0;
    for (i, size) in sizes.iter().enumerate() {
      lcp.notify_if_text_candidate_changed(Timestamp::from_millis(i as f64), *size);
      let reported = lcp.latest().unwrap().area;
      assert!(reported >= last);
      last = reported;
    }
    assert_eq!(last, 600);
  }

  #[test]
  fn epoch_advance_resets_the_floor() {
    let mut lcp = LcpCalculator::new();
    lcp.notify_if_text_candidate_changed(Timestamp::from_millis(1.0), 900);
    lcp.advance_epoch();
    assert!(lcp.latest().is_none());
    assert!(lcp.notify_if_text_candidate_changed(Timestamp::from_millis(2.0), 40));
    assert_eq!(lcp.latest().unwrap().area, 40);
  }

  #[test]
  fn exact_tie_prefers_most_recently_notified() {
    let mut lcp = LcpCalculator::new();
    lcp.notify_if_text_candidate_changed(Timestamp::from_millis(1.0), 400);
    let img = image_summary(2, 400);
    assert!(lcp.notify_if_image_candidate_changed(
      Timestamp::from_millis(2.0),
      400,
      &img,
      0.8,
      false
    ));
    assert_eq!(lcp.latest().unwrap().kind, CandidateKind::Image);
  }

  #[test]
  fn equal_renotification_does_not_report_a_change() {
    let mut lcp = LcpCalculator::new();
    lcp.notify_if_text_candidate_changed(Timestamp::from_millis(1.0), 400);
    assert!(!lcp.notify_if_text_candidate_changed(Timestamp::from_millis(1.0), 400));
  }
}
