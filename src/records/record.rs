//! Candidate records
//!
//! One record per observed paintable unit of content — an image or an
//! aggregated text block — tracking its measured pixel area and how far its
//! paint has progressed toward a resolved presentation timestamp. Records are
//! created the first time a leaf paints with non-zero area, updated in place
//! on every repaint of the same identity, and dropped when the owning render
//! node is torn down.

use crate::attribution::ContextId;
use crate::dom::CandidateId;
use crate::dom::DomNodeId;
use crate::geometry::Rect;
use crate::timing::FrameIndex;
use crate::timing::Timestamp;
use serde::Serialize;

/// Images below this many bits per pixel (placeholders, gradients shipped as
/// images, single-color fills) are tracked for bookkeeping but never become
/// LCP candidates.
pub const MIN_IMAGE_ENTROPY_BPP: f64 = 0.05;

/// Which of the two independent content kinds a record measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CandidateKind {
  Image,
  Text,
}

/// Image-only measurement detail.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ImageDetail {
  /// Encoded bits per displayed pixel, from the media pipeline.
  pub entropy_bpp: f64,
  /// Whether the resource loaded at high request priority.
  pub high_priority: bool,
  /// True once the first frame of an animated image has presented; its
  /// timestamp arrives out of band, bypassing the presentation queue.
  pub first_animated_frame: bool,
}

/// A tracked measurement of one paintable unit of content.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
  pub id: CandidateId,
  /// Back-reference to the owning node. Never owning: teardown purges the
  /// record, so a stored id that no longer resolves means "absent".
  pub node: DomNodeId,
  pub kind: CandidateKind,
  /// Pixel area of the visible, clipped, transformed paint rect at the most
  /// recent observation.
  pub recorded_area: u64,
  /// Clipped paint rect backing `recorded_area`, kept for debug output.
  pub frame_rect: Rect,
  /// Rendering pass that produced the most recent observation.
  pub frame_index: FrameIndex,
  /// Presentation timestamp; `None` until a presentation callback (or the
  /// media pipeline, for animated first frames) resolves it.
  pub paint_time: Option<Timestamp>,
  /// Whether the content finished loading (text is born loaded).
  pub loaded: bool,
  /// Images must be *sufficiently* loaded (enough data decoded to paint at
  /// full fidelity) before they are LCP-eligible.
  pub sufficiently_loaded: bool,
  /// Interaction context this record is currently attributed to. Repaints
  /// may re-attribute.
  pub soft_nav_context: Option<ContextId>,
  /// Whether global LCP tracking was still live when the record was
  /// created. Records tracked only for element timing or soft-navigation
  /// attribution never compete for the global largest candidate.
  pub tracked_for_lcp: bool,
  pub image: Option<ImageDetail>,
}

impl CandidateRecord {
  pub fn new_text(
    id: CandidateId,
    node: DomNodeId,
    rect: Rect,
    frame_index: FrameIndex,
  ) -> Self {
    Self {
      id,
      node,
      kind: CandidateKind::Text,
      recorded_area: rect.pixel_area(),
      frame_rect: rect,
      frame_index,
      paint_time: None,
      loaded: true,
      sufficiently_loaded: true,
      soft_nav_context: None,
      tracked_for_lcp: false,
      image: None,
    }
  }

  pub fn new_image(
    id: CandidateId,
    node: DomNodeId,
    rect: Rect,
    frame_index: FrameIndex,
    detail: ImageDetail,
  ) -> Self {
    Self {
      id,
      node,
      kind: CandidateKind::Image,
      recorded_area: rect.pixel_area(),
      frame_rect: rect,
      frame_index,
      paint_time: None,
      loaded: false,
      sufficiently_loaded: false,
      soft_nav_context: None,
      tracked_for_lcp: false,
      image: Some(detail),
    }
  }

  pub fn has_resolved_paint(&self) -> bool {
    self.paint_time.is_some()
  }

  /// Whether this record may compete for largest-candidate leadership.
  ///
  /// Zero-area records exist for bookkeeping only. Images additionally need
  /// sufficient loading and enough entropy to count as content.
  pub fn is_candidate_eligible(&self) -> bool {
    if self.recorded_area == 0 {
      return false;
    }
    match self.kind {
      CandidateKind::Text => true,
      CandidateKind::Image => {
        self.sufficiently_loaded
          && self
            .image
            .map(|detail| detail.entropy_bpp >= MIN_IMAGE_ENTROPY_BPP)
            .unwrap_or(false)
      }
    }
  }

  pub fn summary(&self) -> CandidateSummary {
    CandidateSummary {
      id: self.id,
      node: self.node,
      kind: self.kind,
      area: self.recorded_area,
      paint_time: self.paint_time,
      frame_rect: self.frame_rect,
      frame_index: self.frame_index,
    }
  }
}

/// Snapshot of a record at the moment it became (or challenged) a leader.
///
/// This is the shape handed to embedders through queries and change
/// notifications; it never references back into the store.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CandidateSummary {
  pub id: CandidateId,
  pub node: DomNodeId,
  pub kind: CandidateKind,
  pub area: u64,
  pub paint_time: Option<Timestamp>,
  pub frame_rect: Rect,
  pub frame_index: FrameIndex,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn image_record(area_side: f32, entropy: f64) -> CandidateRecord {
    let node = DomNodeId(1);
    CandidateRecord::new_image(
      CandidateId::for_image(node, "img.png"),
      node,
      Rect::from_xywh(0.0, 0.0, area_side, area_side),
      FrameIndex::ZERO,
      ImageDetail {
        entropy_bpp: entropy,
        high_priority: false,
        first_animated_frame: false,
      },
    )
  }

  #[test]
  fn text_is_eligible_once_area_is_nonzero() {
    let node = DomNodeId(2);
    let rec = CandidateRecord::new_text(
      CandidateId::for_text(node),
      node,
      Rect::from_xywh(0.0, 0.0, 10.0, 10.0),
      FrameIndex::ZERO,
    );
    assert!(rec.is_candidate_eligible());

    let empty = CandidateRecord::new_text(
      CandidateId::for_text(node),
      node,
      Rect::ZERO,
      FrameIndex::ZERO,
    );
    assert!(!empty.is_candidate_eligible());
  }

  #[test]
  fn image_needs_sufficient_load() {
    let mut rec = image_record(10.0, 1.0);
    assert!(!rec.is_candidate_eligible());
    rec.loaded = true;
    rec.sufficiently_loaded = true;
    assert!(rec.is_candidate_eligible());
  }

  #[test]
  fn low_entropy_image_is_never_eligible() {
    let mut rec = image_record(100.0, 0.01);
    rec.loaded = true;
    rec.sufficiently_loaded = true;
    assert!(!rec.is_candidate_eligible());
  }
}
