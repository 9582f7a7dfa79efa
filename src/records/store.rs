//! Record store and presentation-queue resolution
//!
//! Owns every candidate record plus the FIFO queue of records awaiting their
//! presentation timestamp. The paint pipeline reports candidates as it paints
//! them; the compositor reports the real visible time per frame index later.
//! Entries resolve strictly in enqueue order — the queue never drains past
//! the first entry whose frame has not presented yet, which preserves the
//! temporal order of resolution (frame N callbacks fire no earlier than
//! frame N-1 ones).

use crate::attribution::ContextId;
use crate::dom::CandidateId;
use crate::dom::DomNodeId;
use crate::geometry::Rect;
use crate::geometry::Size;
use crate::records::largest::LargestCandidateTracker;
use crate::records::record::CandidateKind;
use crate::records::record::CandidateRecord;
use crate::records::record::CandidateSummary;
use crate::records::record::ImageDetail;
use crate::timing::FrameIndex;
use crate::timing::Timestamp;
use log::trace;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;

/// Why a candidate is worth tracking at observation time.
///
/// A leaf with no interest at all is remembered as seen-but-uninteresting and
/// never re-evaluated on later paints.
#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateInterest {
  /// Global LCP tracking still wants new candidates.
  pub global_lcp: bool,
  /// The node is registered for element-timing observation.
  pub element_timing: bool,
  /// The node is currently attributable to a live interaction context.
  pub soft_nav_context: Option<ContextId>,
}

impl CandidateInterest {
  pub fn any(&self) -> bool {
    self.global_lcp || self.element_timing || self.soft_nav_context.is_some()
  }
}

/// Result of reporting one candidate paint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
  /// First observation; a record now exists.
  Created(CandidateId),
  /// Repaint of a known identity; the record was updated in place.
  Updated(CandidateId),
  /// Zero-area or interest-free leaf; remembered so it is never re-evaluated.
  Ignored,
}

impl RecordOutcome {
  pub fn id(&self) -> Option<CandidateId> {
    match self {
      RecordOutcome::Created(id) | RecordOutcome::Updated(id) => Some(*id),
      RecordOutcome::Ignored => None,
    }
  }
}

#[derive(Debug, Clone, Copy)]
struct QueueEntry {
  id: CandidateId,
  frame_index: FrameIndex,
}

/// Candidate records, keyed by identity, plus per-kind largest trackers.
pub struct RecordStore {
  records: FxHashMap<CandidateId, CandidateRecord>,
  /// Every identity ever minted for a node, interesting or not, so teardown
  /// can purge both maps.
  by_node: FxHashMap<DomNodeId, Vec<CandidateId>>,
  seen_uninteresting: FxHashSet<CandidateId>,
  queue: VecDeque<QueueEntry>,
  image_tracker: LargestCandidateTracker,
  text_tracker: LargestCandidateTracker,
}

impl RecordStore {
  pub fn new() -> Self {
    Self {
      records: FxHashMap::default(),
      by_node: FxHashMap::default(),
      seen_uninteresting: FxHashSet::default(),
      queue: VecDeque::new(),
      image_tracker: LargestCandidateTracker::new(),
      text_tracker: LargestCandidateTracker::new(),
    }
  }

  /// Reports a painted text block aggregated under `block_root`.
  ///
  /// Text is born loaded, so a newly created record queues for timestamp
  /// resolution immediately.
  pub fn record_text(
    &mut self,
    block_root: DomNodeId,
    rect: Rect,
    frame_index: FrameIndex,
    interest: CandidateInterest,
  ) -> RecordOutcome {
    let id = CandidateId::for_text(block_root);
    if self.seen_uninteresting.contains(&id) {
      return RecordOutcome::Ignored;
    }
    if let Some(record) = self.records.get_mut(&id) {
      let area = rect.pixel_area();
      Self::update_in_place(record, rect, area, frame_index, interest);
      return RecordOutcome::Updated(id);
    }
    if rect.pixel_area() == 0 || !interest.any() {
      self.remember_uninteresting(block_root, id);
      return RecordOutcome::Ignored;
    }
    let mut record = CandidateRecord::new_text(id, block_root, rect, frame_index);
    record.soft_nav_context = interest.soft_nav_context;
    record.tracked_for_lcp = interest.global_lcp;
    self.insert_record(record);
    self.queue_for_timestamp_resolution(id, frame_index);
    RecordOutcome::Created(id)
  }

  /// Reports a painted image. Images queue when they become sufficiently
  /// loaded, not at first observation. The recorded area is capped at the
  /// image's intrinsic area so an upscaled thumbnail cannot dominate the
  /// candidate race (pass [`Size::ZERO`] when the intrinsic size is
  /// unknown).
  pub fn record_image(
    &mut self,
    node: DomNodeId,
    media_source: &str,
    rect: Rect,
    intrinsic_size: Size,
    frame_index: FrameIndex,
    detail: ImageDetail,
    interest: CandidateInterest,
  ) -> RecordOutcome {
    let id = CandidateId::for_image(node, media_source);
    if self.seen_uninteresting.contains(&id) {
      return RecordOutcome::Ignored;
    }
    let area = Self::capped_area(rect, intrinsic_size);
    if let Some(record) = self.records.get_mut(&id) {
      Self::update_in_place(record, rect, area, frame_index, interest);
      return RecordOutcome::Updated(id);
    }
    if area == 0 || !interest.any() {
      self.remember_uninteresting(node, id);
      return RecordOutcome::Ignored;
    }
    let mut record = CandidateRecord::new_image(id, node, rect, frame_index, detail);
    record.recorded_area = area;
    record.soft_nav_context = interest.soft_nav_context;
    record.tracked_for_lcp = interest.global_lcp;
    self.insert_record(record);
    RecordOutcome::Created(id)
  }

  pub fn get(&self, id: CandidateId) -> Option<&CandidateRecord> {
    self.records.get(&id)
  }

  /// Marks an image as loaded. A loaded image with visible area queues for
  /// timestamp resolution against the frame that painted it (candidate
  /// eligibility gates the largest race, not the queue: soft-navigation
  /// first-paint measurement needs presentation times for every attributed
  /// paint). Returns whether it was queued.
  pub fn mark_loaded(
    &mut self,
    id: CandidateId,
    sufficiently: bool,
    frame_index: FrameIndex,
  ) -> bool {
    let Some(record) = self.records.get_mut(&id) else {
      return false;
    };
    record.loaded = true;
    record.sufficiently_loaded = sufficiently;
    if record.paint_time.is_some() || record.recorded_area == 0 {
      return false;
    }
    record.frame_index = frame_index;
    self.queue_for_timestamp_resolution(id, frame_index);
    true
  }

  /// Appends a record to the resolution queue and lets it challenge the
  /// pending leader of its kind.
  pub fn queue_for_timestamp_resolution(&mut self, id: CandidateId, frame_index: FrameIndex) {
    let Some(record) = self.records.get(&id) else {
      return;
    };
    let races = record.is_candidate_eligible() && record.tracked_for_lcp;
    let summary = races.then(|| record.summary());
    let kind = record.kind;
    self.queue.push_back(QueueEntry { id, frame_index });
    if let Some(summary) = summary {
      self.tracker_mut(kind).offer_pending(summary);
    }
    trace!("queued {} for frame {:?}", id, frame_index);
  }

  /// Delivers the presentation timestamp for `frame_index` (and implicitly
  /// any earlier frame). Drains the queue front-to-back, stopping at the
  /// first entry whose frame has not presented; already-resolved records and
  /// records whose node has been torn down are skipped idempotently.
  ///
  /// Returns the records that newly resolved, in enqueue order.
  pub fn resolve_presentation_time(
    &mut self,
    frame_index: FrameIndex,
    timestamp: Timestamp,
  ) -> Vec<CandidateSummary> {
    let mut resolved = Vec::new();
    while let Some(entry) = self.queue.front().copied() {
      if entry.frame_index > frame_index {
        break;
      }
      self.queue.pop_front();
      let Some(record) = self.records.get_mut(&entry.id) else {
        continue;
      };
      if record.paint_time.is_some() {
        continue;
      }
      record.paint_time = Some(timestamp);
      let summary = record.summary();
      if record.is_candidate_eligible() && record.tracked_for_lcp {
        let kind = record.kind;
        self.tracker_mut(kind).offer_painted(summary);
      }
      resolved.push(summary);
    }
    resolved
  }

  /// Resolves an animated image's first-frame timestamp out of band, straight
  /// from the media pipeline. Bypasses the presentation queue entirely; any
  /// stale queue entry for the record is later skipped as already resolved.
  pub fn resolve_first_animated_frame(
    &mut self,
    id: CandidateId,
    timestamp: Timestamp,
  ) -> Option<CandidateSummary> {
    let record = self.records.get_mut(&id)?;
    if record.paint_time.is_some() {
      return None;
    }
    record.paint_time = Some(timestamp);
    if let Some(detail) = record.image.as_mut() {
      detail.first_animated_frame = true;
    }
    let summary = record.summary();
    if record.is_candidate_eligible() && record.tracked_for_lcp {
      let kind = record.kind;
      self.tracker_mut(kind).offer_painted(summary);
    }
    Some(summary)
  }

  /// Purges everything owned by a torn-down node. Queue entries are left in
  /// place; the drain skips entries whose record no longer exists. Leader
  /// snapshots are value copies and stay valid.
  pub fn remove_node(&mut self, node: DomNodeId) -> usize {
    let Some(ids) = self.by_node.remove(&node) else {
      return 0;
    };
    let mut purged = 0;
    for id in ids {
      if self.records.remove(&id).is_some() {
        purged += 1;
      }
      self.seen_uninteresting.remove(&id);
    }
    purged
  }

  pub fn largest_text(&self) -> Option<&CandidateSummary> {
    self.text_tracker.current()
  }

  pub fn largest_image(&self) -> Option<&CandidateSummary> {
    self.image_tracker.current()
  }

  /// Optimistic cross-kind largest: an unresolved-but-larger measurement
  /// outranks a resolved smaller one. An image outranks text only on strict
  /// increase.
  pub fn largest_overall(&self) -> Option<CandidateSummary> {
    match (self.largest_image(), self.largest_text()) {
      (Some(image), Some(text)) => {
        if image.area > text.area {
          Some(*image)
        } else {
          Some(*text)
        }
      }
      (Some(image), None) => Some(*image),
      (None, text) => text.copied(),
    }
  }

  pub fn authoritative_text(&self) -> Option<&CandidateSummary> {
    self.text_tracker.authoritative()
  }

  pub fn authoritative_image(&self) -> Option<&CandidateSummary> {
    self.image_tracker.authoritative()
  }

  /// Shutdown: queued-but-unresolved measurements are dropped, not retried.
  pub fn drop_in_flight(&mut self) {
    self.queue.clear();
    self.image_tracker.drop_pending();
    self.text_tracker.drop_pending();
  }

  /// Restarts the candidate race after a detected navigation. Existing
  /// records keep their paint times but no longer hold leadership; paints
  /// from the new epoch compete fresh.
  pub fn reset_largest_trackers(&mut self) {
    self.image_tracker = LargestCandidateTracker::new();
    self.text_tracker = LargestCandidateTracker::new();
  }

  /// Whether any record is still attributed to `context`. Feeds the
  /// exhaustion sweep.
  pub fn references_context(&self, context: ContextId) -> bool {
    self
      .records
      .values()
      .any(|record| record.soft_nav_context == Some(context))
  }

  pub fn record_count(&self) -> usize {
    self.records.len()
  }

  pub fn queue_len(&self) -> usize {
    self.queue.len()
  }

  fn tracker_mut(&mut self, kind: CandidateKind) -> &mut LargestCandidateTracker {
    match kind {
      CandidateKind::Image => &mut self.image_tracker,
      CandidateKind::Text => &mut self.text_tracker,
    }
  }

  fn insert_record(&mut self, record: CandidateRecord) {
    self.by_node.entry(record.node).or_default().push(record.id);
    self.records.insert(record.id, record);
  }

  fn remember_uninteresting(&mut self, node: DomNodeId, id: CandidateId) {
    self.by_node.entry(node).or_default().push(id);
    self.seen_uninteresting.insert(id);
  }

  fn update_in_place(
    record: &mut CandidateRecord,
    rect: Rect,
    area: u64,
    frame_index: FrameIndex,
    interest: CandidateInterest,
  ) {
    record.recorded_area = area;
    record.frame_rect = rect;
    record.frame_index = frame_index;
    // Attribution may change across repaints.
    record.soft_nav_context = interest.soft_nav_context;
  }

  fn capped_area(rect: Rect, intrinsic_size: Size) -> u64 {
    let painted = rect.pixel_area();
    let intrinsic = intrinsic_size.pixel_area();
    if intrinsic == 0 {
      painted
    } else {
      painted.min(intrinsic)
    }
  }
}

impl Default for RecordStore {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lcp_interest() -> CandidateInterest {
    CandidateInterest {
      global_lcp: true,
      ..Default::default()
    }
  }

  fn detail() -> ImageDetail {
    ImageDetail {
      entropy_bpp: 2.0,
      high_priority: false,
      first_animated_frame: false,
    }
  }

  fn rect(side: f32) -> Rect {
    Rect::from_xywh(0.0, 0.0, side, side)
  }

  #[test]
  fn text_records_once_per_identity() {
    let mut store = RecordStore::new();
    let root = DomNodeId(1);
    let first = store.record_text(root, rect(10.0), FrameIndex(0), lcp_interest());
    assert!(matches!(first, RecordOutcome::Created(_)));
    let second = store.record_text(root, rect(20.0), FrameIndex(1), lcp_interest());
    assert!(matches!(second, RecordOutcome::Updated(_)));
    assert_eq!(store.record_count(), 1);
    // The repaint updated the measurement in place.
    assert_eq!(store.get(first.id().unwrap()).unwrap().recorded_area, 400);
  }

  #[test]
  fn interest_free_leaves_are_never_reevaluated() {
    let mut store = RecordStore::new();
    let root = DomNodeId(1);
    let outcome = store.record_text(root, rect(10.0), FrameIndex(0), CandidateInterest::default());
    assert_eq!(outcome, RecordOutcome::Ignored);
    // Later paints with interest restored still ignore the identity.
    let outcome = store.record_text(root, rect(10.0), FrameIndex(1), lcp_interest());
    assert_eq!(outcome, RecordOutcome::Ignored);
    assert_eq!(store.record_count(), 0);
  }

  #[test]
  fn resolution_is_fifo_and_stops_at_future_frames() {
    let mut store = RecordStore::new();
    store.record_text(DomNodeId(1), rect(10.0), FrameIndex(0), lcp_interest());
    store.record_text(DomNodeId(2), rect(20.0), FrameIndex(1), lcp_interest());
    store.record_text(DomNodeId(3), rect(30.0), FrameIndex(2), lcp_interest());

    let resolved = store.resolve_presentation_time(FrameIndex(1), Timestamp::from_millis(16.0));
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0].node, DomNodeId(1));
    assert_eq!(resolved[1].node, DomNodeId(2));
    assert_eq!(store.queue_len(), 1);

    // A later callback picks up the remainder.
    let resolved = store.resolve_presentation_time(FrameIndex(2), Timestamp::from_millis(32.0));
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].node, DomNodeId(3));
  }

  #[test]
  fn stale_callback_is_an_idempotent_noop() {
    let mut store = RecordStore::new();
    store.record_text(DomNodeId(1), rect(10.0), FrameIndex(0), lcp_interest());
    let first = store.resolve_presentation_time(FrameIndex(0), Timestamp::from_millis(16.0));
    assert_eq!(first.len(), 1);
    let again = store.resolve_presentation_time(FrameIndex(0), Timestamp::from_millis(99.0));
    assert!(again.is_empty());
    let record = store.get(first[0].id).unwrap();
    assert_eq!(record.paint_time, Some(Timestamp::from_millis(16.0)));
  }

  #[test]
  fn images_queue_only_once_sufficiently_loaded() {
    let mut store = RecordStore::new();
    let node = DomNodeId(1);
    let outcome = store.record_image(node, "hero.jpg", rect(50.0), Size::ZERO, FrameIndex(0), detail(), lcp_interest());
    let id = outcome.id().unwrap();
    assert_eq!(store.queue_len(), 0);

    assert!(store.mark_loaded(id, true, FrameIndex(1)));
    assert_eq!(store.queue_len(), 1);
    let resolved = store.resolve_presentation_time(FrameIndex(1), Timestamp::from_millis(20.0));
    assert_eq!(resolved.len(), 1);
    assert_eq!(store.largest_image().unwrap().area, 2500);
  }

  #[test]
  fn animated_first_frame_bypasses_the_queue() {
    let mut store = RecordStore::new();
    let node = DomNodeId(1);
    let id = store
      .record_image(node, "anim.webp", rect(40.0), Size::ZERO, FrameIndex(0), detail(), lcp_interest())
      .id()
      .unwrap();
    store.mark_loaded(id, true, FrameIndex(0));

    let summary = store
      .resolve_first_animated_frame(id, Timestamp::from_millis(8.0))
      .unwrap();
    assert_eq!(summary.paint_time, Some(Timestamp::from_millis(8.0)));

    // The stale queue entry is skipped without touching the timestamp.
    let resolved = store.resolve_presentation_time(FrameIndex(0), Timestamp::from_millis(16.0));
    assert!(resolved.is_empty());
    assert_eq!(store.get(id).unwrap().paint_time, Some(Timestamp::from_millis(8.0)));
  }

  #[test]
  fn removed_nodes_become_unresolvable_not_crashes() {
    let mut store = RecordStore::new();
    let node = DomNodeId(1);
    let id = store
      .record_text(node, rect(10.0), FrameIndex(0), lcp_interest())
      .id()
      .unwrap();
    assert_eq!(store.remove_node(node), 1);
    assert!(store.get(id).is_none());
    // The queued entry resolves to nothing, silently.
    let resolved = store.resolve_presentation_time(FrameIndex(0), Timestamp::from_millis(16.0));
    assert!(resolved.is_empty());
  }

  #[test]
  fn optimistic_largest_prefers_bigger_pending() {
    let mut store = RecordStore::new();
    // Text 300, resolved.
    store.record_text(DomNodeId(1), Rect::from_xywh(0.0, 0.0, 30.0, 10.0), FrameIndex(0), lcp_interest());
    store.resolve_presentation_time(FrameIndex(0), Timestamp::from_millis(16.0));
    // Image 500, loaded therefore queued, not yet resolved.
    let id = store
      .record_image(DomNodeId(2), "big.png", Rect::from_xywh(0.0, 0.0, 25.0, 20.0), Size::ZERO, FrameIndex(1), detail(), lcp_interest())
      .id()
      .unwrap();
    store.mark_loaded(id, true, FrameIndex(1));

    assert_eq!(store.largest_overall().unwrap().area, 500);

    // Shutdown drops the in-flight image; text 300 becomes final.
    store.drop_in_flight();
    assert_eq!(store.largest_overall().unwrap().area, 300);
  }
}
