//! The paint-timing detector facade
//!
//! Wires the record store, attribution tracker, heuristics orchestrator, and
//! the global LCP calculator behind the narrow interface the embedder's
//! pipelines call into: DOM mutation, pre-paint walk, paint observation,
//! presentation feedback, event scopes, and navigation/input notifications.
//! Everything runs on the rendering thread; the only asynchrony is temporal
//! (queued records waiting for presentation timestamps), so there is no
//! locking anywhere.

use crate::attribution::AttributionMode;
use crate::attribution::AttributionTracker;
use crate::attribution::ContextId;
use crate::attribution::PrepaintLeaf;
use crate::attribution::Propagation;
use crate::attribution::PropagatedState;
use crate::dom::CandidateId;
use crate::dom::DomNodeId;
use crate::error::Error;
use crate::error::Result;
use crate::geometry::Point;
use crate::geometry::Rect;
use crate::geometry::Size;
use crate::heuristics::orchestrator::REQUIRED_PAINT_AREA_FRACTION;
use crate::heuristics::EventScopeType;
use crate::heuristics::ScopeToken;
use crate::heuristics::SoftNavigationEntry;
use crate::heuristics::SoftNavigationHeuristics;
use crate::metrics::TimingMetrics;
use crate::records::lcp::LcpCalculator;
use crate::records::lcp::LcpCandidate;
use crate::records::record::CandidateSummary;
use crate::records::record::ImageDetail;
use crate::records::store::CandidateInterest;
use crate::records::store::RecordOutcome;
use crate::records::store::RecordStore;
use crate::timing::FrameIndex;
use crate::timing::MonotonicClock;
use crate::timing::PaintTimingInfo;
use crate::timing::SystemClock;
use crate::timing::Timestamp;
use log::trace;
use log::warn;
use rustc_hash::FxHashSet;
use url::Url;

/// Receives the subsystem's outbound change notifications.
///
/// Both callbacks default to no-ops so embedders can observe only what they
/// care about.
pub trait TimingObserver {
  fn lcp_candidate_changed(&mut self, _candidate: &LcpCandidate) {}
  fn soft_navigation_detected(&mut self, _entry: &SoftNavigationEntry) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl TimingObserver for NoopObserver {}

/// Construction options.
pub struct DetectorOptions {
  pub viewport: Size,
  pub attribution_mode: AttributionMode,
}

impl Default for DetectorOptions {
  fn default() -> Self {
    Self {
      viewport: Size::ZERO,
      attribution_mode: AttributionMode::Direct,
    }
  }
}

/// The paint-timing candidate tracker and soft-navigation attribution engine
/// for one document.
pub struct PaintTimingDetector {
  store: RecordStore,
  tracker: AttributionTracker,
  heuristics: SoftNavigationHeuristics,
  global_lcp: LcpCalculator,
  observer: Box<dyn TimingObserver>,
  clock: Box<dyn MonotonicClock>,
  current_frame: FrameIndex,
  viewport: Size,
  element_timing: FxHashSet<DomNodeId>,
  /// Global LCP stops accepting new candidates at the first input or
  /// scroll; records created before that still resolve.
  lcp_tracking_active: bool,
  shut_down: bool,
}

impl PaintTimingDetector {
  pub fn new(options: DetectorOptions, observer: Box<dyn TimingObserver>) -> Self {
    Self::with_clock(options, observer, Box::new(SystemClock::new()))
  }

  /// Like [`PaintTimingDetector::new`] with an explicit clock, so tests can
  /// drive interaction timestamps deterministically.
  pub fn with_clock(
    options: DetectorOptions,
    observer: Box<dyn TimingObserver>,
    clock: Box<dyn MonotonicClock>,
  ) -> Self {
    let mut heuristics = SoftNavigationHeuristics::new(options.attribution_mode);
    heuristics.set_required_paint_area(required_area_for(options.viewport));
    Self {
      store: RecordStore::new(),
      tracker: AttributionTracker::new(),
      heuristics,
      global_lcp: LcpCalculator::new(),
      observer,
      clock,
      current_frame: FrameIndex::ZERO,
      viewport: options.viewport,
      element_timing: FxHashSet::default(),
      lcp_tracking_active: true,
      shut_down: false,
    }
  }

  /// Viewport resizes re-derive the soft-navigation paint threshold.
  pub fn set_viewport_size(&mut self, viewport: Size) {
    self.viewport = viewport;
    self
      .heuristics
      .set_required_paint_area(required_area_for(viewport));
  }

  /// Registers a node for element-timing observation: its paints stay
  /// interesting even when global LCP tracking has stopped.
  pub fn observe_element_timing(&mut self, node: DomNodeId) {
    self.element_timing.insert(node);
  }

  // --- event-dispatch seam -------------------------------------------------

  pub fn on_event_scope_enter(&mut self, scope_type: EventScopeType) -> ScopeToken {
    self.heuristics.on_event_scope_enter(scope_type)
  }

  pub fn on_event_scope_exit(&mut self, token: ScopeToken) -> Result<()> {
    let now = self.clock.now();
    self.heuristics.on_event_scope_exit(token, now)?;
    self.sweep();
    Ok(())
  }

  /// Scheduler seam: which context the upcoming callbacks run on behalf of.
  pub fn set_task_context(&mut self, context: Option<ContextId>) {
    self.heuristics.set_task_context(context);
  }

  // --- document-mutation seam ----------------------------------------------

  /// A node was modified under the current unit of work. Returns whether the
  /// modification was attributed to a context.
  pub fn on_dom_modified(&mut self, node: DomNodeId) -> bool {
    if self.shut_down {
      return false;
    }
    self.heuristics.on_dom_modified(node, &mut self.tracker)
  }

  /// A node was inserted. Attribution-wise an insertion is a modification of
  /// the inserted node; the container is only logged.
  pub fn on_node_inserted(&mut self, node: DomNodeId, container: Option<DomNodeId>) -> bool {
    trace!("insert {} into {:?}", node, container);
    self.on_dom_modified(node)
  }

  /// Render-node teardown. Records and attribution entries for the node
  /// become unresolvable; queries simply return absent from here on.
  pub fn on_node_destroyed(&mut self, node: DomNodeId) {
    self.store.remove_node(node);
    self.tracker.remove_node(node);
    self.element_timing.remove(&node);
    self.sweep();
  }

  // --- rendering-pass seam -------------------------------------------------

  /// Starts a rendering pass: advances the frame counter and closes the
  /// attribution marking batch.
  pub fn begin_rendering_pass(&mut self) -> FrameIndex {
    self.current_frame = self.current_frame.next();
    self.tracker.begin_prepaint_walk();
    self.current_frame
  }

  /// One step of the pre-paint walk; see
  /// [`AttributionTracker::update_on_prepaint`].
  pub fn on_prepaint_node(
    &mut self,
    node: DomNodeId,
    inherited: Option<PropagatedState>,
    leaf: Option<PrepaintLeaf>,
  ) -> Propagation {
    self.tracker.update_on_prepaint(node, inherited, leaf)
  }

  /// The paint pipeline painted a text block aggregated under `block_root`.
  /// Returns whether this created a newly tracked candidate.
  pub fn record_text_candidate(&mut self, block_root: DomNodeId, visual_rect: Rect) -> bool {
    if self.shut_down {
      return false;
    }
    let clipped = self.clip_to_viewport(visual_rect);
    let interest = self.interest_for(block_root);
    let outcome = self
      .store
      .record_text(block_root, clipped, self.current_frame, interest);
    self.attribute_paint(&outcome, interest, block_root);
    matches!(outcome, RecordOutcome::Created(_))
  }

  /// The paint pipeline painted an image into `node` from `media_source`.
  /// Returns whether this created a newly tracked candidate.
  pub fn record_image_candidate(
    &mut self,
    node: DomNodeId,
    media_source: &str,
    intrinsic_size: Size,
    visual_rect: Rect,
    entropy_bpp: f64,
    high_priority: bool,
  ) -> bool {
    if self.shut_down {
      return false;
    }
    let clipped = self.clip_to_viewport(visual_rect);
    let interest = self.interest_for(node);
    let detail = ImageDetail {
      entropy_bpp,
      high_priority,
      first_animated_frame: false,
    };
    let outcome = self.store.record_image(
      node,
      media_source,
      clipped,
      intrinsic_size,
      self.current_frame,
      detail,
      interest,
    );
    self.attribute_paint(&outcome, interest, node);
    matches!(outcome, RecordOutcome::Created(_))
  }

  /// The image pipeline finished (sufficiently) loading a tracked image.
  pub fn mark_image_loaded(&mut self, node: DomNodeId, media_source: &str, sufficiently: bool) -> bool {
    let id = CandidateId::for_image(node, media_source);
    self.store.mark_loaded(id, sufficiently, self.current_frame)
  }

  /// Ends the rendering pass: contexts re-check graduation against any newly
  /// attributed area, and exhausted contexts are collected.
  pub fn finish_rendering_pass(&mut self) {
    self.heuristics.on_paint_finished();
    self.sweep();
  }

  // --- presentation seam ---------------------------------------------------

  /// The compositor reports the time `frame_index` became visible. Resolves
  /// queued records in enqueue order, feeds context first-contentful-paint
  /// and LCP state, and emits any completed soft navigation.
  pub fn resolve_presentation_time(
    &mut self,
    frame_index: FrameIndex,
    timestamp: Timestamp,
    _info: PaintTimingInfo,
  ) -> Result<()> {
    if self.shut_down {
      return Err(Error::ShutDown);
    }
    if frame_index > self.current_frame {
      return Err(Error::UnknownFrameIndex(frame_index.0));
    }
    let resolved = self.store.resolve_presentation_time(frame_index, timestamp);
    for summary in &resolved {
      self.route_presented(summary);
    }
    if !resolved.is_empty() {
      self.notify_global_lcp();
      self.sweep();
    }
    Ok(())
  }

  /// An animated image's first frame presented; its timestamp arrives from
  /// the media pipeline, not the presentation queue.
  pub fn resolve_first_animated_frame(
    &mut self,
    node: DomNodeId,
    media_source: &str,
    timestamp: Timestamp,
  ) -> bool {
    if self.shut_down {
      return false;
    }
    let id = CandidateId::for_image(node, media_source);
    let Some(summary) = self.store.resolve_first_animated_frame(id, timestamp) else {
      return false;
    };
    self.route_presented(&summary);
    self.notify_global_lcp();
    true
  }

  // --- navigation and input seams ------------------------------------------

  pub fn on_same_document_url_change(&mut self, url: Url, context_hint: Option<ContextId>) {
    if self.shut_down {
      return;
    }
    self.heuristics.on_same_document_url_change(url, context_hint);
  }

  /// First input or scroll ends global LCP tracking and freezes paint-area
  /// accumulation in every context not owned by an open scope.
  pub fn on_input_or_scroll(&mut self) {
    if self.shut_down {
      return;
    }
    self.lcp_tracking_active = false;
    let now = self.clock.now();
    self.heuristics.on_input_or_scroll(now);
  }

  /// Document teardown. Every live context finalizes as if exhausted, and
  /// queued-but-unresolved records are dropped without callbacks.
  pub fn shutdown(&mut self) {
    if self.shut_down {
      return;
    }
    self.store.drop_in_flight();
    self.heuristics.shutdown();
    self.shut_down = true;
  }

  // --- query surface -------------------------------------------------------

  /// The current cross-kind largest contentful paint, reported
  /// optimistically: a strictly larger measurement still awaiting its
  /// timestamp outranks a smaller resolved one.
  pub fn largest_contentful_paint(&self) -> Option<CandidateSummary> {
    self.store.largest_overall()
  }

  /// The last LCP actually reported through the observer (resolved
  /// candidates only, monotonic within an epoch).
  pub fn reported_lcp(&self) -> Option<&LcpCandidate> {
    self.global_lcp.latest()
  }

  pub fn soft_navigation_count(&self) -> u32 {
    self.heuristics.soft_navigation_count()
  }

  pub fn is_attributable(&self, node: DomNodeId, context: ContextId) -> bool {
    self.tracker.is_attributable(node, context)
  }

  /// The context-scoped LCP of one live interaction context.
  pub fn context_lcp(&self, context: ContextId) -> Option<LcpCandidate> {
    self.heuristics.context_lcp(context)
  }

  pub fn metrics(&self) -> &TimingMetrics {
    self.heuristics.metrics()
  }

  pub fn current_frame(&self) -> FrameIndex {
    self.current_frame
  }

  // --- internals -----------------------------------------------------------

  fn clip_to_viewport(&self, rect: Rect) -> Rect {
    if self.viewport.is_empty() {
      return rect;
    }
    rect
      .intersection(Rect::new(Point::ZERO, self.viewport))
      .unwrap_or(Rect::ZERO)
  }

  fn interest_for(&self, node: DomNodeId) -> CandidateInterest {
    let soft_nav_context = self
      .tracker
      .attributed_context(node)
      .filter(|id| self.heuristics.is_live(*id));
    CandidateInterest {
      global_lcp: self.lcp_tracking_active,
      element_timing: self.element_timing.contains(&node),
      soft_nav_context,
    }
  }

  fn attribute_paint(
    &mut self,
    outcome: &RecordOutcome,
    interest: CandidateInterest,
    node: DomNodeId,
  ) {
    let (Some(id), Some(context)) = (outcome.id(), interest.soft_nav_context) else {
      return;
    };
    let Some(area) = self.store.get(id).map(|record| record.recorded_area) else {
      return;
    };
    self.heuristics.on_painted_area(context, node, area);
  }

  fn route_presented(&mut self, summary: &CandidateSummary) {
    let Some(record) = self.store.get(summary.id) else {
      return;
    };
    let context = record.soft_nav_context;
    let detail = record.image;
    let Some(context) = context else {
      return;
    };
    if let Some(entry) = self
      .heuristics
      .on_attributed_paint_presented(context, summary, detail)
    {
      self.observer.soft_navigation_detected(&entry);
      // A detected navigation opens a new epoch: the LCP floor resets and
      // the candidate race restarts for post-navigation paints.
      self.global_lcp.advance_epoch();
      self.store.reset_largest_trackers();
    }
  }

  fn notify_global_lcp(&mut self) {
    if let Some(text) = self.store.authoritative_text().copied() {
      if let Some(paint_time) = text.paint_time {
        if self
          .global_lcp
          .notify_if_text_candidate_changed(paint_time, text.area)
        {
          if let Some(latest) = self.global_lcp.latest() {
            self.observer.lcp_candidate_changed(latest);
          }
        }
      }
    }
    if let Some(image) = self.store.authoritative_image().copied() {
      if let Some(paint_time) = image.paint_time {
        let detail = self.store.get(image.id).and_then(|record| record.image);
        let (entropy_bpp, high_priority) = match detail {
          Some(detail) => (detail.entropy_bpp, detail.high_priority),
          // Record torn down after resolution; the snapshot still counts.
          None => (MIN_ENTROPY_FALLBACK, false),
        };
        if self.global_lcp.notify_if_image_candidate_changed(
          paint_time,
          image.area,
          &image,
          entropy_bpp,
          high_priority,
        ) {
          if let Some(latest) = self.global_lcp.latest() {
            self.observer.lcp_candidate_changed(latest);
          }
        }
      }
    }
  }

  fn sweep(&mut self) {
    let store = &self.store;
    let tracker = &self.tracker;
    self
      .heuristics
      .sweep(|id| store.references_context(id) || tracker.references_context(id));
  }
}

/// Entropy stand-in when a leader's record was purged before notification.
const MIN_ENTROPY_FALLBACK: f64 = crate::records::record::MIN_IMAGE_ENTROPY_BPP;

fn required_area_for(viewport: Size) -> u64 {
  let area = viewport.pixel_area();
  if area == 0 {
    warn!("viewport unset; soft-navigation paint criterion defaults to zero");
    return 0;
  }
  (area as f64 * REQUIRED_PAINT_AREA_FRACTION).ceil() as u64
}
