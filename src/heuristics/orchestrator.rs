//! Soft-navigation heuristics
//!
//! Owns the set of live interaction contexts and decides, from interaction
//! timestamps, attributed DOM-mutation counts, and attributed paint area,
//! whether and when a context graduates into an emitted soft navigation.
//! Never blocks and never errors out of normal operation: a context that
//! fails to graduate simply finalizes into a diagnostic outcome when nothing
//! references it anymore.

use crate::attribution::AttributionMode;
use crate::attribution::AttributionTracker;
use crate::attribution::ContextId;
use crate::attribution::InteractionContext;
use crate::dom::DomNodeId;
use crate::error::Result;
use crate::heuristics::scope::EventScopeType;
use crate::heuristics::scope::ScopeStack;
use crate::heuristics::scope::ScopeToken;
use crate::metrics::TimingMetrics;
use crate::records::record::CandidateKind;
use crate::records::record::CandidateSummary;
use crate::records::record::ImageDetail;
use crate::timing::Timestamp;
use log::debug;
use log::trace;
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use url::Url;
use uuid::Uuid;

/// Fraction of the viewport that must repaint, attributed to one context,
/// before the paint criterion is met.
pub const REQUIRED_PAINT_AREA_FRACTION: f64 = 0.02;

/// An emitted soft navigation.
#[derive(Debug, Clone, Serialize)]
pub struct SoftNavigationEntry {
  pub navigation_id: Uuid,
  pub context_id: ContextId,
  pub interaction_timestamp: Timestamp,
  pub first_contentful_paint: Timestamp,
  pub url: Url,
}

type SharedContext = Rc<RefCell<InteractionContext>>;

/// The heuristics state machine over live interaction contexts.
pub struct SoftNavigationHeuristics {
  /// Registry of live contexts. Holds exactly one strong handle per
  /// context; every other holder (active slot, awaiting list, URL owner)
  /// keeps a clone, so `Rc::strong_count == 1` means exhausted.
  contexts: Vec<SharedContext>,
  /// Context of the currently active interaction, if any.
  active: Option<SharedContext>,
  /// Context the currently running task is attributed to, when no event
  /// scope is open (async continuations of an earlier interaction).
  task_context: Option<ContextId>,
  scopes: ScopeStack,
  /// Graduated contexts whose first contentful paint has not presented yet.
  /// Each receives its own first-paint callback independently.
  awaiting_first_paint: Vec<SharedContext>,
  /// Most recently graduated context; owns the document's current URL for
  /// client-side-redirect merging.
  last_graduated: Option<SharedContext>,
  next_context_id: u64,
  mode: AttributionMode,
  required_paint_area: u64,
  soft_navigation_count: u32,
  metrics: TimingMetrics,
}

impl SoftNavigationHeuristics {
  pub fn new(mode: AttributionMode) -> Self {
    Self {
      contexts: Vec::new(),
      active: None,
      task_context: None,
      scopes: ScopeStack::new(),
      awaiting_first_paint: Vec::new(),
      last_graduated: None,
      next_context_id: 1,
      mode,
      required_paint_area: 0,
      soft_navigation_count: 0,
      metrics: TimingMetrics::new(),
    }
  }

  pub fn set_required_paint_area(&mut self, area: u64) {
    self.required_paint_area = area;
  }

  pub fn required_paint_area(&self) -> u64 {
    self.required_paint_area
  }

  pub fn soft_navigation_count(&self) -> u32 {
    self.soft_navigation_count
  }

  pub fn metrics(&self) -> &TimingMetrics {
    &self.metrics
  }

  pub fn live_context_count(&self) -> usize {
    self.contexts.len()
  }

  pub fn is_live(&self, id: ContextId) -> bool {
    self.find(id).is_some()
  }

  /// The context-scoped LCP of a live context, if it has one.
  pub fn context_lcp(&self, id: ContextId) -> Option<crate::records::lcp::LcpCandidate> {
    let ctx = self.find(id)?;
    let lcp = ctx.borrow().lcp().latest().copied();
    lcp
  }

  /// Attributes the currently running unit of work: the open scope's
  /// context, or the task-context slot set by the scheduler seam.
  pub fn current_context(&self) -> Option<SharedContext> {
    if self.scopes.is_open() {
      return self.active.clone();
    }
    self.task_context.and_then(|id| self.find(id))
  }

  /// Scheduler seam: the event-dispatch layer tells us which context the
  /// next callbacks run on behalf of (None when the work is unattributed).
  pub fn set_task_context(&mut self, context: Option<ContextId>) {
    self.task_context = context;
  }

  /// Opens an event scope.
  ///
  /// An outermost scope of an interaction-starting type creates a fresh
  /// context; a continuation type (keypress, keyup) reuses the still-active
  /// one, creating defensively when none survives. Nested scopes always
  /// reuse the enclosing scope's context.
  pub fn on_event_scope_enter(&mut self, scope_type: EventScopeType) -> ScopeToken {
    let token = self.scopes.push(scope_type);
    if token.depth == 0 {
      if scope_type.starts_interaction() || self.active.is_none() {
        let ctx = self.create_context();
        self.active = Some(ctx);
      }
    }
    token
  }

  /// Closes an event scope. On the outermost exit the interaction timestamp
  /// is backfilled, graduation is re-evaluated, and interaction-ending types
  /// clear the active slot (the context itself lives on until exhausted).
  pub fn on_event_scope_exit(&mut self, token: ScopeToken, now: Timestamp) -> Result<()> {
    let outermost = self.scopes.pop(&token)?;
    if !outermost {
      return Ok(());
    }
    if let Some(ctx) = self.active.clone() {
      ctx.borrow_mut().set_interaction_timestamp(now);
      self.try_graduate(&ctx);
      if token.scope_type.ends_interaction() {
        trace!("interaction ended ({:?})", token.scope_type());
        self.active = None;
      }
    }
    Ok(())
  }

  /// A DOM mutation ran under the current unit of work. Marks the node in
  /// the attribution tracker and counts it against the owning context.
  /// Returns whether the mutation was attributable at all.
  pub fn on_dom_modified(&mut self, node: DomNodeId, tracker: &mut AttributionTracker) -> bool {
    let Some(ctx) = self.current_context() else {
      return false;
    };
    let id = ctx.borrow().id();
    tracker.mark_directly_modified(node, id);
    ctx.borrow_mut().add_modified_node(node);
    self.try_graduate(&ctx);
    true
  }

  /// Painted area was observed for a node attributed to `context_id`.
  pub fn on_painted_area(&mut self, context_id: ContextId, node: DomNodeId, area: u64) -> bool {
    let Some(ctx) = self.find(context_id) else {
      return false;
    };
    let result = ctx.borrow_mut().add_painted_area(node, area);
    result
  }

  /// A rendering pass finished; contexts that saw new area re-check
  /// graduation.
  pub fn on_paint_finished(&mut self) {
    let live: Vec<SharedContext> = self.contexts.clone();
    for ctx in live {
      let grew = ctx.borrow_mut().on_paint_finished();
      if grew {
        self.try_graduate(&ctx);
      }
    }
  }

  /// A presentation timestamp resolved for a record attributed to
  /// `context_id`. Feeds the context-scoped LCP calculator and, for a
  /// graduated context still awaiting it, records the first contentful
  /// paint — which completes the soft navigation and emits its entry.
  pub fn on_attributed_paint_presented(
    &mut self,
    context_id: ContextId,
    summary: &CandidateSummary,
    image: Option<ImageDetail>,
  ) -> Option<SoftNavigationEntry> {
    let ctx = self.find(context_id)?;
    let paint_time = summary.paint_time?;
    let mut c = ctx.borrow_mut();
    match summary.kind {
      CandidateKind::Text => {
        c.lcp_mut().notify_if_text_candidate_changed(paint_time, summary.area);
      }
      CandidateKind::Image => {
        if let Some(detail) = image {
          c.lcp_mut().notify_if_image_candidate_changed(
            paint_time,
            summary.area,
            summary,
            detail.entropy_bpp,
            detail.high_priority,
          );
        }
      }
    }

    if !c.has_graduated() || c.first_contentful_paint().is_some() {
      return None;
    }
    drop(c);
    let pos = self
      .awaiting_first_paint
      .iter()
      .position(|waiting| Rc::ptr_eq(waiting, &ctx))?;
    self.awaiting_first_paint.remove(pos);

    let mut c = ctx.borrow_mut();
    c.set_first_contentful_paint(paint_time);
    let entry = SoftNavigationEntry {
      navigation_id: *c.navigation_id()?,
      context_id,
      interaction_timestamp: c.interaction_timestamp()?,
      first_contentful_paint: paint_time,
      url: c.most_recent_url()?.clone(),
    };
    drop(c);
    self.soft_navigation_count += 1;
    debug!(
      "soft navigation {} detected at {}",
      entry.navigation_id, entry.first_contentful_paint
    );
    Some(entry)
  }

  /// Routes a same-document URL change.
  ///
  /// Attributed work attaches the URL to its context. Failing that, a
  /// previously graduated context that owns the current URL absorbs the
  /// change as a client-side redirect instead of fragmenting into a new
  /// candidate. Otherwise the change is unattributable and only counted.
  pub fn on_same_document_url_change(&mut self, url: Url, context_hint: Option<ContextId>) {
    let target = context_hint
      .and_then(|id| self.find(id))
      .or_else(|| self.current_context());
    if let Some(ctx) = target {
      ctx.borrow_mut().set_url(url);
      self.try_graduate(&ctx);
      return;
    }
    if let Some(owner) = self.last_graduated.clone() {
      debug!("client-side redirect folded into {:?}", owner.borrow().id());
      owner.borrow_mut().set_url(url);
      return;
    }
    trace!("same-document URL change with no context");
    self.metrics.record_unattributed_url_change();
  }

  /// Input or scroll: every live context stops accumulating paint area,
  /// except the one owned by a currently-open scope (that input *is* its
  /// interaction).
  pub fn on_input_or_scroll(&mut self, now: Timestamp) {
    let shielded = if self.scopes.is_open() {
      self.active.clone()
    } else {
      None
    };
    for ctx in &self.contexts {
      if let Some(shield) = &shielded {
        if Rc::ptr_eq(ctx, shield) {
          continue;
        }
      }
      ctx.borrow_mut().on_input_or_scroll(now);
    }
  }

  /// Removes exhausted contexts: nothing external references them (the
  /// registry handle is the last one) and `is_referenced` — fed by the
  /// record store and attribution tracker — reports no remaining attributed
  /// work. Final metrics are recorded exactly once, here.
  pub fn sweep(&mut self, is_referenced: impl Fn(ContextId) -> bool) {
    let mut exhausted: Vec<SharedContext> = Vec::new();
    self.contexts.retain(|ctx| {
      let keep = Rc::strong_count(ctx) > 1 || is_referenced(ctx.borrow().id());
      if !keep {
        exhausted.push(Rc::clone(ctx));
      }
      keep
    });
    for ctx in exhausted {
      self.finalize(&ctx);
    }
    if self
      .task_context
      .map(|id| self.find(id).is_none())
      .unwrap_or(false)
    {
      self.task_context = None;
    }
  }

  /// Document teardown: finalize every still-live context as if exhausted.
  pub fn shutdown(&mut self) {
    let all: Vec<SharedContext> = self.contexts.drain(..).collect();
    self.active = None;
    self.awaiting_first_paint.clear();
    self.last_graduated = None;
    self.task_context = None;
    for ctx in all {
      self.finalize(&ctx);
    }
  }

  fn create_context(&mut self) -> SharedContext {
    let id = ContextId(self.next_context_id);
    self.next_context_id += 1;
    let ctx = Rc::new(RefCell::new(InteractionContext::new(id, self.mode)));
    debug!("created interaction context {:?}", id);
    self.contexts.push(Rc::clone(&ctx));
    ctx
  }

  fn find(&self, id: ContextId) -> Option<SharedContext> {
    self
      .contexts
      .iter()
      .find(|ctx| ctx.borrow().id() == id)
      .cloned()
  }

  /// Re-evaluates the graduation predicate, cheapest checks first. One-way:
  /// once a navigation id is assigned the context also becomes a pending
  /// target for the next first-contentful-paint measurement.
  fn try_graduate(&mut self, ctx: &SharedContext) {
    {
      let mut c = ctx.borrow_mut();
      if c.has_graduated()
        || !c.satisfies_non_paint_criteria()
        || !c.satisfies_paint_criteria(self.required_paint_area)
      {
        return;
      }
      c.set_navigation_id(Uuid::new_v4());
    }
    self.awaiting_first_paint.push(Rc::clone(ctx));
    self.last_graduated = Some(Rc::clone(ctx));
  }

  fn finalize(&mut self, ctx: &SharedContext) {
    let c = ctx.borrow();
    self
      .metrics
      .record_context(c.outcome(), c.attributed_paint_area(), c.repainted_area());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url() -> Url {
    Url::parse("https://example.test/app#view").unwrap()
  }

  fn heuristics() -> SoftNavigationHeuristics {
    let mut h = SoftNavigationHeuristics::new(AttributionMode::Direct);
    h.set_required_paint_area(100);
    h
  }

  fn graduate_one(h: &mut SoftNavigationHeuristics, tracker: &mut AttributionTracker) -> ContextId {
    let token = h.on_event_scope_enter(EventScopeType::Click);
    h.on_dom_modified(DomNodeId(1), tracker);
    h.on_same_document_url_change(url(), None);
    h.on_event_scope_exit(token, Timestamp::from_millis(10.0)).unwrap();
    let id = ContextId(1);
    h.on_painted_area(id, DomNodeId(2), 150);
    h.on_paint_finished();
    id
  }

  #[test]
  fn click_scope_creates_exactly_one_context() {
    let mut h = heuristics();
    let token = h.on_event_scope_enter(EventScopeType::Click);
    assert_eq!(h.live_context_count(), 1);
    // Nested script navigation reuses the click's context.
    let nested = h.on_event_scope_enter(EventScopeType::Navigate);
    assert_eq!(h.live_context_count(), 1);
    h.on_event_scope_exit(nested, Timestamp::from_millis(5.0)).unwrap();
    h.on_event_scope_exit(token, Timestamp::from_millis(6.0)).unwrap();
    assert_eq!(h.live_context_count(), 1);
  }

  #[test]
  fn keyup_reuses_the_keydown_context() {
    let mut h = heuristics();
    let down = h.on_event_scope_enter(EventScopeType::Keydown);
    h.on_event_scope_exit(down, Timestamp::from_millis(1.0)).unwrap();
    // Keydown does not end the interaction; keyup joins the same context.
    let up = h.on_event_scope_enter(EventScopeType::Keyup);
    assert_eq!(h.live_context_count(), 1);
    h.on_event_scope_exit(up, Timestamp::from_millis(2.0)).unwrap();
  }

  #[test]
  fn orphan_keyup_creates_a_context_defensively() {
    let mut h = heuristics();
    let up = h.on_event_scope_enter(EventScopeType::Keyup);
    assert_eq!(h.live_context_count(), 1);
    h.on_event_scope_exit(up, Timestamp::from_millis(2.0)).unwrap();
  }

  #[test]
  fn graduation_requires_area_threshold_crossing() {
    let mut h = heuristics();
    let mut tracker = AttributionTracker::new();
    let token = h.on_event_scope_enter(EventScopeType::Click);
    h.on_dom_modified(DomNodeId(1), &mut tracker);
    h.on_same_document_url_change(url(), None);
    h.on_event_scope_exit(token, Timestamp::from_millis(10.0)).unwrap();

    let id = ContextId(1);
    h.on_painted_area(id, DomNodeId(2), 40);
    h.on_paint_finished();
    assert!(!h.find(id).unwrap().borrow().has_graduated());

    // Cumulative 110 >= 100: graduation happens on this notification.
    h.on_painted_area(id, DomNodeId(3), 70);
    h.on_paint_finished();
    assert!(h.find(id).unwrap().borrow().has_graduated());
  }

  #[test]
  fn emission_waits_for_first_contentful_paint() {
    let mut h = heuristics();
    let mut tracker = AttributionTracker::new();
    let id = graduate_one(&mut h, &mut tracker);
    assert!(h.find(id).unwrap().borrow().has_graduated());
    assert_eq!(h.soft_navigation_count(), 0);

    let summary = CandidateSummary {
      id: crate::dom::CandidateId::for_text(DomNodeId(2)),
      node: DomNodeId(2),
      kind: CandidateKind::Text,
      area: 150,
      paint_time: Some(Timestamp::from_millis(25.0)),
      frame_rect: crate::geometry::Rect::ZERO,
      frame_index: crate::timing::FrameIndex(1),
    };
    let entry = h.on_attributed_paint_presented(id, &summary, None).unwrap();
    assert_eq!(entry.first_contentful_paint, Timestamp::from_millis(25.0));
    assert_eq!(entry.interaction_timestamp, Timestamp::from_millis(10.0));
    assert_eq!(h.soft_navigation_count(), 1);

    // A second presentation never re-emits.
    assert!(h.on_attributed_paint_presented(id, &summary, None).is_none());
  }

  #[test]
  fn unattributed_url_change_merges_into_the_last_graduated_context() {
    let mut h = heuristics();
    let mut tracker = AttributionTracker::new();
    let id = graduate_one(&mut h, &mut tracker);

    let redirect = Url::parse("https://example.test/app#view-2").unwrap();
    h.on_same_document_url_change(redirect.clone(), None);
    let ctx = h.find(id).unwrap();
    assert_eq!(ctx.borrow().most_recent_url(), Some(&redirect));
    // First-set-wins initial URL is untouched.
    assert_eq!(ctx.borrow().initial_url(), Some(&url()));
    assert_eq!(h.metrics().no_context_at_url_change, 0);
  }

  #[test]
  fn url_change_with_no_candidate_context_is_counted_only() {
    let mut h = heuristics();
    h.on_same_document_url_change(url(), None);
    assert_eq!(h.metrics().no_context_at_url_change, 1);
  }

  #[test]
  fn input_freezes_inactive_contexts_only() {
    let mut h = heuristics();
    let token = h.on_event_scope_enter(EventScopeType::Click);
    h.on_input_or_scroll(Timestamp::from_millis(3.0));
    let active = h.current_context().unwrap();
    assert!(active.borrow().input_or_scroll_time().is_none());
    h.on_event_scope_exit(token, Timestamp::from_millis(4.0)).unwrap();

    // With the scope closed, a scroll freezes it.
    h.on_input_or_scroll(Timestamp::from_millis(5.0));
    assert!(active.borrow().input_or_scroll_time().is_some());
  }

  #[test]
  fn sweep_finalizes_unreferenced_contexts_once() {
    let mut h = heuristics();
    let token = h.on_event_scope_enter(EventScopeType::Click);
    h.on_event_scope_exit(token, Timestamp::from_millis(1.0)).unwrap();
    assert_eq!(h.live_context_count(), 1);

    // Click ended the interaction and nothing else references the context.
    h.sweep(|_| false);
    assert_eq!(h.live_context_count(), 0);
    assert_eq!(h.metrics().no_dom_modification, 1);

    // Sweeping again records nothing further.
    h.sweep(|_| false);
    assert_eq!(h.metrics().no_dom_modification, 1);
  }

  #[test]
  fn sweep_keeps_contexts_with_attributed_work() {
    let mut h = heuristics();
    let mut tracker = AttributionTracker::new();
    let token = h.on_event_scope_enter(EventScopeType::Click);
    h.on_dom_modified(DomNodeId(1), &mut tracker);
    h.on_event_scope_exit(token, Timestamp::from_millis(1.0)).unwrap();

    let id = ContextId(1);
    h.sweep(|ctx| tracker.references_context(ctx));
    assert!(h.is_live(id));
  }

  #[test]
  fn shutdown_finalizes_everything_as_exhausted() {
    let mut h = heuristics();
    let mut tracker = AttributionTracker::new();
    let _ = graduate_one(&mut h, &mut tracker);
    let token = h.on_event_scope_enter(EventScopeType::Keydown);
    h.on_event_scope_exit(token, Timestamp::from_millis(50.0)).unwrap();

    h.shutdown();
    assert_eq!(h.live_context_count(), 0);
    // One graduated (never emitted, still Detected), one empty context.
    assert_eq!(h.metrics().detected, 1);
    assert_eq!(h.metrics().no_dom_modification, 1);
  }
}
