//! Per-candidate-navigation accumulators
//!
//! Each user interaction that might turn into a soft navigation gets an
//! [`InteractionContext`]: a bag of monotonic counters (modified nodes,
//! attributed paint area), the interaction's timestamps and URL, and a
//! private LCP calculator scoped to the context's own attributed candidates.
//! A context graduates — is assigned its navigation id — exactly once, when
//! all four criteria hold simultaneously.

use crate::dom::DomNodeId;
use crate::metrics::SoftNavigationOutcome;
use crate::records::lcp::LcpCalculator;
use crate::timing::Timestamp;
use log::debug;
use log::error;
use rustc_hash::FxHashSet;
use serde::Serialize;
use url::Url;
use uuid::Uuid;

/// Process-unique, monotonically assigned context identifier. The
/// numerically highest live id is the most recently created context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(pub u64);

/// How painted area reaches contexts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributionMode {
  /// Paint notifications arrive straight from the record store; the context
  /// dedups repeated paints of one node itself.
  #[default]
  Direct,
  /// The attribution tracker already guarantees one attribution per node per
  /// generation, so no dedup set is kept.
  TrackerAssisted,
}

/// Accumulator for one potential soft navigation.
pub struct InteractionContext {
  id: ContextId,
  mode: AttributionMode,
  navigation_id: Option<Uuid>,
  interaction_timestamp: Option<Timestamp>,
  first_contentful_paint: Option<Timestamp>,
  initial_url: Option<Url>,
  most_recent_url: Option<Url>,
  modified_node_count: u64,
  attributed_paint_area: u64,
  /// Re-painted (deduplicated) area, tallied for diagnostics only.
  repainted_area: u64,
  input_or_scroll_time: Option<Timestamp>,
  attributed_nodes: FxHashSet<DomNodeId>,
  /// LCP scoped to this context's attributed candidates only.
  lcp: LcpCalculator,
  area_at_last_paint_check: u64,
}

impl InteractionContext {
  pub fn new(id: ContextId, mode: AttributionMode) -> Self {
    Self {
      id,
      mode,
      navigation_id: None,
      interaction_timestamp: None,
      first_contentful_paint: None,
      initial_url: None,
      most_recent_url: None,
      modified_node_count: 0,
      attributed_paint_area: 0,
      repainted_area: 0,
      input_or_scroll_time: None,
      attributed_nodes: FxHashSet::default(),
      lcp: LcpCalculator::new(),
      area_at_last_paint_check: 0,
    }
  }

  pub fn id(&self) -> ContextId {
    self.id
  }

  pub fn navigation_id(&self) -> Option<&Uuid> {
    self.navigation_id.as_ref()
  }

  pub fn has_graduated(&self) -> bool {
    self.navigation_id.is_some()
  }

  pub fn interaction_timestamp(&self) -> Option<Timestamp> {
    self.interaction_timestamp
  }

  pub fn first_contentful_paint(&self) -> Option<Timestamp> {
    self.first_contentful_paint
  }

  pub fn initial_url(&self) -> Option<&Url> {
    self.initial_url.as_ref()
  }

  pub fn most_recent_url(&self) -> Option<&Url> {
    self.most_recent_url.as_ref()
  }

  pub fn modified_node_count(&self) -> u64 {
    self.modified_node_count
  }

  pub fn attributed_paint_area(&self) -> u64 {
    self.attributed_paint_area
  }

  pub fn repainted_area(&self) -> u64 {
    self.repainted_area
  }

  pub fn lcp(&self) -> &LcpCalculator {
    &self.lcp
  }

  pub fn lcp_mut(&mut self) -> &mut LcpCalculator {
    &mut self.lcp
  }

  /// A DOM modification was attributed to this context.
  pub fn add_modified_node(&mut self, node: DomNodeId) {
    self.modified_node_count += 1;
    debug!("{:?}: modified {} ({} total)", self.id, node, self.modified_node_count);
  }

  /// Attributes `area` painted pixels of `node` to this context.
  ///
  /// Returns false once input or scroll has frozen the context. Repeated
  /// paints of one node count only once toward the criteria; the repeats go
  /// to the diagnostic repaint tally (skipped in tracker-assisted mode,
  /// where the caller already guarantees one attribution per node per
  /// generation).
  pub fn add_painted_area(&mut self, node: DomNodeId, area: u64) -> bool {
    if self.input_or_scroll_time.is_some() {
      return false;
    }
    if self.mode == AttributionMode::Direct && !self.attributed_nodes.insert(node) {
      self.repainted_area += area;
      return true;
    }
    self.attributed_paint_area += area;
    true
  }

  /// Called when a rendering pass finishes. Returns whether any new area was
  /// attributed since the previous pass.
  pub fn on_paint_finished(&mut self) -> bool {
    let grew = self.attributed_paint_area > self.area_at_last_paint_check;
    self.area_at_last_paint_check = self.attributed_paint_area;
    grew
  }

  /// Freezes area accumulation: a later input or scroll means subsequent
  /// paints belong to that interaction, not this one.
  pub fn on_input_or_scroll(&mut self, timestamp: Timestamp) {
    if self.input_or_scroll_time.is_none() {
      self.input_or_scroll_time = Some(timestamp);
    }
  }

  pub fn input_or_scroll_time(&self) -> Option<Timestamp> {
    self.input_or_scroll_time
  }

  /// Sets the interaction timestamp if it is still unset.
  pub fn set_interaction_timestamp(&mut self, timestamp: Timestamp) {
    if self.interaction_timestamp.is_none() {
      self.interaction_timestamp = Some(timestamp);
    }
  }

  /// Records a same-document URL for this context. `initial_url` is
  /// first-set-wins; `most_recent_url` always follows the latest change.
  pub fn set_url(&mut self, url: Url) {
    if self.initial_url.is_none() {
      self.initial_url = Some(url.clone());
    }
    self.most_recent_url = Some(url);
  }

  pub fn set_first_contentful_paint(&mut self, timestamp: Timestamp) {
    if self.first_contentful_paint.is_none() {
      self.first_contentful_paint = Some(timestamp);
    }
  }

  /// The cheap, paint-free half of the graduation predicate: at least one
  /// attributed DOM modification, an assigned URL, and an interaction
  /// timestamp.
  pub fn satisfies_non_paint_criteria(&self) -> bool {
    self.modified_node_count > 0
      && self.most_recent_url.is_some()
      && self.interaction_timestamp.is_some()
  }

  /// The paint half: cumulative attributed area reached the required
  /// threshold.
  pub fn satisfies_paint_criteria(&self, required_area: u64) -> bool {
    self.attributed_paint_area >= required_area
  }

  /// Assigns the navigation id. One-way: a context that has produced an id
  /// never produces a second one; a second assignment is a programming
  /// defect, reported and ignored.
  pub fn set_navigation_id(&mut self, id: Uuid) {
    if self.navigation_id.is_some() {
      debug_assert!(false, "context {:?} assigned a second navigation id", self.id);
      error!("{:?}: second navigation id assignment ignored", self.id);
      return;
    }
    debug!("{:?}: graduated with navigation id {}", self.id, id);
    self.navigation_id = Some(id);
  }

  /// Final classification, computed once at exhaustion.
  pub fn outcome(&self) -> SoftNavigationOutcome {
    if self.has_graduated() {
      SoftNavigationOutcome::Detected
    } else if self.modified_node_count == 0 {
      SoftNavigationOutcome::NoDomModification
    } else {
      SoftNavigationOutcome::InsufficientPaints
    }
  }
}
