//! Generation-stamped paint attribution
//!
//! Marks which paintable leaves currently belong to which interaction
//! context without re-walking the whole tree on every paint. DOM mutations
//! mark nodes directly; the pre-paint walk then pushes that state down to
//! content leaves and, crucially, prunes descendant entries made redundant by
//! a newer ancestor mark. Stale (lower-generation) state is always safe to
//! drop or overwrite, never to keep — that invariant is what keeps the map
//! bounded by currently-relevant subtrees instead of growing with every
//! interaction the page ever saw.

use crate::attribution::ContextId;
use crate::dom::DomNodeId;
use log::trace;
use rustc_hash::FxHashMap;

/// Attribution state stored per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState {
  pub context: ContextId,
  /// Which marking batch wrote this entry. Entries with lower generation
  /// than an inherited ancestor state are stale.
  pub generation: u64,
  /// True when the node itself was marked by a DOM mutation, as opposed to
  /// state pushed down from an ancestor.
  pub directly_modified: bool,
}

/// State flowing down the pre-paint walk from the nearest current
/// directly-modified ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropagatedState {
  pub context: ContextId,
  pub generation: u64,
}

/// What kind of paintable leaf a walked node is, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepaintLeaf {
  Image,
  /// Text leaves aggregate into their containing block: the state entry
  /// lands on `aggregation_target` when one is supplied.
  Text {
    aggregation_target: Option<DomNodeId>,
  },
}

/// Outcome of one walk step: which state the caller propagates to children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
  /// The node carries a current direct mark; children inherit it.
  OwnState(PropagatedState),
  /// Children inherit whatever was being propagated into this node.
  Ancestor(Option<PropagatedState>),
}

impl Propagation {
  /// The state to pass into each child's walk step.
  pub fn inherited_state(&self) -> Option<PropagatedState> {
    match self {
      Propagation::OwnState(state) => Some(*state),
      Propagation::Ancestor(state) => *state,
    }
  }
}

/// The node-state map plus the modification-generation counter.
pub struct AttributionTracker {
  states: FxHashMap<DomNodeId, NodeState>,
  generation: u64,
  /// Context currently marking within this batch. A different context (or
  /// the next pre-paint walk) starts a new generation.
  last_marking_context: Option<ContextId>,
}

impl AttributionTracker {
  pub fn new() -> Self {
    Self {
      states: FxHashMap::default(),
      generation: 0,
      last_marking_context: None,
    }
  }

  /// Records that `node` was modified by work attributed to `context`.
  ///
  /// Idempotent within a generation: re-marking the same node by the same
  /// context in the same batch is a no-op. Marking a node already marked by
  /// a different or older generation overwrites. Returns whether the stored
  /// state changed.
  pub fn mark_directly_modified(&mut self, node: DomNodeId, context: ContextId) -> bool {
    if self.last_marking_context != Some(context) {
      self.generation += 1;
      self.last_marking_context = Some(context);
    }
    let next = NodeState {
      context,
      generation: self.generation,
      directly_modified: true,
    };
    match self.states.get(&node) {
      Some(existing) if *existing == next => false,
      _ => {
        trace!("mark {} for {:?} at generation {}", node, context, self.generation);
        self.states.insert(node, next);
        true
      }
    }
  }

  /// Ends the current marking batch. The next `mark_directly_modified`
  /// starts a new generation even for the same context.
  pub fn begin_prepaint_walk(&mut self) {
    self.last_marking_context = None;
  }

  /// One step of the top-down pre-paint walk.
  ///
  /// `inherited` is the state propagated from the nearest current
  /// directly-modified ancestor; `leaf` identifies content leaves that need
  /// their own entry so later paints can resolve attribution without
  /// re-walking.
  pub fn update_on_prepaint(
    &mut self,
    node: DomNodeId,
    inherited: Option<PropagatedState>,
    leaf: Option<PrepaintLeaf>,
  ) -> Propagation {
    // A direct mark wins while it is current. A mark whose generation fell
    // behind the inherited one is stale: an ancestor was modified more
    // recently, and the subtree now attributes through that ancestor.
    if let Some(state) = self.states.get(&node) {
      let current = match inherited {
        Some(inh) => state.generation >= inh.generation,
        None => true,
      };
      if state.directly_modified && current {
        return Propagation::OwnState(PropagatedState {
          context: state.context,
          generation: state.generation,
        });
      }
    }

    if let Some(inh) = inherited {
      match leaf {
        Some(kind) => {
          let target = match kind {
            PrepaintLeaf::Text {
              aggregation_target: Some(target),
            } => target,
            _ => node,
          };
          self.refresh_leaf(target, inh);
        }
        None => {
          // An interior entry at or below the inherited generation is
          // redundant: descendants resolve through the ancestor now.
          if let Some(state) = self.states.get(&node) {
            if state.generation <= inh.generation {
              self.states.remove(&node);
              trace!("pruned stale entry for {}", node);
            }
          }
        }
      }
    }

    Propagation::Ancestor(inherited)
  }

  /// True when `node`'s stored attribution points at `context`.
  pub fn is_attributable(&self, node: DomNodeId, context: ContextId) -> bool {
    self
      .states
      .get(&node)
      .map(|state| state.context == context)
      .unwrap_or(false)
  }

  /// The context `node` currently attributes to, if any.
  pub fn attributed_context(&self, node: DomNodeId) -> Option<ContextId> {
    self.states.get(&node).map(|state| state.context)
  }

  pub fn state(&self, node: DomNodeId) -> Option<&NodeState> {
    self.states.get(&node)
  }

  /// Drops the entry for a torn-down node.
  pub fn remove_node(&mut self, node: DomNodeId) {
    self.states.remove(&node);
  }

  /// Whether any node still attributes to `context`. Feeds the exhaustion
  /// sweep: a context with live attribution state is not yet removable.
  pub fn references_context(&self, context: ContextId) -> bool {
    self.states.values().any(|state| state.context == context)
  }

  pub fn entry_count(&self) -> usize {
    self.states.len()
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  fn refresh_leaf(&mut self, target: DomNodeId, inherited: PropagatedState) {
    match self.states.get(&target) {
      Some(state) if state.generation >= inherited.generation => {}
      _ => {
        self.states.insert(
          target,
          NodeState {
            context: inherited.context,
            generation: inherited.generation,
            directly_modified: false,
          },
        );
      }
    }
  }
}

impl Default for AttributionTracker {
  fn default() -> Self {
    Self::new()
  }
}
