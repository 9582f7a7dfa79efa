//! Interaction contexts and generation-stamped paint attribution.

pub mod context;
pub mod tracker;

pub use context::{AttributionMode, ContextId, InteractionContext};
pub use tracker::{AttributionTracker, NodeState, PrepaintLeaf, Propagation, PropagatedState};
