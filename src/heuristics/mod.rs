//! Interaction scopes and the soft-navigation state machine.

pub mod orchestrator;
pub mod scope;

pub use orchestrator::{SoftNavigationEntry, SoftNavigationHeuristics, REQUIRED_PAINT_AREA_FRACTION};
pub use scope::{EventScopeType, ScopeStack, ScopeToken};
