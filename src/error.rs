//! Error types
//!
//! Almost nothing in this subsystem can fail during normal operation: missed
//! detections, orphaned records, and late presentation callbacks are all
//! modeled as boolean or optional results, not errors (late callbacks are
//! idempotent no-ops). `Error` covers the residue — embedder calls that
//! violate the protocol contract outright — using `thiserror` for the
//! boilerplate.

use thiserror::Error;

/// Result type alias for softpaint operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol violations by the embedder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  /// An event-scope exit arrived with no matching open scope.
  #[error("event scope exit without a matching enter")]
  UnbalancedEventScope,

  /// A presentation callback referenced a frame index this subsystem never
  /// issued a paint pass for.
  #[error("presentation callback for unknown frame index {0}")]
  UnknownFrameIndex(u64),

  /// A notification arrived after `shutdown()`.
  #[error("detector has been shut down")]
  ShutDown,
}
