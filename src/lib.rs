pub mod attribution;
pub mod detector;
pub mod dom;
pub mod error;
pub mod geometry;
pub mod heuristics;
pub mod metrics;
pub mod records;
pub mod timing;

pub use detector::{DetectorOptions, NoopObserver, PaintTimingDetector, TimingObserver};
pub use dom::{CandidateId, DomNodeId};
pub use error::{Error, Result};
pub use geometry::{Point, Rect, Size};
pub use timing::{FrameIndex, MonotonicClock, PaintTimingInfo, SystemClock, Timestamp};

// Re-export the vocabulary types embedders handle directly.
pub use attribution::{AttributionMode, ContextId, PrepaintLeaf, Propagation, PropagatedState};
pub use heuristics::{EventScopeType, ScopeToken, SoftNavigationEntry};
pub use metrics::{SoftNavigationOutcome, TimingMetrics};
pub use records::{CandidateKind, CandidateSummary, LcpCandidate};
