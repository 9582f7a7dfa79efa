//! Candidate records, largest-candidate tracking, and the LCP merge.

pub mod largest;
pub mod lcp;
pub mod record;
pub mod store;

pub use largest::LargestCandidateTracker;
pub use lcp::{LcpCalculator, LcpCandidate, LcpDebugInfo};
pub use record::{
  CandidateKind, CandidateRecord, CandidateSummary, ImageDetail, MIN_IMAGE_ENTROPY_BPP,
};
pub use store::{CandidateInterest, RecordOutcome, RecordStore};
