//! Time and frame bookkeeping
//!
//! Paints happen now; the wall-clock time a frame actually became visible is
//! only known later, when the presentation pipeline reports back for a given
//! [`FrameIndex`]. This module holds the shared vocabulary for that gap: a
//! monotonic [`Timestamp`], the frame counter, and the clock seam that lets
//! tests drive time explicitly instead of simulating the real compositor.

use serde::Serialize;
use std::fmt;
use std::time::Instant;

/// A monotonic timestamp in milliseconds since an arbitrary origin.
///
/// The origin is whatever the embedder's clock uses (document start under
/// [`SystemClock`]); only ordering and differences are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Timestamp(f64);

impl Timestamp {
  pub const fn from_millis(ms: f64) -> Self {
    Self(ms)
  }

  pub fn as_millis(self) -> f64 {
    self.0
  }
}

impl fmt::Display for Timestamp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.3}ms", self.0)
  }
}

/// Identifies one rendering pass.
///
/// Strictly increasing: the presentation pipeline reports timestamps for
/// frame N no earlier than for frame N-1, and the record store's resolution
/// queue leans on that ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
  pub const ZERO: Self = Self(0);

  pub fn next(self) -> Self {
    Self(self.0 + 1)
  }
}

/// Extra presentation detail delivered with a resolved frame timestamp.
///
/// Carried through to change notifications unmodified; this subsystem only
/// reads the presentation time itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PaintTimingInfo {
  /// Time the frame's paint commands finished recording, if known.
  pub paint_end: Option<Timestamp>,
  /// Whether the presentation time came from real hardware feedback or a
  /// compositor estimate.
  pub presentation_estimated: bool,
}

/// Source of "now" for interaction timestamps.
///
/// Event scopes do not carry timestamps, so the orchestrator needs its own
/// clock. Tests inject a manual implementation; production uses
/// [`SystemClock`].
pub trait MonotonicClock {
  fn now(&self) -> Timestamp;
}

/// Clock anchored at its own creation, ticking with [`Instant`].
pub struct SystemClock {
  origin: Instant,
}

impl SystemClock {
  pub fn new() -> Self {
    Self {
      origin: Instant::now(),
    }
  }
}

impl Default for SystemClock {
  fn default() -> Self {
    Self::new()
  }
}

impl MonotonicClock for SystemClock {
  fn now(&self) -> Timestamp {
    Timestamp::from_millis(self.origin.elapsed().as_secs_f64() * 1000.0)
  }
}
