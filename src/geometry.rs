//! Geometry primitives for paint-rect measurement
//!
//! This subsystem never performs layout; it only measures the rectangles the
//! paint pipeline hands it. All coordinates are CSS pixels with the origin at
//! the top-left corner (positive X right, positive Y down).
//!
//! Candidate sizes are compared as *pixel areas* — unsigned integer counts of
//! painted pixels after clipping — so `Rect` exposes [`Rect::pixel_area`]
//! alongside the float geometry.

use serde::Serialize;
use std::fmt;

/// A 2D point in CSS pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

  pub const fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

/// A 2D size in CSS pixels.
///
/// # Examples
///
/// ```
/// use softpaint::Size;
///
/// let viewport = Size::new(1280.0, 720.0);
/// assert_eq!(viewport.pixel_area(), 921_600);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Size {
  pub width: f32,
  pub height: f32,
}

impl Size {
  pub const ZERO: Self = Self {
    width: 0.0,
    height: 0.0,
  };

  pub const fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }

  /// Returns true if either dimension is zero or negative.
  pub fn is_empty(self) -> bool {
    self.width <= 0.0 || self.height <= 0.0
  }

  /// Area in whole pixels, saturating at zero for degenerate sizes.
  ///
  /// Fractional device-pixel edges round to nearest: a 10.5 × 2.0 rect
  /// measures 21 pixels, matching how the paint pipeline snaps rects.
  pub fn pixel_area(self) -> u64 {
    if self.is_empty() {
      return 0;
    }
    ((self.width as f64) * (self.height as f64)).round() as u64
  }
}

/// An axis-aligned rectangle: the visible, clipped, transformed bounds of one
/// painted leaf as reported by the paint pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
  pub origin: Point,
  pub size: Size,
}

impl Rect {
  pub const ZERO: Self = Self {
    origin: Point::ZERO,
    size: Size::ZERO,
  };

  pub const fn new(origin: Point, size: Size) -> Self {
    Self { origin, size }
  }

  pub const fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      origin: Point::new(x, y),
      size: Size::new(width, height),
    }
  }

  pub fn x(self) -> f32 {
    self.origin.x
  }

  pub fn y(self) -> f32 {
    self.origin.y
  }

  pub fn width(self) -> f32 {
    self.size.width
  }

  pub fn height(self) -> f32 {
    self.size.height
  }

  pub fn max_x(self) -> f32 {
    self.origin.x + self.size.width
  }

  pub fn max_y(self) -> f32 {
    self.origin.y + self.size.height
  }

  pub fn is_empty(self) -> bool {
    self.size.is_empty()
  }

  /// Area of the rect in whole pixels. See [`Size::pixel_area`].
  pub fn pixel_area(self) -> u64 {
    self.size.pixel_area()
  }

  /// Intersection with `other`, or `None` if the rects do not overlap.
  ///
  /// Used to clip candidate rects against the viewport before measuring:
  /// only the on-screen part of a paint counts toward candidate area.
  pub fn intersection(self, other: Rect) -> Option<Rect> {
    let x0 = self.x().max(other.x());
    let y0 = self.y().max(other.y());
    let x1 = self.max_x().min(other.max_x());
    let y1 = self.max_y().min(other.max_y());
    if x1 <= x0 || y1 <= y0 {
      return None;
    }
    Some(Rect::from_xywh(x0, y0, x1 - x0, y1 - y0))
  }
}

impl fmt::Display for Rect {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "({}, {}) {}x{}",
      self.origin.x, self.origin.y, self.size.width, self.size.height
    )
  }
}
