//! Vector helpers shared by connectors and the camera.

use kurbo::{Point, Rect, Size};

/// Lower bound for `|cos|` / `|sin|` when dividing in the anchor rule.
pub const ANCHOR_EPSILON: f64 = 1e-6;

/// Points closer than this are treated as coincident.
pub const COINCIDENT_EPSILON: f64 = 1e-9;

/// Angle of the direction from `a` toward `b`.
///
/// Angle 0 points rightward and angles grow clockwise, since world y grows downward.
/// Returns NaN when the points coincide.
pub fn angle_between(a: Point, b: Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    if dx.abs() < COINCIDENT_EPSILON && dy.abs() < COINCIDENT_EPSILON {
        return f64::NAN;
    }
    (-dy).atan2(-dx)
}

/// A direction with its trigonometric values cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    pub angle: f64,
    pub cos: f64,
    pub sin: f64,
}

impl Default for Heading {
    fn default() -> Self {
        Self::NONE
    }
}

impl Heading {
    /// "No visible direction", produced by coincident endpoints.
    pub const NONE: Heading = Heading {
        angle: f64::NAN,
        cos: f64::NAN,
        sin: f64::NAN,
    };

    pub fn from_angle(angle: f64) -> Self {
        if !angle.is_finite() {
            return Self::NONE;
        }
        Self {
            angle,
            cos: angle.cos(),
            sin: angle.sin(),
        }
    }

    /// Heading from `from` toward `to`.
    pub fn between(from: Point, to: Point) -> Self {
        Self::from_angle(angle_between(from, to))
    }

    pub fn is_defined(&self) -> bool {
        self.angle.is_finite()
    }
}

/// Distance from a box center to the point where a ray along `heading`
/// leaves the box grown by `clearance` on every side.
///
/// Uses `min(tx, ty)`, which picks the limiting axis. At corners of
/// non-square boxes this overshoots the exact intersection; callers rely on
/// that shape.
pub fn anchor_distance(half_extent: Size, clearance: Size, heading: Heading) -> f64 {
    let tx = (half_extent.width + clearance.width) / heading.cos.abs().max(ANCHOR_EPSILON);
    let ty = (half_extent.height + clearance.height) / heading.sin.abs().max(ANCHOR_EPSILON);
    tx.min(ty)
}

/// Strict axis-aligned overlap; touching edges do not count.
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x1 > b.x0 && a.x0 < b.x1 && a.y1 > b.y0 && a.y0 < b.y1
}
