//! Resize handles around a tile and the rule that applies them.

use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Handle hit tolerance in screen pixels.
pub const HANDLE_HIT_TOLERANCE: f64 = 8.0;

/// One of the eight resize handles, named by compass direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeHandle {
    N,
    S,
    E,
    W,
    NE,
    NW,
    SE,
    SW,
}

impl ResizeHandle {
    pub const ALL: [ResizeHandle; 8] = [
        ResizeHandle::NW,
        ResizeHandle::N,
        ResizeHandle::NE,
        ResizeHandle::W,
        ResizeHandle::E,
        ResizeHandle::SW,
        ResizeHandle::S,
        ResizeHandle::SE,
    ];

    pub fn has_north(self) -> bool {
        matches!(self, Self::N | Self::NE | Self::NW)
    }

    pub fn has_south(self) -> bool {
        matches!(self, Self::S | Self::SE | Self::SW)
    }

    pub fn has_east(self) -> bool {
        matches!(self, Self::E | Self::NE | Self::SE)
    }

    pub fn has_west(self) -> bool {
        matches!(self, Self::W | Self::NW | Self::SW)
    }

    /// Where this handle sits on `rect`.
    pub fn position_on(self, rect: Rect) -> Point {
        let center = rect.center();
        let x = if self.has_west() {
            rect.x0
        } else if self.has_east() {
            rect.x1
        } else {
            center.x
        };
        let y = if self.has_north() {
            rect.y0
        } else if self.has_south() {
            rect.y1
        } else {
            center.y
        };
        Point::new(x, y)
    }
}

/// A resize handle with its world position.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub kind: ResizeHandle,
    /// Position in world coordinates.
    pub position: Point,
}

impl Handle {
    /// Check if a world point hits this handle.
    /// `tolerance` should be adjusted for camera zoom.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

/// All eight handles for a tile rect.
pub fn handles_for(rect: Rect) -> Vec<Handle> {
    ResizeHandle::ALL
        .iter()
        .map(|&kind| Handle {
            kind,
            position: kind.position_on(rect),
        })
        .collect()
}

/// Find which handle (if any) is hit at the given world point.
pub fn hit_test_handles(rect: Rect, point: Point, tolerance: f64) -> Option<ResizeHandle> {
    handles_for(rect)
        .into_iter()
        .find(|handle| handle.hit_test(point, tolerance))
        .map(|handle| handle.kind)
}

/// Resize `start` by a world-space drag `delta` on `handle`.
///
/// West and north handles move the origin so the opposite edge stays put.
/// Sizes below `min` are clamped, and the origin is recomputed from the
/// clamped size so the anchored edge never drifts.
pub fn resize_rect(start: Rect, handle: ResizeHandle, delta: Vec2, min: Size) -> Rect {
    let mut x = start.x0;
    let mut y = start.y0;
    let mut width = start.width();
    let mut height = start.height();

    if handle.has_east() {
        width = start.width() + delta.x;
    }
    if handle.has_west() {
        width = start.width() - delta.x;
        x = start.x0 + delta.x;
    }
    if handle.has_south() {
        height = start.height() + delta.y;
    }
    if handle.has_north() {
        height = start.height() - delta.y;
        y = start.y0 + delta.y;
    }

    if width < min.width {
        width = min.width;
        if handle.has_west() {
            x = start.x0 + (start.width() - width);
        }
    }
    if height < min.height {
        height = min.height;
        if handle.has_north() {
            y = start.y0 + (start.height() - height);
        }
    }

    Rect::from_origin_size(Point::new(x, y), Size::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Size = Size::new(160.0, 120.0);

    fn start() -> Rect {
        Rect::new(100.0, 100.0, 400.0, 300.0)
    }

    #[test]
    fn test_east_handle_grows_width_only() {
        let r = resize_rect(start(), ResizeHandle::E, Vec2::new(50.0, 30.0), MIN);
        assert_eq!(r, Rect::new(100.0, 100.0, 450.0, 300.0));
    }

    #[test]
    fn test_west_handle_keeps_east_edge() {
        let r = resize_rect(start(), ResizeHandle::W, Vec2::new(-40.0, 0.0), MIN);
        assert!((r.x0 - 60.0).abs() < f64::EPSILON);
        assert!((r.x1 - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_west_clamp_keeps_east_edge() {
        let r = resize_rect(start(), ResizeHandle::W, Vec2::new(250.0, 0.0), MIN);
        assert!((r.width() - 160.0).abs() < f64::EPSILON);
        assert!((r.x1 - 400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_north_west_clamp_keeps_south_east_corner() {
        let r = resize_rect(start(), ResizeHandle::NW, Vec2::new(500.0, 500.0), MIN);
        assert_eq!(r.size(), MIN);
        assert!((r.x1 - 400.0).abs() < f64::EPSILON);
        assert!((r.y1 - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_south_east_clamp_keeps_origin() {
        let r = resize_rect(start(), ResizeHandle::SE, Vec2::new(-500.0, -500.0), MIN);
        assert_eq!(r.origin(), Point::new(100.0, 100.0));
        assert_eq!(r.size(), MIN);
    }

    #[test]
    fn test_handle_positions_and_hit_test() {
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(ResizeHandle::NE.position_on(rect), Point::new(100.0, 0.0));
        assert_eq!(ResizeHandle::S.position_on(rect), Point::new(50.0, 50.0));
        assert_eq!(hit_test_handles(rect, Point::new(2.0, 48.0), 5.0), Some(ResizeHandle::SW));
        assert_eq!(hit_test_handles(rect, Point::new(50.0, 25.0), 5.0), None);
    }
}
