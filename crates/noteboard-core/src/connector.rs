//! Directional connectors anchored on tile boundaries.

use crate::geometry::{Heading, anchor_distance};
use crate::tile::TileId;
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier shared by the two directional halves of one logical link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectorId(Uuid);

impl ConnectorId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One directional half of a link, owned by `item_a` and pointing at `item_b`.
///
/// Tiles are referenced by id only. Whoever mutates a tile rect is
/// responsible for calling [`Connector::refresh`] with the new geometry.
#[derive(Debug, Clone)]
pub struct Connector {
    id: ConnectorId,
    item_a: TileId,
    item_b: TileId,
    heading: Heading,
    /// Anchor point (connector center) in world coordinates.
    position: Point,
    /// Visual footprint, reserved as clearance in the anchor rule.
    size: Size,
    /// Fade with zoom, 0 = hidden, 1 = opaque.
    opacity: f64,
}

impl Connector {
    /// Create a connector from `a` toward `b` and compute its geometry.
    pub fn new(id: ConnectorId, item_a: TileId, item_b: TileId, size: Size) -> Self {
        Self {
            id,
            item_a,
            item_b,
            heading: Heading::NONE,
            position: Point::ZERO,
            size,
            opacity: 1.0,
        }
    }

    pub fn id(&self) -> ConnectorId {
        self.id
    }

    /// The owning tile, origin of the anchor.
    pub fn item_a(&self) -> &TileId {
        &self.item_a
    }

    /// The tile this connector points at.
    pub fn item_b(&self) -> &TileId {
        &self.item_b
    }

    pub fn heading(&self) -> Heading {
        self.heading
    }

    pub fn angle(&self) -> f64 {
        self.heading.angle
    }

    /// False when both tile centers coincide; the renderer should hide it.
    pub fn has_direction(&self) -> bool {
        self.heading.is_defined()
    }

    /// Anchor point on A's boundary in world coordinates.
    pub fn anchor(&self) -> Point {
        self.position
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// World-space footprint centered on the anchor.
    pub fn bounds(&self) -> Rect {
        Rect::from_center_size(self.position, self.size)
    }

    /// Record the measured footprint. Takes effect on the next position update.
    pub fn set_footprint(&mut self, size: Size) {
        self.size = size;
    }

    /// Recompute the heading from the two tile centers.
    pub fn update_angles(&mut self, a_center: Point, b_center: Point) {
        self.heading = Heading::between(a_center, b_center);
    }

    /// Place the anchor just outside `a_rect` along the current heading.
    pub fn update_position(&mut self, a_rect: Rect, shift: f64) {
        let center = a_rect.center();
        if !self.heading.is_defined() {
            self.position = center;
            return;
        }
        let half = Size::new(a_rect.width() / 2.0, a_rect.height() / 2.0);
        let clearance = Size::new(shift + self.size.width / 2.0, shift + self.size.height / 2.0);
        let r = anchor_distance(half, clearance, self.heading);
        self.position = Point::new(center.x + r * self.heading.cos, center.y + r * self.heading.sin);
    }

    /// Fade linearly from invisible at zoom 0.5 to opaque at zoom 1.
    pub fn update_size(&mut self, zoom: f64) {
        self.opacity = (2.0 * zoom - 1.0).clamp(0.0, 1.0);
    }

    /// Both geometry steps from fresh tile rects.
    pub fn refresh(&mut self, a_rect: Rect, b_rect: Rect, shift: f64) {
        self.update_angles(a_rect.center(), b_rect.center());
        self.update_position(a_rect, shift);
    }
}
