//! Camera module for pan/zoom transforms and visibility culling.

use crate::config::BoardConfig;
use crate::connector::Connector;
use crate::geometry::rects_overlap;
use crate::tile::Tile;
use kurbo::{Affine, Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Anything the camera can cull.
pub trait Viewable {
    /// World-space bounding box.
    fn world_bounds(&self) -> Rect;

    /// Bypass culling, e.g. while the item is being interacted with.
    fn force_to_render(&self) -> bool {
        false
    }
}

impl Viewable for Tile {
    fn world_bounds(&self) -> Rect {
        self.rect()
    }

    fn force_to_render(&self) -> bool {
        Tile::force_to_render(self)
    }
}

impl Viewable for Connector {
    fn world_bounds(&self) -> Rect {
        self.bounds()
    }
}

impl Viewable for Rect {
    fn world_bounds(&self) -> Rect {
        *self
    }
}

/// Camera manages the view transform for the board.
///
/// `position` is the world coordinate shown at the viewport's top-left
/// corner; `zoom` is screen pixels per world unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// World coordinates of the viewport's top-left corner.
    pub position: Point,
    /// Current zoom level.
    pub zoom: f64,
    /// Minimum allowed zoom level
    pub min_zoom: f64,
    /// Maximum allowed zoom level
    pub max_zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Point::ZERO,
            zoom: 1.0,
            min_zoom: 0.1,
            max_zoom: 5.0,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a camera using the zoom bounds from `config`.
    pub fn with_config(config: &BoardConfig) -> Self {
        Self {
            min_zoom: config.min_zoom,
            max_zoom: config.max_zoom,
            ..Self::default()
        }
    }

    /// Transform applied to the content layer: `scale(zoom) · translate(-position)`.
    ///
    /// This transform converts world coordinates to screen coordinates.
    pub fn transform(&self) -> Affine {
        Affine::scale(self.zoom) * Affine::translate(-self.position.to_vec2())
    }

    /// Screen offset of background decoration so it stays fixed in world space.
    ///
    /// Always equals `transform() * Point::ZERO`.
    pub fn background_offset(&self) -> Vec2 {
        Vec2::new(-self.position.x * self.zoom, -self.position.y * self.zoom)
    }

    /// Convert a screen point to world coordinates.
    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        Point::new(
            screen_point.x / self.zoom + self.position.x,
            screen_point.y / self.zoom + self.position.y,
        )
    }

    /// Convert a world point to screen coordinates.
    pub fn world_to_screen(&self, world_point: Point) -> Point {
        Point::new(
            (world_point.x - self.position.x) * self.zoom,
            (world_point.y - self.position.y) * self.zoom,
        )
    }

    /// Pan by a delta in screen pixels, converted with the current zoom.
    pub fn pan(&mut self, delta: Vec2) {
        self.position.x -= delta.x / self.zoom;
        self.position.y -= delta.y / self.zoom;
    }

    /// Change zoom by `delta`, keeping the world point under `screen_point` fixed.
    ///
    /// Returns false when the clamp leaves the zoom unchanged.
    pub fn zoom_at(&mut self, screen_point: Point, delta: f64) -> bool {
        let new_zoom = (self.zoom + delta).clamp(self.min_zoom, self.max_zoom);
        if !new_zoom.is_finite() || (new_zoom - self.zoom).abs() < f64::EPSILON {
            return false;
        }

        // Convert screen point to world before zoom
        let world_point = self.screen_to_world(screen_point);

        self.zoom = new_zoom;

        self.position = Point::new(
            world_point.x - screen_point.x / new_zoom,
            world_point.y - screen_point.y / new_zoom,
        );
        true
    }

    /// Frame a tile so it fills the viewport, leaving margins for its connectors.
    ///
    /// `margins` are subtracted from the height and width ratios respectively.
    pub fn center_on_item(&mut self, item: Rect, viewport: Size, margins: (f64, f64)) {
        let (margin_h, margin_w) = margins;
        let by_height = viewport.height / item.height() - margin_h;
        let by_width = viewport.width / item.width() - margin_w;
        let zoom = by_height.min(by_width);
        if zoom.is_nan() {
            log::debug!("center_on_item: degenerate rect {:?}, keeping zoom", item);
        } else {
            self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        }

        let center = item.center();
        self.position = Point::new(
            center.x - viewport.width / (2.0 * self.zoom),
            center.y - viewport.height / (2.0 * self.zoom),
        );
    }

    /// The part of the world currently on screen.
    pub fn visible_world_rect(&self, viewport: Size) -> Rect {
        Rect::from_origin_size(
            self.position,
            Size::new(viewport.width / self.zoom, viewport.height / self.zoom),
        )
    }

    /// Whether `item` overlaps the visible area or is forced to render.
    pub fn is_visible<V: Viewable + ?Sized>(&self, item: &V, viewport: Size) -> bool {
        item.force_to_render() || rects_overlap(item.world_bounds(), self.visible_world_rect(viewport))
    }

    /// Reset camera to default position and zoom.
    pub fn reset(&mut self) {
        self.position = Point::ZERO;
        self.zoom = 1.0;
    }

    /// Fit the camera to show the given bounding box.
    pub fn fit_to_bounds(&mut self, bounds: Rect, viewport: Size, padding: f64) {
        if bounds.is_zero_area() {
            self.reset();
            self.position = Point::new(
                bounds.center().x - viewport.width / 2.0,
                bounds.center().y - viewport.height / 2.0,
            );
            return;
        }

        let padded_viewport = Size::new(
            (viewport.width - padding * 2.0).max(1.0),
            (viewport.height - padding * 2.0).max(1.0),
        );

        let scale_x = padded_viewport.width / bounds.width();
        let scale_y = padded_viewport.height / bounds.height();
        self.zoom = scale_x.min(scale_y).clamp(self.min_zoom, self.max_zoom);

        let center = bounds.center();
        self.position = Point::new(
            center.x - viewport.width / (2.0 * self.zoom),
            center.y - viewport.height / (2.0 * self.zoom),
        );
    }
}
