//! Pointer gesture recognition.
//!
//! Raw pointer, wheel and click events go in; camera and tile mutations plus
//! a list of [`Interaction`]s come out. One gesture is active at a time.

use crate::camera::Camera;
use crate::config::BoardConfig;
use crate::connector::ConnectorId;
use crate::graph::TileGraph;
use crate::handles::{ResizeHandle, resize_rect};
use crate::tile::TileId;
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// What the pointer went down on, as resolved by the host's hit testing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerTarget {
    Background,
    Tile(TileId),
    ResizeHandle(TileId, ResizeHandle),
    Connector(ConnectorId),
    /// Menus, search and other overlays.
    Chrome,
}

/// Pointer event in screen coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PointerEvent {
    Down {
        position: Point,
        target: PointerTarget,
        #[serde(default)]
        button: MouseButton,
    },
    Move {
        position: Point,
    },
    /// Release, wherever the pointer is.
    Up {
        position: Point,
    },
    Cancel,
    Wheel {
        position: Point,
        delta_y: f64,
    },
    /// The click that follows a press/release pair.
    Click {
        position: Point,
        target: PointerTarget,
    },
    /// End of the current event-loop turn.
    Tick,
}

/// Observable effect of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    MoveStarted { tile: TileId },
    TileMoved { tile: TileId, position: Point },
    MoveEnded { tile: TileId, dragged: bool },
    ResizeStarted { tile: TileId, handle: ResizeHandle },
    TileResized { tile: TileId, rect: Rect },
    ResizeEnded { tile: TileId, resized: bool },
    BackgroundPressed,
    Panned { camera: Point },
    PanEnded,
    Zoomed { zoom: f64, camera: Point },
    Clicked { target: PointerTarget },
    /// A click right after a drag, dropped.
    ClickSwallowed,
}

/// Coarse state of the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GesturePhase {
    Idle,
    /// Pressed on a tile, threshold not crossed yet.
    Armed,
    Dragging,
    Resizing,
    Panning,
    /// A drag just ended; the next click is swallowed.
    Settling,
}

#[derive(Debug, Clone)]
enum Gesture {
    Idle,
    Armed {
        tile: TileId,
        start: Point,
        origin: Point,
    },
    Dragging {
        tile: TileId,
        last: Point,
        /// Unrounded accumulated world position.
        current: Point,
    },
    Resizing {
        tile: TileId,
        handle: ResizeHandle,
        start: Point,
        start_rect: Rect,
        resized: bool,
    },
    Panning {
        last: Point,
    },
    Settling,
}

/// Turns pointer events into tile moves, resizes, pans and zooms.
#[derive(Debug, Clone)]
pub struct InteractionController {
    gesture: Gesture,
    drag_threshold: f64,
    wheel_step: f64,
    min_tile_size: Size,
    round_to_whole_units: bool,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(&BoardConfig::default())
    }
}

impl InteractionController {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            gesture: Gesture::Idle,
            drag_threshold: config.drag_threshold,
            wheel_step: config.wheel_step,
            min_tile_size: config.min_tile_size(),
            round_to_whole_units: config.round_to_whole_units,
        }
    }

    pub fn phase(&self) -> GesturePhase {
        match self.gesture {
            Gesture::Idle => GesturePhase::Idle,
            Gesture::Armed { .. } => GesturePhase::Armed,
            Gesture::Dragging { .. } => GesturePhase::Dragging,
            Gesture::Resizing { .. } => GesturePhase::Resizing,
            Gesture::Panning { .. } => GesturePhase::Panning,
            Gesture::Settling => GesturePhase::Settling,
        }
    }

    /// Tile targeted by the active move or resize.
    pub fn active_tile(&self) -> Option<&TileId> {
        match &self.gesture {
            Gesture::Armed { tile, .. } | Gesture::Dragging { tile, .. } | Gesture::Resizing { tile, .. } => {
                Some(tile)
            }
            _ => None,
        }
    }

    /// Drop any gesture without emitting anything.
    pub fn reset(&mut self) {
        self.gesture = Gesture::Idle;
    }

    /// Process one event.
    pub fn handle(&mut self, event: PointerEvent, camera: &mut Camera, graph: &mut TileGraph) -> Vec<Interaction> {
        match event {
            PointerEvent::Down {
                position,
                target,
                button,
            } => self.on_down(position, target, button, graph),
            PointerEvent::Move { position } => self.on_move(position, camera, graph),
            PointerEvent::Up { .. } => self.finish(graph, true),
            PointerEvent::Cancel => self.finish(graph, false),
            PointerEvent::Wheel { position, delta_y } => self.on_wheel(position, delta_y, camera, graph),
            PointerEvent::Click { target, .. } => {
                if matches!(self.gesture, Gesture::Settling) {
                    self.gesture = Gesture::Idle;
                    vec![Interaction::ClickSwallowed]
                } else {
                    vec![Interaction::Clicked { target }]
                }
            }
            PointerEvent::Tick => {
                if matches!(self.gesture, Gesture::Settling) {
                    self.gesture = Gesture::Idle;
                }
                Vec::new()
            }
        }
    }

    fn on_down(
        &mut self,
        position: Point,
        target: PointerTarget,
        button: MouseButton,
        graph: &mut TileGraph,
    ) -> Vec<Interaction> {
        if button != MouseButton::Left {
            return Vec::new();
        }
        if !matches!(self.gesture, Gesture::Idle | Gesture::Settling) {
            log::debug!("Ignoring press during {:?}", self.phase());
            return Vec::new();
        }

        match target {
            PointerTarget::Tile(tile) => {
                let Some(origin) = graph.get(&tile).map(|t| t.position()) else {
                    return Vec::new();
                };
                graph.set_force_to_render(&tile, true);
                log::debug!("Armed move of {}", tile);
                self.gesture = Gesture::Armed {
                    tile: tile.clone(),
                    start: position,
                    origin,
                };
                vec![Interaction::MoveStarted { tile }]
            }
            PointerTarget::ResizeHandle(tile, handle) => {
                let Some(start_rect) = graph.get(&tile).map(|t| t.rect()) else {
                    return Vec::new();
                };
                graph.set_force_to_render(&tile, true);
                log::debug!("Resizing {} from {:?}", tile, handle);
                self.gesture = Gesture::Resizing {
                    tile: tile.clone(),
                    handle,
                    start: position,
                    start_rect,
                    resized: false,
                };
                vec![Interaction::ResizeStarted { tile, handle }]
            }
            PointerTarget::Background => {
                self.gesture = Gesture::Panning { last: position };
                vec![Interaction::BackgroundPressed]
            }
            PointerTarget::Connector(_) | PointerTarget::Chrome => {
                self.gesture = Gesture::Idle;
                Vec::new()
            }
        }
    }

    fn on_move(&mut self, position: Point, camera: &mut Camera, graph: &mut TileGraph) -> Vec<Interaction> {
        if let Gesture::Armed { tile, start, origin } = &self.gesture {
            let from_start = position - *start;
            if from_start.x.abs() < self.drag_threshold && from_start.y.abs() < self.drag_threshold {
                return Vec::new();
            }
            log::debug!("Dragging {}", tile);
            self.gesture = Gesture::Dragging {
                tile: tile.clone(),
                last: *start,
                current: *origin,
            };
        }

        let whole = self.round_to_whole_units;
        let round = move |v: f64| if whole { v.round() } else { v };
        match &mut self.gesture {
            Gesture::Dragging { tile, last, current } => {
                let delta = (position - *last) / camera.zoom;
                *last = position;
                *current += delta;
                let next = Point::new(round(current.x), round(current.y));
                if !graph.contains(tile) {
                    let tile = tile.clone();
                    self.gesture = Gesture::Idle;
                    log::debug!("Dragged tile {} disappeared", tile);
                    return Vec::new();
                }
                graph.set_tile_position(tile, next);
                vec![Interaction::TileMoved {
                    tile: tile.clone(),
                    position: next,
                }]
            }
            Gesture::Resizing {
                tile,
                handle,
                start,
                start_rect,
                resized,
            } => {
                let delta: Vec2 = (position - *start) / camera.zoom;
                let rect = resize_rect(*start_rect, *handle, delta, self.min_tile_size);
                let rect = Rect::new(round(rect.x0), round(rect.y0), round(rect.x1), round(rect.y1));
                if !graph.contains(tile) {
                    self.gesture = Gesture::Idle;
                    return Vec::new();
                }
                graph.set_tile_rect(tile, rect);
                *resized = true;
                vec![Interaction::TileResized {
                    tile: tile.clone(),
                    rect,
                }]
            }
            Gesture::Panning { last } => {
                camera.pan(position - *last);
                *last = position;
                vec![Interaction::Panned {
                    camera: camera.position,
                }]
            }
            Gesture::Idle | Gesture::Armed { .. } | Gesture::Settling => Vec::new(),
        }
    }

    /// End the active gesture. `released` distinguishes a real pointer-up
    /// (a click may follow) from a cancel.
    fn finish(&mut self, graph: &mut TileGraph, released: bool) -> Vec<Interaction> {
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Armed { tile, .. } => {
                graph.set_force_to_render(&tile, false);
                vec![Interaction::MoveEnded { tile, dragged: false }]
            }
            Gesture::Dragging { tile, .. } => {
                graph.touch_position(&tile);
                graph.set_force_to_render(&tile, false);
                if released {
                    self.gesture = Gesture::Settling;
                }
                vec![Interaction::MoveEnded { tile, dragged: true }]
            }
            Gesture::Resizing {
                tile, handle, resized, ..
            } => {
                if resized {
                    graph.touch_size(&tile);
                    if handle.has_west() || handle.has_north() {
                        graph.touch_position(&tile);
                    }
                }
                graph.set_force_to_render(&tile, false);
                vec![Interaction::ResizeEnded { tile, resized }]
            }
            Gesture::Panning { .. } => vec![Interaction::PanEnded],
            Gesture::Settling => {
                self.gesture = Gesture::Settling;
                Vec::new()
            }
            Gesture::Idle => Vec::new(),
        }
    }

    fn on_wheel(&mut self, position: Point, delta_y: f64, camera: &mut Camera, graph: &mut TileGraph) -> Vec<Interaction> {
        if delta_y == 0.0 || !delta_y.is_finite() {
            return Vec::new();
        }
        let step = if delta_y < 0.0 { self.wheel_step } else { -self.wheel_step };
        if !camera.zoom_at(position, step) {
            return Vec::new();
        }
        graph.apply_zoom(camera.zoom);
        vec![Interaction::Zoomed {
            zoom: camera.zoom,
            camera: camera.position,
        }]
    }
}
