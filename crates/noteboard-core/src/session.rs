//! One open board: its camera, tiles, gesture state and save bookkeeping.

use crate::api::{ApiResult, BoardApi, NewTile, PendingSave, SaveBatch, SaveReport, SaveResults, Saved, SyncAdapter, TileRecord};
use crate::camera::Camera;
use crate::config::BoardConfig;
use crate::connector::{Connector, ConnectorId};
use crate::document::RichDoc;
use crate::graph::TileGraph;
use crate::handles::{HANDLE_HIT_TOLERANCE, hit_test_handles};
use crate::input::{Interaction, InteractionController, PointerEvent, PointerTarget};
use crate::tile::{Tile, TileId};
use kurbo::{Affine, Point, Rect, Size, Vec2};
use std::collections::HashSet;

/// Default viewport until the host reports one.
const DEFAULT_VIEWPORT: Size = Size::new(1280.0, 800.0);

/// Everything that belongs to the currently open board.
///
/// Loads and saves are split into a synchronous begin step, an async
/// transport step the host drives, and a synchronous finish step. Each
/// board switch bumps the epoch; finish steps carrying an older epoch are
/// dropped.
#[derive(Debug, Clone)]
pub struct BoardSession {
    config: BoardConfig,
    camera: Camera,
    graph: TileGraph,
    controller: InteractionController,
    viewport: Size,
    board_id: Option<String>,
    epoch: u64,
    /// Tile driving the toolbar; kept rendered while pinned.
    toolbar_tile: Option<TileId>,
    /// Tiles whose create request is in flight.
    creating: HashSet<TileId>,
}

impl Default for BoardSession {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}

impl BoardSession {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            camera: Camera::with_config(&config),
            graph: TileGraph::new(&config),
            controller: InteractionController::new(&config),
            config,
            viewport: DEFAULT_VIEWPORT,
            board_id: None,
            epoch: 0,
            toolbar_tile: None,
            creating: HashSet::new(),
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn graph(&self) -> &TileGraph {
        &self.graph
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn board_id(&self) -> Option<&str> {
        self.board_id.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn toolbar_tile(&self) -> Option<&TileId> {
        self.toolbar_tile.as_ref()
    }

    /// Forget the current board entirely.
    pub fn reset(&mut self) {
        self.graph.reset();
        self.camera.reset();
        self.controller.reset();
        self.toolbar_tile = None;
        self.creating.clear();
        self.board_id = None;
        self.epoch += 1;
    }

    /// Clear the previous board and return the epoch the load must finish in.
    pub fn begin_board_switch(&mut self, board_id: &str) -> u64 {
        self.reset();
        self.board_id = Some(board_id.to_string());
        log::info!("Switching to board {}", board_id);
        self.epoch
    }

    /// Populate the board from fetched records. Returns false if a newer
    /// switch happened in the meantime.
    pub fn finish_board_load(&mut self, epoch: u64, records: Vec<TileRecord>) -> bool {
        if epoch != self.epoch {
            log::warn!("Discarding tiles loaded for a previous board (epoch {} != {})", epoch, self.epoch);
            return false;
        }
        for record in &records {
            self.graph.add_tile(record);
        }
        self.graph.rebuild_connectors();
        self.graph.apply_zoom(self.camera.zoom);

        if let Some(first) = self.graph.first().map(|t| t.id().clone()) {
            self.center_on_tile(&first);
        }
        log::info!(
            "Loaded {} tiles ({} unresolved links)",
            self.graph.len(),
            self.graph.pending_links().len()
        );
        true
    }

    /// Switch and load in one step, for records already at hand.
    pub fn load_board(&mut self, board_id: &str, records: Vec<TileRecord>) -> bool {
        let epoch = self.begin_board_switch(board_id);
        self.finish_board_load(epoch, records)
    }

    /// Switch to `board_id` and fetch its tiles.
    pub async fn open_board<A: BoardApi>(&mut self, sync: &SyncAdapter<A>, board_id: &str) -> ApiResult<bool> {
        let epoch = self.begin_board_switch(board_id);
        let records = sync.load(board_id).await?;
        Ok(self.finish_board_load(epoch, records))
    }

    /// Feed a pointer event through the gesture recognizer.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> Vec<Interaction> {
        let interactions = self.controller.handle(event, &mut self.camera, &mut self.graph);
        for interaction in &interactions {
            match interaction {
                Interaction::BackgroundPressed => self.clear_toolbar(),
                Interaction::MoveEnded { tile, .. } | Interaction::ResizeEnded { tile, .. } => {
                    if self.toolbar_tile.as_ref() == Some(tile) {
                        self.graph.set_force_to_render(tile, true);
                    }
                }
                _ => {}
            }
        }
        interactions
    }

    /// Resolve what lies under a screen point: resize handles first, then
    /// tile bodies front to back, then connectors.
    pub fn target_at(&self, screen: Point) -> PointerTarget {
        let world = self.camera.screen_to_world(screen);
        let tolerance = HANDLE_HIT_TOLERANCE / self.camera.zoom;
        for tile in self.graph.tiles_front_to_back() {
            let rect = tile.rect();
            if let Some(handle) = hit_test_handles(rect, world, tolerance) {
                return PointerTarget::ResizeHandle(tile.id().clone(), handle);
            }
            if rect.contains(world) {
                return PointerTarget::Tile(tile.id().clone());
            }
        }
        self.graph
            .connectors()
            .find(|c| c.has_direction() && c.bounds().inflate(tolerance, tolerance).contains(world))
            .map(|c| PointerTarget::Connector(c.id()))
            .unwrap_or(PointerTarget::Background)
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    pub fn is_tile_visible(&self, id: &TileId) -> bool {
        self.graph
            .get(id)
            .is_some_and(|tile| self.camera.is_visible(tile, self.viewport))
    }

    /// Tiles to mount, back to front.
    pub fn visible_tiles(&self) -> Vec<&Tile> {
        self.graph
            .tiles()
            .filter(|tile| self.camera.is_visible(*tile, self.viewport))
            .collect()
    }

    /// Connectors to draw. Direction-less and fully faded ones are skipped.
    pub fn visible_connectors(&self) -> Vec<&Connector> {
        self.graph
            .connectors()
            .filter(|c| c.has_direction() && c.opacity() > 0.0)
            .filter(|c| self.camera.is_visible(*c, self.viewport))
            .collect()
    }

    pub fn world_transform(&self) -> Affine {
        self.camera.transform()
    }

    pub fn background_offset(&self) -> Vec2 {
        self.camera.background_offset()
    }

    /// Frame a tile in the viewport.
    pub fn center_on_tile(&mut self, id: &TileId) -> bool {
        let Some(rect) = self.graph.get(id).map(Tile::rect) else {
            return false;
        };
        let margins = (self.config.center_margin_h, self.config.center_margin_w);
        self.camera.center_on_item(rect, self.viewport, margins);
        self.graph.apply_zoom(self.camera.zoom);
        true
    }

    /// Fit every tile into the viewport. Returns false on an empty board.
    pub fn fit_board(&mut self, padding: f64) -> bool {
        let Some(bounds) = self.graph.bounds() else {
            return false;
        };
        self.camera.fit_to_bounds(bounds, self.viewport, padding);
        self.graph.apply_zoom(self.camera.zoom);
        true
    }

    /// Frame a tile and give it the toolbar.
    pub fn move_to_item(&mut self, id: &TileId) -> bool {
        if !self.center_on_tile(id) {
            return false;
        }
        self.focus_toolbar(id);
        true
    }

    /// Hand the toolbar to a tile, keeping it rendered while pinned.
    pub fn focus_toolbar(&mut self, id: &TileId) {
        if !self.graph.contains(id) {
            return;
        }
        self.clear_toolbar();
        self.graph.set_force_to_render(id, true);
        self.toolbar_tile = Some(id.clone());
    }

    pub fn clear_toolbar(&mut self) {
        if let Some(previous) = self.toolbar_tile.take() {
            if self.controller.active_tile() != Some(&previous) {
                self.graph.set_force_to_render(&previous, false);
            }
        }
    }

    /// Create a local tile at `position`. An empty name gets the default title.
    pub fn create_tile(&mut self, position: Point, name: RichDoc, content: RichDoc) -> TileId {
        let name = if name.is_empty() {
            RichDoc::plain_text(&self.config.default_tile_title)
        } else {
            name
        };
        let rect = Rect::from_origin_size(position, self.config.default_tile_size);
        let tile = Tile::new(rect, name, content);
        let id = tile.id().clone();
        self.graph.insert_tile(tile, &[]);
        log::debug!("Created tile {}", id);
        id
    }

    pub fn link_tiles(&mut self, a: &TileId, b: &TileId) -> Option<ConnectorId> {
        self.graph.add_connectors(a, b)
    }

    pub fn unlink(&mut self, id: ConnectorId) -> bool {
        self.graph.remove_connector(id)
    }

    pub fn remove_tile(&mut self, id: &TileId) -> bool {
        if self.toolbar_tile.as_ref() == Some(id) {
            self.toolbar_tile = None;
        }
        if self.controller.active_tile() == Some(id) {
            self.controller.reset();
        }
        self.creating.remove(id);
        self.graph.remove_tile(id).is_some()
    }

    pub fn set_tile_name(&mut self, id: &TileId, name: RichDoc) -> bool {
        self.graph.set_tile_name(id, name)
    }

    pub fn set_tile_content(&mut self, id: &TileId, content: RichDoc) -> bool {
        self.graph.set_tile_content(id, content)
    }

    pub fn set_connector_footprint(&mut self, owner: &TileId, id: ConnectorId, size: Size) -> bool {
        self.graph.set_connector_footprint(owner, id, size)
    }

    /// Snapshot everything unsaved into requests. Nothing is cleared yet.
    pub fn begin_save(&mut self) -> SaveBatch {
        let Some(board_id) = self.board_id.clone() else {
            return SaveBatch {
                epoch: self.epoch,
                items: Vec::new(),
            };
        };

        let mut items = Vec::new();
        for diff in self.graph.diff() {
            match diff.server_id {
                Some(server_id) => items.push(PendingSave::Patch {
                    changes: diff.changes,
                    server_id,
                    fields: diff.fields,
                }),
                None => {
                    if self.creating.contains(&diff.tile) {
                        continue;
                    }
                    let Some(tile) = self.graph.get(&diff.tile) else {
                        continue;
                    };
                    let payload = NewTile {
                        board_id: board_id.clone(),
                        name: tile.name().clone(),
                        content: tile.content().clone(),
                        x: tile.x(),
                        y: tile.y(),
                        width: tile.width(),
                        height: tile.height(),
                        related_ids: diff.fields.topics_to_be_added.unwrap_or_default(),
                    };
                    self.creating.insert(diff.tile.clone());
                    items.push(PendingSave::Create {
                        changes: diff.changes,
                        payload,
                    });
                }
            }
        }
        SaveBatch {
            epoch: self.epoch,
            items,
        }
    }

    /// Apply save results: acknowledge what went through, keep the rest dirty.
    pub fn finish_save(&mut self, results: SaveResults) -> SaveReport {
        let mut report = SaveReport::default();
        if results.epoch != self.epoch {
            log::warn!("Discarding save results for a previous board (epoch {})", results.epoch);
            report.discarded = true;
            return report;
        }

        for outcome in results.outcomes {
            let tile = outcome.changes.tile.clone();
            match outcome.result {
                Ok(saved) => {
                    if let Saved::Created(server_id) = saved {
                        self.creating.remove(&tile);
                        self.graph.assign_server_id(&tile, server_id);
                    }
                    self.graph.acknowledge(&outcome.changes);
                    report.saved += 1;
                }
                Err(_) => {
                    self.creating.remove(&tile);
                    report.failed.push(tile);
                }
            }
        }
        log::info!("Saved {} tiles, {} failed", report.saved, report.failed.len());
        report
    }

    /// Save every unsaved tile through `sync`.
    pub async fn save<A: BoardApi>(&mut self, sync: &SyncAdapter<A>) -> SaveReport {
        let batch = self.begin_save();
        if batch.is_empty() {
            return SaveReport::default();
        }
        let results = sync.push(batch).await;
        self.finish_save(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, x: f64, related: &[&str]) -> TileRecord {
        TileRecord {
            id: id.to_string(),
            x,
            y: 0.0,
            width: 200.0,
            height: 100.0,
            name: RichDoc::plain_text(id),
            content: RichDoc::default(),
            related_ids: related.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn id(s: &str) -> TileId {
        TileId::from(s)
    }

    #[test]
    fn test_load_centers_on_first_tile() {
        let mut session = BoardSession::default();
        session.set_viewport(Size::new(1000.0, 500.0));
        assert!(session.load_board("b1", vec![record("a", 0.0, &[]), record("b", 400.0, &["a"])]));

        // min(500/100 - 0.3, 1000/200 - 0.4) = 4.6
        assert!((session.camera().zoom - 4.6).abs() < 1e-9);
        let center = session.camera().screen_to_world(Point::new(500.0, 250.0));
        assert!((center.x - 100.0).abs() < 1e-9);
        assert!((center.y - 50.0).abs() < 1e-9);
        assert_eq!(session.graph().connectors().count(), 2);
    }

    #[test]
    fn test_stale_load_discarded() {
        let mut session = BoardSession::default();
        let first = session.begin_board_switch("b1");
        let second = session.begin_board_switch("b2");
        assert!(!session.finish_board_load(first, vec![record("old", 0.0, &[])]));
        assert!(session.graph().is_empty());
        assert!(session.finish_board_load(second, vec![record("new", 0.0, &[])]));
        assert!(session.graph().contains(&id("new")));
    }

    #[test]
    fn test_board_switch_leaves_nothing_behind() {
        let mut session = BoardSession::default();
        session.load_board(
            "b1",
            vec![
                record("a", 0.0, &["b", "ghost"]),
                record("b", 400.0, &["c"]),
                record("c", 800.0, &[]),
            ],
        );
        assert_eq!(session.graph().connectors().count(), 4);
        session.focus_toolbar(&id("a"));
        session.handle_pointer(PointerEvent::Down {
            position: Point::ZERO,
            target: PointerTarget::Background,
            button: Default::default(),
        });

        session.load_board("b2", vec![record("c", 0.0, &[])]);
        assert_eq!(session.graph().len(), 1);
        assert!(!session.graph().contains(&id("a")));
        assert_eq!(session.graph().connectors().count(), 0);
        assert!(session.graph().pending_links().is_empty());
        assert!(session.toolbar_tile().is_none());
        assert_eq!(session.controller().phase(), crate::input::GesturePhase::Idle);
    }

    #[test]
    fn test_create_tile_uses_default_title() {
        let mut session = BoardSession::default();
        session.load_board("b1", Vec::new());
        let tile = session.create_tile(Point::new(10.0, 20.0), RichDoc::default(), RichDoc::default());
        let tile = session.graph().get(&tile).unwrap();
        assert_eq!(tile.name(), &RichDoc::plain_text("New topic"));
        assert_eq!(tile.rect(), Rect::new(10.0, 20.0, 330.0, 260.0));
        assert!(tile.to_be_updated());
    }

    #[test]
    fn test_toolbar_pin_survives_drag() {
        let mut session = BoardSession::default();
        session.load_board("b1", vec![record("a", 0.0, &[])]);
        assert!(session.move_to_item(&id("a")));
        assert!(session.graph().get(&id("a")).unwrap().force_to_render());

        session.handle_pointer(PointerEvent::Down {
            position: Point::ZERO,
            target: PointerTarget::Tile(id("a")),
            button: Default::default(),
        });
        session.handle_pointer(PointerEvent::Up { position: Point::ZERO });
        assert!(session.graph().get(&id("a")).unwrap().force_to_render());

        session.handle_pointer(PointerEvent::Down {
            position: Point::ZERO,
            target: PointerTarget::Background,
            button: Default::default(),
        });
        assert!(session.toolbar_tile().is_none());
        assert!(!session.graph().get(&id("a")).unwrap().force_to_render());
    }

    #[test]
    fn test_forced_tile_visible_off_screen() {
        let mut session = BoardSession::default();
        session.set_viewport(Size::new(800.0, 600.0));
        session.load_board("b1", vec![record("a", 0.0, &[]), record("far", 10_000.0, &[])]);
        assert!(!session.is_tile_visible(&id("far")));
        session.focus_toolbar(&id("far"));
        assert!(session.is_tile_visible(&id("far")));
        assert_eq!(session.visible_tiles().len(), 2);
    }

    #[test]
    fn test_target_at_prefers_handles() {
        let mut session = BoardSession::default();
        session.load_board("b1", vec![record("a", 0.0, &[])]);
        let zoom = session.camera().zoom;

        let corner = session.camera().world_to_screen(Point::new(200.0, 100.0));
        assert_eq!(
            session.target_at(corner),
            PointerTarget::ResizeHandle(id("a"), crate::handles::ResizeHandle::SE)
        );
        let inside = session.camera().world_to_screen(Point::new(60.0, 40.0));
        assert_eq!(session.target_at(inside), PointerTarget::Tile(id("a")));
        let outside = session.camera().world_to_screen(Point::new(-100.0 / zoom - 50.0, 50.0));
        assert_eq!(session.target_at(outside), PointerTarget::Background);
    }

    #[test]
    fn test_fit_board_shows_every_tile() {
        let mut session = BoardSession::default();
        session.set_viewport(Size::new(800.0, 600.0));
        assert!(!session.fit_board(0.0));

        session.load_board(
            "b1",
            vec![record("a", 0.0, &[]), record("b", 1000.0, &[]), record("far", 3000.0, &[])],
        );
        assert!(!session.is_tile_visible(&id("far")));
        assert!(session.fit_board(20.0));
        assert_eq!(session.visible_tiles().len(), 3);
        assert!((session.camera().zoom - 760.0 / 3200.0).abs() < 1e-12);
    }

    #[test]
    fn test_removing_dragged_tile_resets_gesture() {
        let mut session = BoardSession::default();
        session.load_board("b1", vec![record("a", 0.0, &[]), record("b", 400.0, &["a"])]);
        session.handle_pointer(PointerEvent::Down {
            position: Point::ZERO,
            target: PointerTarget::Tile(id("a")),
            button: Default::default(),
        });
        session.handle_pointer(PointerEvent::Move {
            position: Point::new(50.0, 0.0),
        });
        assert_eq!(session.controller().phase(), crate::input::GesturePhase::Dragging);

        assert!(session.remove_tile(&id("a")));
        assert_eq!(session.controller().phase(), crate::input::GesturePhase::Idle);
        assert!(session.controller().active_tile().is_none());
        let out = session.handle_pointer(PointerEvent::Move {
            position: Point::new(90.0, 0.0),
        });
        assert!(out.is_empty());
        assert!(session.graph().get(&id("b")).unwrap().connectors().is_empty());
    }

    #[test]
    fn test_removing_toolbar_tile_clears_toolbar() {
        let mut session = BoardSession::default();
        session.load_board("b1", vec![record("a", 0.0, &[]), record("b", 400.0, &[])]);
        assert!(session.move_to_item(&id("b")));
        assert_eq!(session.toolbar_tile(), Some(&id("b")));

        assert!(session.remove_tile(&id("a")));
        assert_eq!(session.toolbar_tile(), Some(&id("b")));
        assert!(session.remove_tile(&id("b")));
        assert!(session.toolbar_tile().is_none());
        assert!(!session.remove_tile(&id("b")));
    }

    #[test]
    fn test_begin_save_without_board_is_empty() {
        let mut session = BoardSession::default();
        session.create_tile(Point::ZERO, RichDoc::default(), RichDoc::default());
        assert!(session.begin_save().is_empty());
    }

    #[test]
    fn test_create_not_resent_while_in_flight() {
        let mut session = BoardSession::default();
        session.load_board("b1", Vec::new());
        session.create_tile(Point::ZERO, RichDoc::default(), RichDoc::default());
        assert_eq!(session.begin_save().len(), 1);
        assert!(session.begin_save().is_empty());
    }
}
