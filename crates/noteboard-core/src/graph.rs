//! The board's tiles and the connectors between them.

use crate::api::{TileFields, TileRecord};
use crate::config::BoardConfig;
use crate::connector::{Connector, ConnectorId};
use crate::document::RichDoc;
use crate::tile::{ChangeSet, Tile, TileId};
use kurbo::{Point, Rect, Size};
use std::collections::HashMap;

/// Minimal save payload for one dirty tile.
#[derive(Debug, Clone)]
pub struct TileDiff {
    pub tile: TileId,
    /// `None` when the tile still has to be created.
    pub server_id: Option<String>,
    /// What a successful save acknowledges. Deferred relations are left out.
    pub changes: ChangeSet,
    pub fields: TileFields,
}

/// Tiles keyed by id, kept in insertion order (back to front).
#[derive(Debug, Clone)]
pub struct TileGraph {
    tiles: HashMap<TileId, Tile>,
    order: Vec<TileId>,
    /// Relations declared toward tiles that are not loaded yet, keyed by the
    /// missing id. Resolved when that tile arrives.
    pending_links: HashMap<TileId, Vec<TileId>>,
    /// Server ids of removed tiles, so pending removals still resolve.
    retired: HashMap<TileId, String>,
    shift: f64,
    footprint: Size,
    zoom: f64,
}

impl Default for TileGraph {
    fn default() -> Self {
        Self::new(&BoardConfig::default())
    }
}

impl TileGraph {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            tiles: HashMap::new(),
            order: Vec::new(),
            pending_links: HashMap::new(),
            retired: HashMap::new(),
            shift: config.connector_shift,
            footprint: config.connector_size,
            zoom: 1.0,
        }
    }

    /// Get a tile by ID.
    pub fn get(&self, id: &TileId) -> Option<&Tile> {
        self.tiles.get(id)
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.tiles.contains_key(id)
    }

    /// Get tiles in insertion order (back to front).
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.order.iter().filter_map(|id| self.tiles.get(id))
    }

    /// Get tiles front to back, for hit testing.
    pub fn tiles_front_to_back(&self) -> impl Iterator<Item = &Tile> {
        self.order.iter().rev().filter_map(|id| self.tiles.get(id))
    }

    pub fn first(&self) -> Option<&Tile> {
        self.tiles().next()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Topmost tile containing a world point.
    pub fn tile_at(&self, point: Point) -> Option<&TileId> {
        self.order
            .iter()
            .rev()
            .find(|id| self.tiles.get(*id).is_some_and(|t| t.rect().contains(point)))
    }

    /// Get the bounding box of all tiles.
    pub fn bounds(&self) -> Option<Rect> {
        self.tiles().map(Tile::rect).reduce(|acc, r| acc.union(r))
    }

    pub fn pending_links(&self) -> &HashMap<TileId, Vec<TileId>> {
        &self.pending_links
    }

    /// Every connector, both directions, in tile order.
    pub fn connectors(&self) -> impl Iterator<Item = &Connector> {
        self.tiles().flat_map(|t| t.connectors().iter())
    }

    /// Run `f` on two distinct tiles at once.
    fn with_pair<R>(&mut self, a: &TileId, b: &TileId, f: impl FnOnce(&mut Tile, &mut Tile) -> R) -> Option<R> {
        if a == b {
            return None;
        }
        let mut first = self.tiles.remove(a)?;
        let result = self.tiles.get_mut(b).map(|second| f(&mut first, second));
        self.tiles.insert(a.clone(), first);
        result
    }

    /// Link two tiles whose relation is already persisted.
    fn link_persisted(&mut self, a: &TileId, b: &TileId) {
        let (footprint, shift) = (self.footprint, self.shift);
        if self.with_pair(a, b, |ta, tb| ta.link_with(tb, footprint, shift)).is_some() {
            self.apply_zoom_to(a);
            self.apply_zoom_to(b);
        }
    }

    fn apply_zoom_to(&mut self, id: &TileId) {
        let zoom = self.zoom;
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.apply_zoom(zoom);
        }
    }

    /// Insert a tile loaded from the server, linking its persisted relations.
    pub fn add_tile(&mut self, record: &TileRecord) -> TileId {
        let tile = Tile::persisted(&record.id, record.rect(), record.name.clone(), record.content.clone());
        let related: Vec<TileId> = record.related_ids.iter().map(|id| TileId::from(id.as_str())).collect();
        let id = tile.id().clone();
        self.insert_tile(tile, &related);
        id
    }

    /// Insert a tile together with relations that already exist remotely.
    ///
    /// Tiles waiting on this id get linked now. Relations toward tiles not
    /// loaded yet are parked in the pending-link table. Returns false (and
    /// changes nothing) if the id is taken.
    pub fn insert_tile(&mut self, tile: Tile, related: &[TileId]) -> bool {
        let id = tile.id().clone();
        if self.tiles.contains_key(&id) {
            log::warn!("Ignoring duplicate tile {}", id);
            return false;
        }
        self.order.push(id.clone());
        self.tiles.insert(id.clone(), tile);

        if let Some(waiters) = self.pending_links.remove(&id) {
            for waiter in waiters {
                log::debug!("Resolved pending link {} -> {}", waiter, id);
                self.link_persisted(&waiter, &id);
            }
        }

        for other in related {
            if other.as_str().is_empty() || *other == id {
                continue;
            }
            if self.tiles.contains_key(other) {
                self.link_persisted(&id, other);
            } else {
                let waiters = self.pending_links.entry(other.clone()).or_default();
                if !waiters.contains(&id) {
                    waiters.push(id.clone());
                }
            }
        }
        self.apply_zoom_to(&id);
        true
    }

    /// Link two tiles and record the relation for the next save.
    pub fn add_connectors(&mut self, a: &TileId, b: &TileId) -> Option<ConnectorId> {
        let (footprint, shift, zoom) = (self.footprint, self.shift, self.zoom);
        let id = self.with_pair(a, b, |ta, tb| {
            let id = ta.add_connectors(tb, footprint, shift);
            ta.apply_zoom(zoom);
            tb.apply_zoom(zoom);
            id
        })?;
        log::debug!("Linked {} <-> {} ({})", a, b, id);
        Some(id)
    }

    /// The two tiles joined by a connector.
    pub fn find_connector(&self, id: ConnectorId) -> Option<(TileId, TileId)> {
        self.tiles().find_map(|tile| {
            tile.connector(id)
                .map(|c| (c.item_a().clone(), c.item_b().clone()))
        })
    }

    /// Remove both halves of a connector and record the removal for the next save.
    pub fn remove_connector(&mut self, id: ConnectorId) -> bool {
        let Some((a, b)) = self.find_connector(id) else {
            return false;
        };
        let removed = self
            .with_pair(&a, &b, |ta, tb| ta.remove_connector(tb, id))
            .unwrap_or(false);
        if removed {
            log::debug!("Unlinked {} <-> {} ({})", a, b, id);
        }
        removed
    }

    /// Remove a tile and every connector referencing it.
    ///
    /// Peers record the relation as removed only if the tile was persisted;
    /// otherwise the server never knew about it.
    pub fn remove_tile(&mut self, id: &TileId) -> Option<Tile> {
        let tile = self.tiles.remove(id)?;
        self.order.retain(|t| t != id);

        let persisted = tile.server_id().map(str::to_string);
        for peer in self.tiles.values_mut() {
            let linked = peer.detach_from(id);
            match (&persisted, linked) {
                (Some(_), true) => peer.record_removed(id),
                (None, _) => peer.forget_relation(id),
                (Some(_), false) => {}
            }
        }
        if let Some(server_id) = persisted {
            self.retired.insert(id.clone(), server_id);
        }

        self.pending_links.remove(id);
        self.pending_links.retain(|_, waiters| {
            waiters.retain(|w| w != id);
            !waiters.is_empty()
        });
        Some(tile)
    }

    /// Move a tile. Connectors of the tile and its peers follow.
    pub fn set_tile_position(&mut self, id: &TileId, position: Point) -> bool {
        let changed = self.tiles.get_mut(id).is_some_and(|t| t.set_position(position));
        if changed {
            self.refresh_around(id);
        }
        changed
    }

    pub fn set_tile_size(&mut self, id: &TileId, size: Size) -> bool {
        let changed = self.tiles.get_mut(id).is_some_and(|t| t.set_size(size));
        if changed {
            self.refresh_around(id);
        }
        changed
    }

    pub fn set_tile_rect(&mut self, id: &TileId, rect: Rect) -> bool {
        let changed = self.tiles.get_mut(id).is_some_and(|t| t.set_rect(rect));
        if changed {
            self.refresh_around(id);
        }
        changed
    }

    /// Flag the position as changed even if it is not.
    pub fn touch_position(&mut self, id: &TileId) {
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.update_position(tile.x(), tile.y());
            self.refresh_around(id);
        }
    }

    /// Flag the size as changed even if it is not.
    pub fn touch_size(&mut self, id: &TileId) {
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.update_size(tile.width(), tile.height());
            self.refresh_around(id);
        }
    }

    pub fn set_tile_name(&mut self, id: &TileId, name: RichDoc) -> bool {
        self.tiles.get_mut(id).is_some_and(|t| t.set_name(name))
    }

    pub fn set_tile_content(&mut self, id: &TileId, content: RichDoc) -> bool {
        self.tiles.get_mut(id).is_some_and(|t| t.set_content(content))
    }

    pub fn set_force_to_render(&mut self, id: &TileId, force: bool) {
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.set_force_to_render(force);
        }
    }

    /// Recompute the connectors owned by `id` and the ones pointing at it.
    pub fn refresh_around(&mut self, id: &TileId) {
        let Some(tile) = self.tiles.get(id) else {
            return;
        };
        let rect = tile.rect();
        let peers: Vec<TileId> = tile.peers().cloned().collect();
        let rects: HashMap<TileId, Rect> = peers
            .iter()
            .filter_map(|p| self.tiles.get(p).map(|t| (p.clone(), t.rect())))
            .collect();

        let shift = self.shift;
        if let Some(tile) = self.tiles.get_mut(id) {
            tile.refresh_connectors(shift, |p| rects.get(p).copied());
        }
        for peer in &peers {
            if let Some(tile) = self.tiles.get_mut(peer) {
                tile.refresh_connectors(shift, |other| (other == id).then_some(rect));
            }
        }
    }

    /// Recompute every connector from current tile geometry.
    pub fn rebuild_connectors(&mut self) {
        let rects: HashMap<TileId, Rect> = self.tiles.iter().map(|(id, t)| (id.clone(), t.rect())).collect();
        let shift = self.shift;
        for tile in self.tiles.values_mut() {
            tile.refresh_connectors(shift, |p| rects.get(p).copied());
        }
    }

    /// Update connector opacity for a new camera zoom.
    pub fn apply_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
        for tile in self.tiles.values_mut() {
            tile.apply_zoom(zoom);
        }
    }

    /// Record a renderer-measured footprint and re-anchor that connector half.
    pub fn set_connector_footprint(&mut self, owner: &TileId, id: ConnectorId, size: Size) -> bool {
        let Some(target) = self
            .tiles
            .get(owner)
            .and_then(|t| t.connector(id))
            .map(|c| c.item_b().clone())
        else {
            return false;
        };
        let Some(b_rect) = self.tiles.get(&target).map(Tile::rect) else {
            return false;
        };
        let shift = self.shift;
        let Some(tile) = self.tiles.get_mut(owner) else {
            return false;
        };
        let a_rect = tile.rect();
        match tile.connector_mut(id) {
            Some(connector) => {
                connector.set_footprint(size);
                connector.refresh(a_rect, b_rect, shift);
                true
            }
            None => false,
        }
    }

    /// Persisted id for a client id, if the tile has been saved.
    pub fn resolve_id(&self, id: &TileId) -> Option<String> {
        match self.tiles.get(id) {
            Some(tile) => tile.server_id().map(str::to_string),
            None => self.retired.get(id).cloned(),
        }
    }

    /// Minimal payloads for every tile with unsaved changes.
    ///
    /// Unpersisted tiles carry a full snapshot. Relations toward tiles that
    /// have no server id yet stay pending for a later save.
    pub fn diff(&self) -> Vec<TileDiff> {
        self.tiles()
            .filter(|tile| tile.to_be_updated())
            .filter_map(|tile| {
                let mut changes = if tile.is_persisted() {
                    tile.changes()
                } else {
                    tile.full_snapshot()
                };
                let before = changes.added.len() + changes.removed.len();
                changes.added.retain(|r| self.resolve_id(&r.value).is_some());
                changes.removed.retain(|r| self.resolve_id(&r.value).is_some());
                let deferred = before - changes.added.len() - changes.removed.len();
                if deferred > 0 {
                    log::debug!("Deferring {} relations of {}", deferred, tile.id());
                }
                if changes.is_empty() {
                    return None;
                }
                let fields = TileFields::from_changes(&changes, |id| self.resolve_id(id));
                Some(TileDiff {
                    tile: tile.id().clone(),
                    server_id: tile.server_id().map(str::to_string),
                    changes,
                    fields,
                })
            })
            .collect()
    }

    /// Clear what a successful save carried.
    pub fn acknowledge(&mut self, changes: &ChangeSet) -> bool {
        match self.tiles.get_mut(&changes.tile) {
            Some(tile) => {
                tile.acknowledge(changes);
                true
            }
            None => false,
        }
    }

    pub fn assign_server_id(&mut self, id: &TileId, server_id: String) -> bool {
        self.tiles.get_mut(id).is_some_and(|t| t.set_server_id(server_id))
    }

    /// Drop every tile, connector and pending link.
    pub fn reset(&mut self) {
        self.tiles.clear();
        self.order.clear();
        self.pending_links.clear();
        self.retired.clear();
        self.zoom = 1.0;
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
            width: 100.0,
            height: 100.0,
            name: RichDoc::plain_text(id),
            content: RichDoc::default(),
            related_ids: related.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn id(s: &str) -> TileId {
        TileId::from(s)
    }

    fn local_tile(x: f64) -> Tile {
        Tile::new(
            Rect::new(x, 0.0, x + 100.0, 100.0),
            RichDoc::plain_text("local"),
            RichDoc::default(),
        )
    }

    #[test]
    fn test_forward_reference_resolves_on_arrival() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &["b"]));
        assert_eq!(graph.pending_links().get(&id("b")), Some(&vec![id("a")]));
        assert_eq!(graph.connectors().count(), 0);

        graph.add_tile(&record("b", 500.0, &["a"]));
        assert!(graph.pending_links().is_empty());
        assert_eq!(graph.connectors().count(), 2);

        let a = graph.get(&id("a")).unwrap();
        let b = graph.get(&id("b")).unwrap();
        let forward = a.connector_to(&id("b")).unwrap();
        let backward = b.connector_to(&id("a")).unwrap();
        assert_eq!(forward.id(), backward.id());
        // loaded relations are not pending
        assert!(!a.to_be_updated() && !b.to_be_updated());
    }

    #[test]
    fn test_self_and_empty_relations_skipped() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &["a", ""]));
        assert!(graph.pending_links().is_empty());
        assert_eq!(graph.connectors().count(), 0);
    }

    #[test]
    fn test_duplicate_insert_ignored() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &[]));
        graph.add_tile(&record("a", 300.0, &[]));
        assert_eq!(graph.len(), 1);
        assert!(graph.get(&id("a")).unwrap().x().abs() < f64::EPSILON);
    }

    #[test]
    fn test_moving_tile_refreshes_peer_connectors() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &["b"]));
        graph.add_tile(&record("b", 500.0, &[]));

        assert!(graph.set_tile_position(&id("b"), Point::new(0.0, 500.0)));
        let forward = graph.get(&id("a")).unwrap().connector_to(&id("b")).unwrap();
        // b is now straight below a
        assert!((forward.anchor().x - 50.0).abs() < 1e-9);
        assert!((forward.anchor().y - 120.0).abs() < 1e-9);
        let backward = graph.get(&id("b")).unwrap().connector_to(&id("a")).unwrap();
        assert!((backward.anchor().y - 480.0).abs() < 1e-9);
    }

    #[test]
    fn test_link_and_unlink() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &[]));
        graph.add_tile(&record("b", 500.0, &[]));

        let cid = graph.add_connectors(&id("a"), &id("b")).unwrap();
        assert_eq!(graph.find_connector(cid), Some((id("a"), id("b"))));
        assert!(graph.add_connectors(&id("a"), &id("a")).is_none());
        assert!(graph.add_connectors(&id("a"), &id("zzz")).is_none());

        assert!(graph.remove_connector(cid));
        assert!(!graph.remove_connector(cid));
        assert!(graph.get(&id("a")).unwrap().is_pending_remove(&id("b")));
        assert_eq!(graph.connectors().count(), 0);
    }

    #[test]
    fn test_remove_persisted_tile_records_removal() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &["b"]));
        graph.add_tile(&record("b", 500.0, &[]));
        graph.add_tile(&record("c", 900.0, &["x"]));

        graph.remove_tile(&id("b"));
        let a = graph.get(&id("a")).unwrap();
        assert!(a.connectors().is_empty());
        assert!(a.is_pending_remove(&id("b")));
        // the removal still resolves after the tile is gone
        assert_eq!(graph.resolve_id(&id("b")), Some("b".to_string()));

        graph.remove_tile(&id("c"));
        assert!(graph.pending_links().is_empty());
    }

    #[test]
    fn test_remove_unpersisted_tile_forgets_relation() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &[]));
        let tile = local_tile(500.0);
        let local = tile.id().clone();
        graph.insert_tile(tile, &[]);
        graph.add_connectors(&id("a"), &local).unwrap();

        graph.remove_tile(&local);
        let a = graph.get(&id("a")).unwrap();
        assert!(!a.to_be_updated());
    }

    #[test]
    fn test_diff_defers_relations_to_unpersisted_tiles() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &[]));
        let tile = local_tile(500.0);
        let local = tile.id().clone();
        graph.insert_tile(tile, &[]);
        graph.add_connectors(&id("a"), &local).unwrap();

        let diffs = graph.diff();
        // only the create goes out; a's relation waits for a server id
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].tile, local);
        assert!(diffs[0].server_id.is_none());
        assert_eq!(diffs[0].fields.topics_to_be_added, Some(vec!["a".to_string()]));

        graph.acknowledge(&diffs[0].changes);
        graph.assign_server_id(&local, "srv-1".to_string());

        let diffs = graph.diff();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].tile, id("a"));
        assert_eq!(diffs[0].fields.topics_to_be_added, Some(vec!["srv-1".to_string()]));
        assert!(diffs[0].fields.x.is_none());

        graph.acknowledge(&diffs[0].changes);
        assert!(graph.diff().is_empty());
    }

    #[test]
    fn test_diff_only_flagged_fields() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &[]));
        graph.add_tile(&record("b", 500.0, &[]));
        graph.set_tile_content(&id("b"), RichDoc::plain_text("body"));

        let diffs = graph.diff();
        assert_eq!(diffs.len(), 1);
        let fields = &diffs[0].fields;
        assert!(fields.content.is_some());
        assert!(fields.name.is_none() && fields.x.is_none() && fields.width.is_none());
    }

    #[test]
    fn test_zoom_applies_to_new_links() {
        let mut graph = TileGraph::default();
        graph.apply_zoom(0.5);
        graph.add_tile(&record("a", 0.0, &["b"]));
        graph.add_tile(&record("b", 500.0, &[]));
        assert!(graph.connectors().all(|c| c.opacity().abs() < f64::EPSILON));
    }

    #[test]
    fn test_footprint_reanchors() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &["b"]));
        graph.add_tile(&record("b", 500.0, &[]));
        let cid = graph.get(&id("a")).unwrap().connectors()[0].id();

        assert!(graph.set_connector_footprint(&id("a"), cid, Size::new(40.0, 40.0)));
        let c = graph.get(&id("a")).unwrap().connector(cid).unwrap();
        assert!((c.anchor().x - 140.0).abs() < 1e-9);
    }

    #[test]
    fn test_tile_at_prefers_topmost() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &[]));
        graph.add_tile(&record("b", 50.0, &[]));
        assert_eq!(graph.tile_at(Point::new(75.0, 10.0)), Some(&id("b")));
        assert_eq!(graph.tile_at(Point::new(10.0, 10.0)), Some(&id("a")));
        assert_eq!(graph.tile_at(Point::new(-10.0, 10.0)), None);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut graph = TileGraph::default();
        graph.add_tile(&record("a", 0.0, &["b", "missing"]));
        graph.add_tile(&record("b", 500.0, &[]));
        graph.reset();
        assert!(graph.is_empty());
        assert_eq!(graph.connectors().count(), 0);
        assert!(graph.pending_links().is_empty());
        assert!(graph.bounds().is_none());
    }
}
