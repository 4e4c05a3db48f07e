//! Tiles: rectangular content units placed in world space.
//!
//! A tile tracks which of its fields changed since the last successful
//! persist, plus the relations it gained or lost in the meantime. Each change
//! is stamped with a revision so an acknowledgement for an older snapshot
//! cannot clear a newer edit.

use crate::connector::{Connector, ConnectorId};
use crate::document::RichDoc;
use kurbo::{Point, Rect, Size};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Client-side tile identifier.
///
/// Locally created tiles get a fresh UUID. Tiles loaded from the server reuse
/// the server id, so relations recorded against them resolve trivially.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileId(String);

impl TileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TileId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for TileId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TileId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value captured together with the revision it was changed at.
#[derive(Debug, Clone, PartialEq)]
pub struct Revised<T> {
    pub value: T,
    pub revision: u64,
}

/// Snapshot of a tile's unsaved state, taken when a save is issued.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub tile: TileId,
    pub position: Option<Revised<Point>>,
    pub size: Option<Revised<Size>>,
    pub name: Option<Revised<RichDoc>>,
    pub content: Option<Revised<RichDoc>>,
    pub added: Vec<Revised<TileId>>,
    pub removed: Vec<Revised<TileId>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.position.is_none()
            && self.size.is_none()
            && self.name.is_none()
            && self.content.is_none()
            && self.added.is_empty()
            && self.removed.is_empty()
    }
}

/// Revision of the last unsaved change per field, `None` when clean.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FieldRevisions {
    position: Option<u64>,
    size: Option<u64>,
    name: Option<u64>,
    content: Option<u64>,
}

impl FieldRevisions {
    fn any(&self) -> bool {
        self.position.is_some() || self.size.is_some() || self.name.is_some() || self.content.is_some()
    }
}

/// A rectangular content tile.
#[derive(Debug, Clone)]
pub struct Tile {
    id: TileId,
    server_id: Option<String>,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    name: RichDoc,
    content: RichDoc,
    dirty: FieldRevisions,
    revision: u64,
    /// Keeps the tile mounted while it is dragged, resized or drives the toolbar.
    force_to_render: bool,
    connectors: Vec<Connector>,
    to_be_added: HashMap<TileId, u64>,
    to_be_removed: HashMap<TileId, u64>,
}

impl Tile {
    /// Create a tile that has never been persisted. Every field starts dirty.
    pub fn new(rect: Rect, name: RichDoc, content: RichDoc) -> Self {
        let mut tile = Self::blank(TileId::new(), None, rect, name, content);
        let revision = tile.next_revision();
        tile.dirty = FieldRevisions {
            position: Some(revision),
            size: Some(revision),
            name: Some(revision),
            content: Some(revision),
        };
        tile
    }

    /// Rebuild a tile that already exists on the server. Starts clean.
    pub fn persisted(server_id: &str, rect: Rect, name: RichDoc, content: RichDoc) -> Self {
        Self::blank(TileId::from(server_id), Some(server_id.to_string()), rect, name, content)
    }

    fn blank(id: TileId, server_id: Option<String>, rect: Rect, name: RichDoc, content: RichDoc) -> Self {
        Self {
            id,
            server_id,
            x: rect.x0,
            y: rect.y0,
            width: rect.width(),
            height: rect.height(),
            name,
            content,
            dirty: FieldRevisions::default(),
            revision: 0,
            force_to_render: false,
            connectors: Vec::new(),
            to_be_added: HashMap::new(),
            to_be_removed: HashMap::new(),
        }
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn mark_position(&mut self) {
        self.dirty.position = Some(self.next_revision());
    }

    fn mark_size(&mut self) {
        self.dirty.size = Some(self.next_revision());
    }

    pub fn id(&self) -> &TileId {
        &self.id
    }

    pub fn server_id(&self) -> Option<&str> {
        self.server_id.as_deref()
    }

    pub fn is_persisted(&self) -> bool {
        self.server_id.is_some()
    }

    /// Record the id the server assigned. Returns false if one was already set.
    pub fn set_server_id(&mut self, server_id: String) -> bool {
        if self.server_id.is_some() {
            return false;
        }
        self.server_id = Some(server_id);
        true
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position(), self.size())
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    pub fn center(&self) -> Point {
        Point::new(self.center_x(), self.center_y())
    }

    pub fn name(&self) -> &RichDoc {
        &self.name
    }

    pub fn content(&self) -> &RichDoc {
        &self.content
    }

    pub fn set_x(&mut self, x: f64) -> bool {
        if self.x == x {
            return false;
        }
        self.x = x;
        self.mark_position();
        true
    }

    pub fn set_y(&mut self, y: f64) -> bool {
        if self.y == y {
            return false;
        }
        self.y = y;
        self.mark_position();
        true
    }

    pub fn set_width(&mut self, width: f64) -> bool {
        if self.width == width {
            return false;
        }
        self.width = width;
        self.mark_size();
        true
    }

    pub fn set_height(&mut self, height: f64) -> bool {
        if self.height == height {
            return false;
        }
        self.height = height;
        self.mark_size();
        true
    }

    /// Move the top-left corner. One flag flip even if both coordinates change.
    pub fn set_position(&mut self, position: Point) -> bool {
        if self.x == position.x && self.y == position.y {
            return false;
        }
        self.x = position.x;
        self.y = position.y;
        self.mark_position();
        true
    }

    pub fn set_size(&mut self, size: Size) -> bool {
        if self.width == size.width && self.height == size.height {
            return false;
        }
        self.width = size.width;
        self.height = size.height;
        self.mark_size();
        true
    }

    /// Apply a full rect; returns true if anything changed.
    pub fn set_rect(&mut self, rect: Rect) -> bool {
        let moved = self.set_position(rect.origin());
        let resized = self.set_size(rect.size());
        moved || resized
    }

    pub fn set_name(&mut self, name: RichDoc) -> bool {
        if self.name == name {
            return false;
        }
        self.name = name;
        self.dirty.name = Some(self.next_revision());
        true
    }

    pub fn set_content(&mut self, content: RichDoc) -> bool {
        if self.content == content {
            return false;
        }
        self.content = content;
        self.dirty.content = Some(self.next_revision());
        true
    }

    /// Set the position and flag it even when unchanged.
    pub fn update_position(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.mark_position();
    }

    /// Set the size and flag it even when unchanged.
    pub fn update_size(&mut self, width: f64, height: f64) {
        self.width = width;
        self.height = height;
        self.mark_size();
    }

    pub fn position_updated(&self) -> bool {
        self.dirty.position.is_some()
    }

    pub fn size_updated(&self) -> bool {
        self.dirty.size.is_some()
    }

    pub fn name_updated(&self) -> bool {
        self.dirty.name.is_some()
    }

    pub fn content_updated(&self) -> bool {
        self.dirty.content.is_some()
    }

    pub fn force_to_render(&self) -> bool {
        self.force_to_render
    }

    pub fn set_force_to_render(&mut self, force: bool) {
        self.force_to_render = force;
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    /// The outgoing connector toward `other`, if linked.
    pub fn connector_to(&self, other: &TileId) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.item_b() == other)
    }

    pub fn connector(&self, id: ConnectorId) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id() == id)
    }

    pub fn connector_mut(&mut self, id: ConnectorId) -> Option<&mut Connector> {
        self.connectors.iter_mut().find(|c| c.id() == id)
    }

    /// Ids of tiles this one links to.
    pub fn peers(&self) -> impl Iterator<Item = &TileId> {
        self.connectors.iter().map(|c| c.item_b())
    }

    pub fn related_to_be_added(&self) -> impl Iterator<Item = &TileId> {
        self.to_be_added.keys()
    }

    pub fn related_to_be_removed(&self) -> impl Iterator<Item = &TileId> {
        self.to_be_removed.keys()
    }

    pub fn is_pending_add(&self, other: &TileId) -> bool {
        self.to_be_added.contains_key(other)
    }

    pub fn is_pending_remove(&self, other: &TileId) -> bool {
        self.to_be_removed.contains_key(other)
    }

    fn record_added(&mut self, other: &TileId) {
        self.to_be_removed.remove(other);
        let revision = self.next_revision();
        self.to_be_added.insert(other.clone(), revision);
    }

    pub(crate) fn record_removed(&mut self, other: &TileId) {
        self.to_be_added.remove(other);
        let revision = self.next_revision();
        self.to_be_removed.insert(other.clone(), revision);
    }

    /// Drop any pending relation toward `other` without recording a new one.
    pub(crate) fn forget_relation(&mut self, other: &TileId) {
        self.to_be_added.remove(other);
        self.to_be_removed.remove(other);
    }

    fn attach_pair(&mut self, other: &mut Tile, footprint: Size, shift: f64) -> ConnectorId {
        let id = ConnectorId::new();
        let (a_rect, b_rect) = (self.rect(), other.rect());

        let mut forward = Connector::new(id, self.id.clone(), other.id.clone(), footprint);
        forward.refresh(a_rect, b_rect, shift);
        let mut backward = Connector::new(id, other.id.clone(), self.id.clone(), footprint);
        backward.refresh(b_rect, a_rect, shift);

        self.connectors.push(forward);
        other.connectors.push(backward);
        id
    }

    /// Link two tiles with a connector pair and record the relation on both
    /// sides as pending-added. Linking an already linked pair returns the
    /// existing id and records nothing.
    pub fn add_connectors(&mut self, other: &mut Tile, footprint: Size, shift: f64) -> ConnectorId {
        if let Some(existing) = self.connector_to(&other.id) {
            return existing.id();
        }
        let id = self.attach_pair(other, footprint, shift);
        self.record_added(&other.id);
        other.record_added(&self.id);
        id
    }

    /// Link two tiles whose relation is already persisted. No pending state.
    pub fn link_with(&mut self, other: &mut Tile, footprint: Size, shift: f64) -> ConnectorId {
        if let Some(existing) = self.connector_to(&other.id) {
            return existing.id();
        }
        self.attach_pair(other, footprint, shift)
    }

    fn detach(&mut self, id: ConnectorId) -> bool {
        let before = self.connectors.len();
        self.connectors.retain(|c| c.id() != id);
        self.connectors.len() != before
    }

    /// Drop every connector pointing at `other`. Returns true if any existed.
    pub(crate) fn detach_from(&mut self, other: &TileId) -> bool {
        let before = self.connectors.len();
        self.connectors.retain(|c| c.item_b() != other);
        self.connectors.len() != before
    }

    /// Remove both halves of connector `id` and record the relation on both
    /// sides as pending-removed. Returns false if neither side held it.
    pub fn remove_connector(&mut self, other: &mut Tile, id: ConnectorId) -> bool {
        let removed_here = self.detach(id);
        let removed_there = other.detach(id);
        if !removed_here && !removed_there {
            return false;
        }
        self.record_removed(&other.id);
        other.record_removed(&self.id);
        true
    }

    /// Recompute every owned connector. `lookup` yields the rect of a peer.
    pub fn refresh_connectors<F>(&mut self, shift: f64, lookup: F)
    where
        F: Fn(&TileId) -> Option<Rect>,
    {
        let own = self.rect();
        for connector in &mut self.connectors {
            if let Some(target) = lookup(connector.item_b()) {
                connector.refresh(own, target, shift);
            }
        }
    }

    /// Update connector opacity for a zoom level.
    pub fn apply_zoom(&mut self, zoom: f64) {
        for connector in &mut self.connectors {
            connector.update_size(zoom);
        }
    }

    /// True if any field or relation is waiting to be persisted.
    pub fn to_be_updated(&self) -> bool {
        self.dirty.any() || !self.to_be_added.is_empty() || !self.to_be_removed.is_empty()
    }

    /// Clear every dirty flag and both pending sets.
    ///
    /// Only correct right after a successful persist of the full current
    /// state. When saves run concurrently with edits use [`Tile::acknowledge`].
    pub fn saved(&mut self) {
        self.dirty = FieldRevisions::default();
        self.to_be_added.clear();
        self.to_be_removed.clear();
    }

    /// Snapshot the unsaved fields and relations.
    pub fn changes(&self) -> ChangeSet {
        ChangeSet {
            tile: self.id.clone(),
            position: self.dirty.position.map(|revision| Revised {
                value: self.position(),
                revision,
            }),
            size: self.dirty.size.map(|revision| Revised {
                value: self.size(),
                revision,
            }),
            name: self.dirty.name.map(|revision| Revised {
                value: self.name.clone(),
                revision,
            }),
            content: self.dirty.content.map(|revision| Revised {
                value: self.content.clone(),
                revision,
            }),
            added: revised_ids(&self.to_be_added),
            removed: revised_ids(&self.to_be_removed),
        }
    }

    /// Snapshot every field, dirty or not. Used when creating the tile remotely.
    pub fn full_snapshot(&self) -> ChangeSet {
        ChangeSet {
            tile: self.id.clone(),
            position: Some(Revised {
                value: self.position(),
                revision: self.dirty.position.unwrap_or(0),
            }),
            size: Some(Revised {
                value: self.size(),
                revision: self.dirty.size.unwrap_or(0),
            }),
            name: Some(Revised {
                value: self.name.clone(),
                revision: self.dirty.name.unwrap_or(0),
            }),
            content: Some(Revised {
                value: self.content.clone(),
                revision: self.dirty.content.unwrap_or(0),
            }),
            added: revised_ids(&self.to_be_added),
            removed: revised_ids(&self.to_be_removed),
        }
    }

    /// Clear what `changes` captured, unless it was modified again since.
    pub fn acknowledge(&mut self, changes: &ChangeSet) {
        fn clear<T>(slot: &mut Option<u64>, sent: &Option<Revised<T>>) {
            if let Some(sent) = sent {
                if *slot == Some(sent.revision) {
                    *slot = None;
                }
            }
        }
        clear(&mut self.dirty.position, &changes.position);
        clear(&mut self.dirty.size, &changes.size);
        clear(&mut self.dirty.name, &changes.name);
        clear(&mut self.dirty.content, &changes.content);

        for sent in &changes.added {
            if self.to_be_added.get(&sent.value) == Some(&sent.revision) {
                self.to_be_added.remove(&sent.value);
            }
        }
        for sent in &changes.removed {
            if self.to_be_removed.get(&sent.value) == Some(&sent.revision) {
                self.to_be_removed.remove(&sent.value);
            }
        }
    }
}

fn revised_ids(pending: &HashMap<TileId, u64>) -> Vec<Revised<TileId>> {
    let mut ids: Vec<_> = pending
        .iter()
        .map(|(id, &revision)| Revised {
            value: id.clone(),
            revision,
        })
        .collect();
    ids.sort_by(|a, b| a.value.cmp(&b.value));
    ids
}
