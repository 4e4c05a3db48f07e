//! Persistence interface consumed by the board.
//!
//! The board never talks to a network itself. It produces [`TileFields`]
//! patches and [`NewTile`] payloads, and hands them to a [`BoardApi`]
//! implementation through the [`SyncAdapter`].

mod memory;
mod sync;

pub use memory::MemoryApi;
pub use sync::{PendingSave, SaveBatch, SaveOutcome, SaveReport, SaveResults, Saved, SyncAdapter};

use crate::document::RichDoc;
use crate::tile::{ChangeSet, TileId};
use kurbo::Rect;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Tile not found: {0}")]
    NotFound(String),
    #[error("Board not found: {0}")]
    BoardNotFound(String),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A tile as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileRecord {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "title", default)]
    pub name: RichDoc,
    #[serde(default)]
    pub content: RichDoc,
    #[serde(rename = "relatedTopics", default)]
    pub related_ids: Vec<String>,
}

impl TileRecord {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }
}

/// Payload for creating a tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTile {
    pub board_id: String,
    #[serde(rename = "title")]
    pub name: RichDoc,
    pub content: RichDoc,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(rename = "relatedTopics")]
    pub related_ids: Vec<String>,
}

/// Server response to a create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedTile {
    pub id: String,
}

/// Partial update. Only the fields that changed are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileFields {
    #[serde(rename = "title", skip_serializing_if = "Option::is_none", default)]
    pub name: Option<RichDoc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<RichDoc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub width: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub height: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub topics_to_be_added: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub topics_to_be_removed: Option<Vec<String>>,
}

impl TileFields {
    /// Build the minimal payload for `changes`.
    ///
    /// `resolve` maps related client ids to persisted ids. Relations it cannot
    /// resolve are left out.
    pub fn from_changes<F>(changes: &ChangeSet, resolve: F) -> Self
    where
        F: Fn(&TileId) -> Option<String>,
    {
        let resolve_all = |ids: &[crate::tile::Revised<TileId>]| -> Option<Vec<String>> {
            let resolved: Vec<String> = ids.iter().filter_map(|r| resolve(&r.value)).collect();
            (!resolved.is_empty()).then_some(resolved)
        };
        Self {
            name: changes.name.as_ref().map(|n| n.value.clone()),
            content: changes.content.as_ref().map(|c| c.value.clone()),
            x: changes.position.as_ref().map(|p| p.value.x),
            y: changes.position.as_ref().map(|p| p.value.y),
            width: changes.size.as_ref().map(|s| s.value.width),
            height: changes.size.as_ref().map(|s| s.value.height),
            topics_to_be_added: resolve_all(&changes.added),
            topics_to_be_removed: resolve_all(&changes.removed),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Trait for board persistence backends.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait BoardApi: Send + Sync {
    /// Load every tile of a board.
    fn fetch_tiles_for_board(&self, board_id: &str) -> BoxFuture<'_, ApiResult<Vec<TileRecord>>>;

    /// Create a tile, returning its server id.
    fn create_tile(&self, tile: &NewTile) -> BoxFuture<'_, ApiResult<CreatedTile>>;

    /// Apply a partial update to a persisted tile.
    fn patch_tile(&self, id: &str, fields: &TileFields) -> BoxFuture<'_, ApiResult<()>>;
}

/// Trait for board persistence backends (WASM version without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait BoardApi {
    /// Load every tile of a board.
    fn fetch_tiles_for_board(&self, board_id: &str) -> BoxFuture<'_, ApiResult<Vec<TileRecord>>>;

    /// Create a tile, returning its server id.
    fn create_tile(&self, tile: &NewTile) -> BoxFuture<'_, ApiResult<CreatedTile>>;

    /// Apply a partial update to a persisted tile.
    fn patch_tile(&self, id: &str, fields: &TileFields) -> BoxFuture<'_, ApiResult<()>>;
}
