//! In-memory board backend.

use super::{ApiError, ApiResult, BoardApi, BoxFuture, CreatedTile, NewTile, TileFields, TileRecord};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone)]
struct StoredTile {
    board_id: String,
    record: TileRecord,
}

/// In-memory backend for tests and the replay tool.
///
/// Failures can be injected per tile id (patches) or globally (creates) to
/// exercise partial save failures.
#[derive(Default)]
pub struct MemoryApi {
    tiles: RwLock<HashMap<String, StoredTile>>,
    /// Insertion order per board.
    boards: RwLock<HashMap<String, Vec<String>>>,
    failing_patches: RwLock<HashSet<String>>,
    failing_creates: AtomicU64,
    next_id: AtomicU64,
    patches: RwLock<Vec<(String, TileFields)>>,
}

fn lock_error(e: impl std::fmt::Display) -> ApiError {
    ApiError::Transport(format!("Lock error: {}", e))
}

impl MemoryApi {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `records` under `board_id`, replacing tiles with the same id.
    pub fn seed(&self, board_id: &str, records: impl IntoIterator<Item = TileRecord>) -> ApiResult<()> {
        let mut tiles = self.tiles.write().map_err(lock_error)?;
        let mut boards = self.boards.write().map_err(lock_error)?;
        let order = boards.entry(board_id.to_string()).or_default();
        for record in records {
            if !order.contains(&record.id) {
                order.push(record.id.clone());
            }
            tiles.insert(
                record.id.clone(),
                StoredTile {
                    board_id: board_id.to_string(),
                    record,
                },
            );
        }
        Ok(())
    }

    /// Make every patch of `id` fail until [`MemoryApi::clear_failures`].
    pub fn fail_patches_for(&self, id: &str) {
        if let Ok(mut failing) = self.failing_patches.write() {
            failing.insert(id.to_string());
        }
    }

    /// Make the next `count` creates fail.
    pub fn fail_next_creates(&self, count: u64) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_patches.write() {
            failing.clear();
        }
        self.failing_creates.store(0, Ordering::SeqCst);
    }

    /// Current stored state of a tile.
    pub fn tile(&self, id: &str) -> Option<TileRecord> {
        let tiles = self.tiles.read().ok()?;
        tiles.get(id).map(|stored| stored.record.clone())
    }

    /// Every patch received so far, in arrival order.
    pub fn patch_log(&self) -> Vec<(String, TileFields)> {
        self.patches.read().map(|log| log.clone()).unwrap_or_default()
    }

    fn take_create_failure(&self) -> bool {
        self.failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn apply_fields(record: &mut TileRecord, fields: &TileFields) {
    if let Some(name) = &fields.name {
        record.name = name.clone();
    }
    if let Some(content) = &fields.content {
        record.content = content.clone();
    }
    if let Some(x) = fields.x {
        record.x = x;
    }
    if let Some(y) = fields.y {
        record.y = y;
    }
    if let Some(width) = fields.width {
        record.width = width;
    }
    if let Some(height) = fields.height {
        record.height = height;
    }
    if let Some(added) = &fields.topics_to_be_added {
        for id in added {
            if !record.related_ids.contains(id) {
                record.related_ids.push(id.clone());
            }
        }
    }
    if let Some(removed) = &fields.topics_to_be_removed {
        record.related_ids.retain(|id| !removed.contains(id));
    }
}

impl BoardApi for MemoryApi {
    fn fetch_tiles_for_board(&self, board_id: &str) -> BoxFuture<'_, ApiResult<Vec<TileRecord>>> {
        let board_id = board_id.to_string();
        Box::pin(async move {
            let tiles = self.tiles.read().map_err(lock_error)?;
            let boards = self.boards.read().map_err(lock_error)?;
            let order = boards
                .get(&board_id)
                .ok_or_else(|| ApiError::BoardNotFound(board_id.clone()))?;
            Ok(order
                .iter()
                .filter_map(|id| tiles.get(id))
                .map(|stored| stored.record.clone())
                .collect())
        })
    }

    fn create_tile(&self, tile: &NewTile) -> BoxFuture<'_, ApiResult<CreatedTile>> {
        let tile = tile.clone();
        Box::pin(async move {
            if self.take_create_failure() {
                return Err(ApiError::Rejected {
                    status: 500,
                    message: "create failed".to_string(),
                });
            }
            let id = format!("tile-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let record = TileRecord {
                id: id.clone(),
                x: tile.x,
                y: tile.y,
                width: tile.width,
                height: tile.height,
                name: tile.name,
                content: tile.content,
                related_ids: tile.related_ids,
            };
            self.seed(&tile.board_id, [record])?;
            Ok(CreatedTile { id })
        })
    }

    fn patch_tile(&self, id: &str, fields: &TileFields) -> BoxFuture<'_, ApiResult<()>> {
        let id = id.to_string();
        let fields = fields.clone();
        Box::pin(async move {
            let failing = self.failing_patches.read().map_err(lock_error)?.contains(&id);
            if failing {
                return Err(ApiError::Rejected {
                    status: 503,
                    message: format!("patch of {id} failed"),
                });
            }
            let mut tiles = self.tiles.write().map_err(lock_error)?;
            let stored = tiles.get_mut(&id).ok_or_else(|| ApiError::NotFound(id.clone()))?;
            apply_fields(&mut stored.record, &fields);
            log::trace!("Patched tile {} on board {}", id, stored.board_id);
            drop(tiles);

            self.patches.write().map_err(lock_error)?.push((id, fields));
            Ok(())
        })
    }
}
