//! Pushing board changes through a [`BoardApi`].

use super::{ApiError, ApiResult, BoardApi, NewTile, TileFields, TileRecord};
use crate::tile::{ChangeSet, TileId};
use futures_util::future::join_all;
use std::sync::Arc;

/// One tile's worth of work in a save.
#[derive(Debug, Clone)]
pub enum PendingSave {
    /// The tile has no server id yet.
    Create { changes: ChangeSet, payload: NewTile },
    /// Partial update of a persisted tile.
    Patch {
        changes: ChangeSet,
        server_id: String,
        fields: TileFields,
    },
}

impl PendingSave {
    pub fn changes(&self) -> &ChangeSet {
        match self {
            Self::Create { changes, .. } | Self::Patch { changes, .. } => changes,
        }
    }

    pub fn tile(&self) -> &TileId {
        &self.changes().tile
    }
}

/// Everything a save will send, tagged with the session epoch it was taken in.
#[derive(Debug, Clone, Default)]
pub struct SaveBatch {
    pub epoch: u64,
    pub items: Vec<PendingSave>,
}

impl SaveBatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// What the server did with one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Saved {
    Created(String),
    Patched,
}

/// Result of one item, carrying the snapshot it was built from.
#[derive(Debug)]
pub struct SaveOutcome {
    pub changes: ChangeSet,
    pub result: ApiResult<Saved>,
}

/// Outcomes of a whole batch.
#[derive(Debug, Default)]
pub struct SaveResults {
    pub epoch: u64,
    pub outcomes: Vec<SaveOutcome>,
}

/// Summary of applying [`SaveResults`] to a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    pub failed: Vec<TileId>,
    /// The results belonged to a board that is no longer open.
    pub discarded: bool,
}

impl SaveReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.discarded
    }
}

/// Drives loads and saves against a backend.
pub struct SyncAdapter<A: BoardApi> {
    api: Arc<A>,
}

impl<A: BoardApi> SyncAdapter<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// Fetch every tile of `board_id`.
    pub async fn load(&self, board_id: &str) -> ApiResult<Vec<TileRecord>> {
        let records = self.api.fetch_tiles_for_board(board_id).await?;
        log::info!("Fetched {} tiles for board {}", records.len(), board_id);
        Ok(records)
    }

    /// Send every item of `batch` concurrently. Failures are reported per item.
    pub async fn push(&self, batch: SaveBatch) -> SaveResults {
        let SaveBatch { epoch, items } = batch;
        let outcomes = join_all(items.into_iter().map(|item| self.push_one(item))).await;

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            log::warn!("{} of {} tile saves failed", failed, outcomes.len());
        }
        SaveResults { epoch, outcomes }
    }

    async fn push_one(&self, item: PendingSave) -> SaveOutcome {
        let (changes, result) = match item {
            PendingSave::Create { changes, payload } => {
                let result = self
                    .api
                    .create_tile(&payload)
                    .await
                    .map(|created| Saved::Created(created.id));
                (changes, result)
            }
            PendingSave::Patch {
                changes,
                server_id,
                fields,
            } => {
                let result = self.api.patch_tile(&server_id, &fields).await.map(|()| Saved::Patched);
                (changes, result)
            }
        };
        if let Err(e) = &result {
            log::warn!("Saving tile {} failed: {}", changes.tile, describe(e));
        }
        SaveOutcome { changes, result }
    }
}

fn describe(error: &ApiError) -> String {
    match error {
        ApiError::Rejected { status, .. } => format!("{} (status {})", error, status),
        other => other.to_string(),
    }
}
