//! Headless scenario runner.
//!
//! Loads a scenario file, opens its board against an in-memory backend,
//! replays the steps and prints the resulting board as JSON.
//!
//! ```text
//! noteboard-replay scenarios/demo.json
//! ```

use kurbo::{Point, Size};
use noteboard_core::api::SaveReport;
use noteboard_core::{
    ApiError, BoardConfig, BoardSession, ConfigError, Interaction, MemoryApi, PointerEvent, RichDoc, SyncAdapter,
    TileId, TileRecord,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
enum ReplayError {
    #[error("usage: noteboard-replay <scenario.json>")]
    Usage,
    #[error("Failed to read scenario: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid scenario: {0}")]
    Scenario(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Backend error: {0}")]
    Api(#[from] ApiError),
}

#[derive(Debug, Deserialize)]
struct Scenario {
    board_id: String,
    #[serde(default)]
    config: Option<BoardConfig>,
    #[serde(default)]
    viewport: Option<Size>,
    #[serde(default)]
    tiles: Vec<TileRecord>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Pointer { event: PointerEvent },
    /// Left press whose target is hit-tested against the board.
    Press { position: Point },
    CreateTile {
        position: Point,
        #[serde(default)]
        title: Option<String>,
    },
    Link { a: TileId, b: TileId },
    SetContent { tile: TileId, text: String },
    MoveTo { tile: TileId },
    FitBoard {
        #[serde(default)]
        padding: f64,
    },
    Save,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        log::error!("{}", e);
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), ReplayError> {
    let path = std::env::args().nth(1).ok_or(ReplayError::Usage)?;
    let scenario: Scenario = serde_json::from_str(&std::fs::read_to_string(&path)?)?;

    let config = scenario.config.unwrap_or_default();
    config.validate()?;

    let api = Arc::new(MemoryApi::new());
    api.seed(&scenario.board_id, scenario.tiles)?;
    let sync = SyncAdapter::new(api);

    let mut session = BoardSession::new(config);
    if let Some(viewport) = scenario.viewport {
        session.set_viewport(viewport);
    }
    pollster::block_on(session.open_board(&sync, &scenario.board_id))?;
    log::info!("Replaying {} steps", scenario.steps.len());

    let mut interactions: Vec<Interaction> = Vec::new();
    let mut saves: Vec<SaveReport> = Vec::new();
    let mut created: Vec<TileId> = Vec::new();
    for step in scenario.steps {
        match step {
            Step::Pointer { event } => interactions.extend(session.handle_pointer(event)),
            Step::Press { position } => {
                let target = session.target_at(position);
                log::debug!("Press at {:?} hits {:?}", position, target);
                interactions.extend(session.handle_pointer(PointerEvent::Down {
                    position,
                    target,
                    button: Default::default(),
                }));
            }
            Step::CreateTile { position, title } => {
                let name = title.as_deref().map(RichDoc::plain_text).unwrap_or_default();
                created.push(session.create_tile(position, name, RichDoc::default()));
            }
            Step::Link { a, b } => {
                let a = resolve_created(&created, a);
                let b = resolve_created(&created, b);
                if session.link_tiles(&a, &b).is_none() {
                    log::warn!("Cannot link {} and {}", a, b);
                }
            }
            Step::SetContent { tile, text } => {
                let tile = resolve_created(&created, tile);
                session.set_tile_content(&tile, RichDoc::plain_text(&text));
            }
            Step::MoveTo { tile } => {
                let tile = resolve_created(&created, tile);
                session.move_to_item(&tile);
            }
            Step::FitBoard { padding } => {
                session.fit_board(padding);
            }
            Step::Save => saves.push(pollster::block_on(session.save(&sync))),
        }
    }

    let snapshot = snapshot(&session, &interactions, &saves)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// `"#0"`, `"#1"`, ... refer to tiles created earlier in the scenario.
fn resolve_created(created: &[TileId], id: TileId) -> TileId {
    id.as_str()
        .strip_prefix('#')
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|n| created.get(n).cloned())
        .unwrap_or(id)
}

fn snapshot(session: &BoardSession, interactions: &[Interaction], saves: &[SaveReport]) -> Result<Value, ReplayError> {
    let camera = session.camera();
    let tiles: Vec<Value> = session
        .graph()
        .tiles()
        .map(|tile| {
            json!({
                "id": tile.id(),
                "server_id": tile.server_id(),
                "rect": tile.rect(),
                "visible": session.is_tile_visible(tile.id()),
                "unsaved": tile.to_be_updated(),
            })
        })
        .collect();
    let connectors: Vec<Value> = session
        .visible_connectors()
        .into_iter()
        .map(|c| {
            json!({
                "id": c.id(),
                "from": c.item_a(),
                "to": c.item_b(),
                "anchor": c.anchor(),
                "angle": c.angle(),
                "opacity": c.opacity(),
            })
        })
        .collect();
    let saves: Vec<Value> = saves
        .iter()
        .map(|r| json!({ "saved": r.saved, "failed": r.failed, "discarded": r.discarded }))
        .collect();

    Ok(json!({
        "board_id": session.board_id(),
        "camera": { "position": camera.position, "zoom": camera.zoom },
        "background_offset": session.background_offset(),
        "tiles": tiles,
        "connectors": connectors,
        "interactions": serde_json::to_value(interactions)?,
        "saves": saves,
    }))
}
