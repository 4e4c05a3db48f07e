//! Noteboard Core Library
//!
//! Platform-agnostic state for a spatial note board: tiles and connectors,
//! the camera, pointer gestures and change tracking for persistence.

pub mod api;
pub mod camera;
pub mod config;
pub mod connector;
pub mod document;
pub mod geometry;
pub mod graph;
pub mod handles;
pub mod input;
pub mod session;
pub mod tile;

pub use api::{ApiError, ApiResult, BoardApi, MemoryApi, SyncAdapter, TileFields, TileRecord};
pub use camera::{Camera, Viewable};
pub use config::{BoardConfig, ConfigError};
pub use connector::{Connector, ConnectorId};
pub use document::RichDoc;
pub use geometry::Heading;
pub use graph::{TileDiff, TileGraph};
pub use handles::ResizeHandle;
pub use input::{GesturePhase, Interaction, InteractionController, MouseButton, PointerEvent, PointerTarget};
pub use session::BoardSession;
pub use tile::{ChangeSet, Tile, TileId};
