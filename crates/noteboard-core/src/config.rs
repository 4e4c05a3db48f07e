//! Tunable board constants.

use kurbo::Size;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid zoom bounds: min {min} must be positive and below max {max}")]
    ZoomBounds { min: f64, max: f64 },
    #[error("Invalid minimum tile size: {0}x{1}")]
    MinTileSize(f64, f64),
}

/// Every constant the camera, gestures and connectors depend on.
///
/// Missing fields fall back to their defaults when deserializing, so a
/// config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Lowest zoom the camera accepts.
    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,
    /// Highest zoom the camera accepts.
    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,
    /// Zoom change per wheel tick.
    #[serde(default = "default_wheel_step")]
    pub wheel_step: f64,
    /// Screen pixels a tile press must travel before it becomes a drag.
    #[serde(default = "default_drag_threshold")]
    pub drag_threshold: f64,
    #[serde(default = "default_min_tile_width")]
    pub min_tile_width: f64,
    #[serde(default = "default_min_tile_height")]
    pub min_tile_height: f64,
    /// Clearance between a tile edge and its connectors, in world units.
    #[serde(default = "default_connector_shift")]
    pub connector_shift: f64,
    /// Footprint assumed for connectors until the renderer measures them.
    #[serde(default)]
    pub connector_size: Size,
    /// Subtracted from the height ratio when centering, leaves room for connectors.
    #[serde(default = "default_center_margin_h")]
    pub center_margin_h: f64,
    /// Subtracted from the width ratio when centering.
    #[serde(default = "default_center_margin_w")]
    pub center_margin_w: f64,
    /// Round positions and sizes produced by gestures to whole world units.
    #[serde(default = "default_true")]
    pub round_to_whole_units: bool,
    #[serde(default = "default_tile_size")]
    pub default_tile_size: Size,
    /// Title given to new tiles created with an empty name.
    #[serde(default = "default_tile_title")]
    pub default_tile_title: String,
}

fn default_min_zoom() -> f64 {
    0.1
}

fn default_max_zoom() -> f64 {
    5.0
}

fn default_wheel_step() -> f64 {
    0.05
}

fn default_drag_threshold() -> f64 {
    4.0
}

fn default_min_tile_width() -> f64 {
    160.0
}

fn default_min_tile_height() -> f64 {
    120.0
}

fn default_connector_shift() -> f64 {
    20.0
}

fn default_center_margin_h() -> f64 {
    0.3
}

fn default_center_margin_w() -> f64 {
    0.4
}

fn default_true() -> bool {
    true
}

fn default_tile_size() -> Size {
    Size::new(320.0, 240.0)
}

fn default_tile_title() -> String {
    "New topic".to_string()
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            wheel_step: default_wheel_step(),
            drag_threshold: default_drag_threshold(),
            min_tile_width: default_min_tile_width(),
            min_tile_height: default_min_tile_height(),
            connector_shift: default_connector_shift(),
            connector_size: Size::ZERO,
            center_margin_h: default_center_margin_h(),
            center_margin_w: default_center_margin_w(),
            round_to_whole_units: default_true(),
            default_tile_size: default_tile_size(),
            default_tile_title: default_tile_title(),
        }
    }
}

impl BoardConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_zoom > 0.0 && self.min_zoom < self.max_zoom) {
            return Err(ConfigError::ZoomBounds {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if !(self.min_tile_width >= 0.0 && self.min_tile_height >= 0.0) {
            return Err(ConfigError::MinTileSize(self.min_tile_width, self.min_tile_height));
        }
        Ok(())
    }

    /// Minimum tile size as a `Size`.
    pub fn min_tile_size(&self) -> Size {
        Size::new(self.min_tile_width, self.min_tile_height)
    }
}
