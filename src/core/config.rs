//! Session configuration
//!
//! Every field has a default, so a JSON file only needs the values it
//! overrides:
//!
//! ```json
//! { "dims": [64, 64, 64], "mesher": "Isosurface" }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::core::types::Result;
use crate::mesh::isosurface::IsosurfaceConfig;
use crate::streaming::disk_io::SaveFormat;
use crate::voxel::brush::lod::LodConfig;
use crate::voxel::edit::history::{RedoPolicy, MAX_HISTORY};

/// How a fresh stone is filled on New (and on load fallback)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum InitialFill {
    /// Every cell filled
    Solid,
    /// Hollow ellipsoid inscribed in the chunk, `thickness` cells deep
    EllipsoidShell { thickness: f32 },
}

impl Default for InitialFill {
    fn default() -> Self {
        InitialFill::EllipsoidShell { thickness: 5.0 }
    }
}

/// Which surface reconstruction runs after each change
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MesherKind {
    /// Per-layer greedy boxes, rebuilt only on touched layers
    #[default]
    Greedy,
    /// Marching-cubes surface under a triangle budget
    Isosurface,
}

/// Configuration for a sculpting session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chunk dimensions in cells (x, y, z)
    pub dims: [u32; 3],
    /// Fill used for New and for load fallback
    pub initial_fill: InitialFill,
    /// Undo log capacity
    pub max_history: usize,
    /// Whether redone batches go back onto the undo log
    pub redo_policy: RedoPolicy,
    /// Surface reconstruction strategy
    pub mesher: MesherKind,
    /// Marching-cubes parameters
    pub isosurface: IsosurfaceConfig,
    /// Encoding used by Save
    pub save_format: SaveFormat,
    /// Stride derivation from tool scale
    pub lod: LodConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dims: [100, 100, 100],
            initial_fill: InitialFill::default(),
            max_history: MAX_HISTORY,
            redo_policy: RedoPolicy::default(),
            mesher: MesherKind::default(),
            isosurface: IsosurfaceConfig::default(),
            save_format: SaveFormat::default(),
            lod: LodConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a config from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: SessionConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file (sync)
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        let [x, y, z] = self.dims;
        if x == 0 || y == 0 || z == 0 {
            return Err(Error::InvalidDimensions { x, y, z });
        }
        if self.max_history == 0 {
            return Err(Error::Config("max_history must be at least 1".into()));
        }
        if !(self.isosurface.isovalue > 0.0 && self.isosurface.isovalue < 1.0) {
            return Err(Error::Config(format!(
                "isovalue {} outside (0, 1)",
                self.isosurface.isovalue
            )));
        }
        if self.isosurface.grid_scale <= 0.0 {
            return Err(Error::Config("grid_scale must be positive".into()));
        }
        if self.isosurface.triangle_budget == 0 {
            return Err(Error::Config("triangle_budget must be positive".into()));
        }
        if let InitialFill::EllipsoidShell { thickness } = self.initial_fill {
            if thickness <= 0.0 {
                return Err(Error::Config("shell thickness must be positive".into()));
            }
        }
        self.lod.validate()
    }
}
