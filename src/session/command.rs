//! Session commands and the events they produce

use std::path::PathBuf;

use crate::core::types::UVec3;
use crate::mesh::ExtractionReport;
use crate::voxel::brush::{CarveOutcome, CarveRequest};

/// Work queued on a session, applied in submission order by `step`
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Carve(CarveRequest),
    Undo,
    Redo,
    /// Replace the stone with a fresh one from the configured fill
    New,
    Load(PathBuf),
    Save(PathBuf),
}

/// How a load finished
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded { dims: UVec3 },
    /// The file was missing or unreadable; a fresh solid stone replaced it
    Recovered { reason: String },
}

/// Something observable that happened during a step
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Carved(CarveOutcome),
    Undone { layers: Vec<u32> },
    Redone { layers: Vec<u32> },
    NothingToUndo,
    NothingToRedo,
    Created { dims: UVec3 },
    LoadStarted(PathBuf),
    Loaded { path: PathBuf, outcome: LoadOutcome },
    SaveQueued(PathBuf),
    Saved { path: PathBuf, bytes: usize },
    SaveFailed { path: PathBuf, message: String },
    /// Meshes were rebuilt; `layers` is empty for a full rebuild
    Remeshed { layers: Vec<u32> },
    Isosurface(ExtractionReport),
}
