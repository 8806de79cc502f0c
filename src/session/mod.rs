//! Sculpting session: owns the stone and serializes every change to it
//!
//! Lifecycle is explicit: [`SculptSession::initialize`] allocates the chunk
//! and meshers, [`SculptSession::step`] applies queued commands and rebuilds
//! whatever they touched, [`SculptSession::teardown`] waits for pending saves
//! and releases the chunk.
//!
//! While a load is in flight the session is not ready: `step` keeps polling
//! the persistence worker but leaves the command queue alone, so carves
//! issued during a load apply to the loaded stone.

pub mod command;

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::core::config::{InitialFill, MesherKind, SessionConfig};
use crate::core::error::Error;
use crate::core::types::{Affine3A, Result, UVec3};
use crate::mesh::{ExtractionReport, GreedyMeshBuilder, IsoMesh, IsosurfaceBuilder, LayeredMesh};
use crate::streaming::disk_io;
use crate::streaming::worker::{PersistenceResult, PersistenceWorker};
use crate::voxel::brush::{CarveOutcome, CarveRequest, CarvingEngine, ToolShape};
use crate::voxel::chunk::VoxelChunk;
use crate::voxel::edit::HistoryManager;

pub use command::{LoadOutcome, SessionCommand, SessionEvent};

enum Mesher {
    Greedy { builder: GreedyMeshBuilder, mesh: LayeredMesh },
    Isosurface(IsosurfaceBuilder),
}

pub struct SculptSession {
    config: SessionConfig,
    chunk: VoxelChunk,
    engine: CarvingEngine,
    history: HistoryManager,
    mesher: Mesher,
    worker: PersistenceWorker,
    queue: VecDeque<SessionCommand>,
    /// Path of the load currently blocking the queue
    pending_load: Option<PathBuf>,
    dirty_layers: BTreeSet<u32>,
    full_remesh: bool,
    mesh_revision: u64,
    initial_scale: f32,
    carve_stride: u32,
}

fn fresh_chunk(config: &SessionConfig, fill: InitialFill) -> Result<VoxelChunk> {
    let [x, y, z] = config.dims;
    let mut chunk = VoxelChunk::new(UVec3::new(x, y, z))?;
    match fill {
        InitialFill::Solid => chunk.fill_solid(),
        InitialFill::EllipsoidShell { thickness } => chunk.fill_ellipsoid_shell(thickness),
    }
    Ok(chunk)
}

impl SculptSession {
    /// Validate `config`, allocate the stone and build its first mesh
    pub fn initialize(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let chunk = fresh_chunk(&config, config.initial_fill)?;

        let mesher = match config.mesher {
            MesherKind::Greedy => Mesher::Greedy {
                builder: GreedyMeshBuilder::with_scale(config.isosurface.grid_scale),
                mesh: LayeredMesh::default(),
            },
            MesherKind::Isosurface => Mesher::Isosurface(IsosurfaceBuilder::from_config(config.isosurface)?),
        };

        log::info!(
            "Session initialized: {:?} stone, {:?} mesher, history {}",
            chunk.dims(),
            config.mesher,
            config.max_history
        );

        let mut session = Self {
            history: HistoryManager::new(config.max_history, config.redo_policy),
            chunk,
            engine: CarvingEngine::new(),
            mesher,
            worker: PersistenceWorker::new()?,
            queue: VecDeque::new(),
            pending_load: None,
            dirty_layers: BTreeSet::new(),
            full_remesh: true,
            mesh_revision: 0,
            initial_scale: 1.0,
            carve_stride: 1,
            config,
        };
        session.remesh()?;
        Ok(session)
    }

    /// Wait for pending saves and release the stone
    pub fn teardown(mut self) -> Result<()> {
        self.queue.clear();
        for result in self.worker.wait_idle() {
            if let PersistenceResult::SaveFailed { path, message } = result {
                log::warn!("Save to {} failed during teardown: {message}", path.display());
            }
        }
        let SculptSession { chunk, .. } = self;
        chunk.dispose();
        log::info!("Session torn down");
        Ok(())
    }

    /// Queue a command for the next `step`
    pub fn submit(&mut self, command: SessionCommand) {
        self.queue.push_back(command);
    }

    /// Queue a carve at the current LOD stride
    pub fn carve(&mut self, shape: ToolShape, tool_to_chunk: Affine3A) {
        let request = CarveRequest::new(shape)
            .with_transform(tool_to_chunk)
            .with_stride(self.carve_stride);
        self.submit(SessionCommand::Carve(request));
    }

    pub fn undo(&mut self) {
        self.submit(SessionCommand::Undo);
    }

    pub fn redo(&mut self) {
        self.submit(SessionCommand::Redo);
    }

    pub fn new_stone(&mut self) {
        self.submit(SessionCommand::New);
    }

    pub fn load(&mut self, path: impl Into<PathBuf>) {
        self.submit(SessionCommand::Load(path.into()));
    }

    pub fn save(&mut self, path: impl Into<PathBuf>) {
        self.submit(SessionCommand::Save(path.into()));
    }

    /// False while a load is in flight
    pub fn is_ready(&self) -> bool {
        self.pending_load.is_none()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Scale of the stone when the session began
    pub fn set_initial_scale(&mut self, scale: f32) {
        self.initial_scale = scale;
        self.set_stone_scale(scale);
    }

    /// Pick the carve stride for the stone's current scale
    pub fn set_stone_scale(&mut self, scale: f32) {
        let stride = self.config.lod.stride_for_scale(scale, self.initial_scale);
        if stride != self.carve_stride {
            log::debug!("Carve stride {} -> {} at scale {scale}", self.carve_stride, stride);
        }
        self.carve_stride = stride;
    }

    pub fn carve_stride(&self) -> u32 {
        self.carve_stride
    }

    /// Apply finished I/O, drain the queue (when ready) and remesh
    pub fn step(&mut self) -> Result<Vec<SessionEvent>> {
        let mut events = Vec::new();
        let results = self.worker.poll_results();
        self.handle_results(results, &mut events)?;
        self.drain_queue(&mut events)?;
        self.remesh_into(&mut events)?;
        Ok(events)
    }

    /// Step until the queue is empty and no I/O is outstanding
    pub fn flush(&mut self) -> Result<Vec<SessionEvent>> {
        let mut events = self.step()?;
        while !self.queue.is_empty() || self.worker.pending_count() > 0 {
            let results = self.worker.wait_idle();
            if results.is_empty() && !self.is_ready() {
                return Err(Error::Worker("load never completed".into()));
            }
            self.handle_results(results, &mut events)?;
            self.drain_queue(&mut events)?;
            self.remesh_into(&mut events)?;
        }
        Ok(events)
    }

    fn drain_queue(&mut self, events: &mut Vec<SessionEvent>) -> Result<()> {
        while self.is_ready() {
            let Some(command) = self.queue.pop_front() else { break };
            self.apply(command, events)?;
        }
        Ok(())
    }

    fn apply(&mut self, command: SessionCommand, events: &mut Vec<SessionEvent>) -> Result<()> {
        match command {
            SessionCommand::Carve(request) => {
                let batch = self.engine.carve(&mut self.chunk, &request);
                let outcome = CarveOutcome { cells_changed: batch.len() };
                if outcome.changed() {
                    log::debug!("Carved {} cells on {} layers", batch.len(), batch.layers().count());
                    self.dirty_layers.extend(batch.layers());
                    self.history.record(batch);
                }
                events.push(SessionEvent::Carved(outcome));
            }
            SessionCommand::Undo => match self.history.undo(&mut self.chunk) {
                Some(layers) => {
                    self.dirty_layers.extend(layers.iter().copied());
                    events.push(SessionEvent::Undone { layers });
                }
                None => events.push(SessionEvent::NothingToUndo),
            },
            SessionCommand::Redo => match self.history.redo(&mut self.chunk) {
                Some(layers) => {
                    self.dirty_layers.extend(layers.iter().copied());
                    events.push(SessionEvent::Redone { layers });
                }
                None => events.push(SessionEvent::NothingToRedo),
            },
            SessionCommand::New => {
                let chunk = fresh_chunk(&self.config, self.config.initial_fill)?;
                let dims = chunk.dims();
                self.replace_chunk(chunk);
                log::info!("New stone {:?}", dims);
                events.push(SessionEvent::Created { dims });
            }
            SessionCommand::Load(path) => {
                if self.worker.load(&path)? {
                    log::info!("Loading stone from {}", path.display());
                    self.pending_load = Some(path.clone());
                    events.push(SessionEvent::LoadStarted(path));
                }
            }
            SessionCommand::Save(path) => {
                // Encode now so later carves cannot race the write
                let bytes = disk_io::save_as(&self.chunk, self.config.save_format);
                self.worker.save(&path, bytes)?;
                events.push(SessionEvent::SaveQueued(path));
            }
        }
        Ok(())
    }

    fn handle_results(&mut self, results: Vec<PersistenceResult>, events: &mut Vec<SessionEvent>) -> Result<()> {
        for result in results {
            match result {
                PersistenceResult::Saved { path, bytes } => {
                    events.push(SessionEvent::Saved { path, bytes });
                }
                PersistenceResult::SaveFailed { path, message } => {
                    log::warn!("Save to {} failed: {message}", path.display());
                    events.push(SessionEvent::SaveFailed { path, message });
                }
                PersistenceResult::Loaded { path, chunk } => {
                    let dims = chunk.dims();
                    self.replace_chunk(chunk);
                    self.finish_load(path, LoadOutcome::Loaded { dims }, events);
                }
                PersistenceResult::Corrupt { path, error } => {
                    self.recover(path, error.to_string(), events)?;
                }
                PersistenceResult::NotFound(path) => {
                    self.recover(path, "no saved stone".to_string(), events)?;
                }
                PersistenceResult::LoadFailed { path, message } => {
                    self.recover(path, message, events)?;
                }
            }
        }
        Ok(())
    }

    fn is_pending_load(&self, path: &Path) -> bool {
        self.pending_load.as_deref() == Some(path)
    }

    /// Fall back to a fresh solid stone after a failed load
    fn recover(&mut self, path: PathBuf, reason: String, events: &mut Vec<SessionEvent>) -> Result<()> {
        log::warn!("Load of {} failed ({reason}), starting from a solid stone", path.display());
        let chunk = fresh_chunk(&self.config, InitialFill::Solid)?;
        self.replace_chunk(chunk);
        self.finish_load(path, LoadOutcome::Recovered { reason }, events);
        Ok(())
    }

    fn finish_load(&mut self, path: PathBuf, outcome: LoadOutcome, events: &mut Vec<SessionEvent>) {
        if self.is_pending_load(&path) {
            self.pending_load = None;
        }
        events.push(SessionEvent::Loaded { path, outcome });
    }

    /// Swap in a new stone; history no longer applies to it
    fn replace_chunk(&mut self, chunk: VoxelChunk) {
        let old = std::mem::replace(&mut self.chunk, chunk);
        old.dispose();
        self.history.clear();
        self.full_remesh = true;
        self.dirty_layers.clear();
    }

    fn remesh(&mut self) -> Result<()> {
        let mut events = Vec::new();
        self.remesh_into(&mut events)
    }

    fn remesh_into(&mut self, events: &mut Vec<SessionEvent>) -> Result<()> {
        if !self.full_remesh && self.dirty_layers.is_empty() {
            return Ok(());
        }
        let layers: Vec<u32> = std::mem::take(&mut self.dirty_layers).into_iter().collect();
        let full = std::mem::replace(&mut self.full_remesh, false);

        match &mut self.mesher {
            Mesher::Greedy { builder, mesh } => {
                if full {
                    *mesh = builder.rebuild(&mut self.chunk);
                } else {
                    builder.rebuild_layers(&mut self.chunk, mesh, &layers);
                }
            }
            Mesher::Isosurface(builder) => {
                let report = builder.rebuild(&self.chunk)?;
                events.push(SessionEvent::Isosurface(report));
            }
        }
        self.mesh_revision += 1;
        events.push(SessionEvent::Remeshed { layers: if full { Vec::new() } else { layers } });
        Ok(())
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn chunk(&self) -> &VoxelChunk {
        &self.chunk
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    /// Bumped on every rebuild
    pub fn mesh_revision(&self) -> u64 {
        self.mesh_revision
    }

    /// Greedy mesh, if that mesher is active
    pub fn greedy_mesh(&self) -> Option<&LayeredMesh> {
        match &self.mesher {
            Mesher::Greedy { mesh, .. } => Some(mesh),
            Mesher::Isosurface(_) => None,
        }
    }

    /// Counts from the last isosurface rebuild
    pub fn isosurface_report(&self) -> Option<ExtractionReport> {
        match &self.mesher {
            Mesher::Isosurface(builder) => builder.last_report(),
            Mesher::Greedy { .. } => None,
        }
    }

    /// Read the isosurface back to the host
    pub fn read_isosurface(&mut self) -> Result<IsoMesh> {
        match &mut self.mesher {
            Mesher::Isosurface(builder) => builder.read_back(),
            Mesher::Greedy { .. } => Err(Error::Config("session is not using the isosurface mesher".into())),
        }
    }
}
