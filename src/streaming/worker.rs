//! Background load/save worker
//!
//! Requests go to a task on a dedicated tokio runtime over an unbounded
//! channel and are handled strictly in submission order, so a save followed
//! by a load of the same path reads what was written. Results come back on a
//! second channel and are drained with [`PersistenceWorker::poll_results`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::streaming::disk_io::{self, CodecError};
use crate::voxel::chunk::VoxelChunk;

/// Work for the persistence task
#[derive(Debug)]
pub enum PersistenceRequest {
    /// Write already-encoded bytes
    Save { path: PathBuf, bytes: Vec<u8> },
    /// Read and decode a stone
    Load { path: PathBuf },
}

impl PersistenceRequest {
    pub fn path(&self) -> &Path {
        match self {
            PersistenceRequest::Save { path, .. } | PersistenceRequest::Load { path } => path,
        }
    }
}

/// Outcome of one request
#[derive(Debug)]
pub enum PersistenceResult {
    Saved { path: PathBuf, bytes: usize },
    Loaded { path: PathBuf, chunk: VoxelChunk },
    /// File exists but does not decode
    Corrupt { path: PathBuf, error: CodecError },
    NotFound(PathBuf),
    /// Write failed
    SaveFailed { path: PathBuf, message: String },
    /// Read failed for a reason other than a missing file
    LoadFailed { path: PathBuf, message: String },
}

impl PersistenceResult {
    pub fn path(&self) -> &Path {
        match self {
            PersistenceResult::Saved { path, .. }
            | PersistenceResult::Loaded { path, .. }
            | PersistenceResult::Corrupt { path, .. }
            | PersistenceResult::SaveFailed { path, .. }
            | PersistenceResult::LoadFailed { path, .. } => path,
            PersistenceResult::NotFound(path) => path,
        }
    }

    /// Whether this answers a load request
    pub fn is_load(&self) -> bool {
        !matches!(self, PersistenceResult::Saved { .. } | PersistenceResult::SaveFailed { .. })
    }
}

/// Serial I/O worker on its own runtime
pub struct PersistenceWorker {
    request_tx: Option<mpsc::UnboundedSender<PersistenceRequest>>,
    result_rx: mpsc::UnboundedReceiver<PersistenceResult>,
    /// Requests sent but not yet answered
    in_flight: usize,
    /// Paths with a load in flight
    pending_loads: HashSet<PathBuf>,
    runtime: Option<Runtime>,
}

impl PersistenceWorker {
    pub fn new() -> Result<Self> {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<PersistenceRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<PersistenceResult>();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("chisel-io")
            .enable_all()
            .build()
            .map_err(|e| Error::Worker(format!("failed to start runtime: {e}")))?;

        runtime.spawn(Self::worker_loop(request_rx, result_tx));
        log::debug!("Persistence worker started");

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            in_flight: 0,
            pending_loads: HashSet::new(),
            runtime: Some(runtime),
        })
    }

    async fn worker_loop(
        mut request_rx: mpsc::UnboundedReceiver<PersistenceRequest>,
        result_tx: mpsc::UnboundedSender<PersistenceResult>,
    ) {
        while let Some(request) = request_rx.recv().await {
            let result = Self::handle(request).await;
            if result_tx.send(result).is_err() {
                break;
            }
        }
        log::debug!("Persistence worker stopped");
    }

    async fn handle(request: PersistenceRequest) -> PersistenceResult {
        match request {
            PersistenceRequest::Save { path, bytes } => match disk_io::save_stone(&path, &bytes).await {
                Ok(()) => {
                    log::info!("Saved stone to {} ({} bytes)", path.display(), bytes.len());
                    PersistenceResult::Saved { path, bytes: bytes.len() }
                }
                Err(e) => PersistenceResult::SaveFailed { path, message: e.to_string() },
            },
            PersistenceRequest::Load { path } => match disk_io::load_stone(&path).await {
                Ok(Some(bytes)) => match disk_io::load(&bytes) {
                    Ok(chunk) => {
                        log::info!("Loaded stone from {} ({:?})", path.display(), chunk.dims());
                        PersistenceResult::Loaded { path, chunk }
                    }
                    Err(error) => PersistenceResult::Corrupt { path, error },
                },
                Ok(None) => PersistenceResult::NotFound(path),
                Err(e) => PersistenceResult::LoadFailed { path, message: e.to_string() },
            },
        }
    }

    fn send(&mut self, request: PersistenceRequest) -> Result<()> {
        let tx = self
            .request_tx
            .as_ref()
            .ok_or_else(|| Error::Worker("worker shut down".into()))?;
        tx.send(request)
            .map_err(|_| Error::Worker("worker task exited".into()))?;
        self.in_flight += 1;
        Ok(())
    }

    /// Queue a write of encoded bytes
    pub fn save(&mut self, path: impl Into<PathBuf>, bytes: Vec<u8>) -> Result<()> {
        self.send(PersistenceRequest::Save { path: path.into(), bytes })
    }

    /// Queue a load; `false` if one for this path is already pending
    pub fn load(&mut self, path: impl Into<PathBuf>) -> Result<bool> {
        let path = path.into();
        if self.pending_loads.contains(&path) {
            return Ok(false);
        }
        self.send(PersistenceRequest::Load { path: path.clone() })?;
        self.pending_loads.insert(path);
        Ok(true)
    }

    fn complete(&mut self, result: &PersistenceResult) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if result.is_load() {
            self.pending_loads.remove(result.path());
        }
    }

    /// Drain finished results without blocking
    pub fn poll_results(&mut self) -> Vec<PersistenceResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            self.complete(&result);
            results.push(result);
        }
        results
    }

    /// Block until every queued request has been answered
    ///
    /// Must not be called from inside an async context.
    pub fn wait_idle(&mut self) -> Vec<PersistenceResult> {
        let mut results = self.poll_results();
        while self.in_flight > 0 {
            match self.result_rx.blocking_recv() {
                Some(result) => {
                    self.complete(&result);
                    results.push(result);
                }
                None => {
                    log::warn!("Persistence worker closed with {} requests outstanding", self.in_flight);
                    self.in_flight = 0;
                    self.pending_loads.clear();
                }
            }
        }
        results
    }

    /// Requests not yet answered
    pub fn pending_count(&self) -> usize {
        self.in_flight
    }

    pub fn is_loading(&self) -> bool {
        !self.pending_loads.is_empty()
    }

    pub fn is_load_pending(&self, path: &Path) -> bool {
        self.pending_loads.contains(path)
    }

    /// Finish outstanding writes and stop the runtime
    pub fn shutdown(mut self) -> Vec<PersistenceResult> {
        let results = self.wait_idle();
        self.request_tx = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        results
    }
}

impl Drop for PersistenceWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop
        self.request_tx = None;
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UVec3;
    use crate::voxel::cell::CellFlags;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stone.ston");
        let mut chunk = VoxelChunk::filled(UVec3::new(4, 3, 2)).unwrap();
        chunk.remove_flag(1, 1, 1, CellFlags::FILLED);

        let mut worker = PersistenceWorker::new().unwrap();
        worker.save(&path, disk_io::save(&chunk)).unwrap();
        assert!(worker.load(&path).unwrap());
        assert!(worker.is_load_pending(&path));

        let results = worker.wait_idle();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], PersistenceResult::Saved { .. }));
        match &results[1] {
            PersistenceResult::Loaded { chunk: loaded, .. } => assert_eq!(loaded.cells(), chunk.cells()),
            other => panic!("expected Loaded, got {other:?}"),
        }
        assert!(!worker.is_loading());
        assert_eq!(worker.pending_count(), 0);
    }

    #[test]
    fn test_duplicate_load_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing.ston");
        let mut worker = PersistenceWorker::new().unwrap();
        assert!(worker.load(&path).unwrap());
        assert!(!worker.load(&path).unwrap());

        let results = worker.wait_idle();
        assert_eq!(results.len(), 1);
        assert!(matches!(&results[0], PersistenceResult::NotFound(p) if p == &path));
    }

    #[test]
    fn test_corrupt_file_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.ston");
        std::fs::write(&path, b"STON\x01").unwrap();

        let mut worker = PersistenceWorker::new().unwrap();
        worker.load(&path).unwrap();
        let results = worker.shutdown();
        assert!(matches!(
            &results[0],
            PersistenceResult::Corrupt { error: CodecError::Truncated { .. }, .. }
        ));
    }

    #[test]
    fn test_failed_save_does_not_settle_load_of_same_path() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("stone.ston");

        let mut worker = PersistenceWorker::new().unwrap();
        worker.save(&path, vec![1, 2, 3]).unwrap();
        worker.load(&path).unwrap();

        let mut results = loop {
            let results = worker.poll_results();
            if !results.is_empty() {
                break results;
            }
            std::thread::yield_now();
        };
        if results.len() == 1 {
            // Only the save has answered; the load is still outstanding
            assert!(worker.is_load_pending(&path));
        }
        results.extend(worker.wait_idle());

        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], PersistenceResult::SaveFailed { .. }));
        assert!(!results[0].is_load());
        assert!(matches!(results[1], PersistenceResult::LoadFailed { .. }));
        assert!(!worker.is_loading());
    }

    #[test]
    fn test_poll_results_nonblocking() {
        let mut worker = PersistenceWorker::new().unwrap();
        assert!(worker.poll_results().is_empty());
        assert_eq!(worker.pending_count(), 0);
    }
}
