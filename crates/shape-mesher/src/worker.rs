//! Background regeneration: run a mesh pass on a worker thread and hand the
//! result back to the interactive side.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use brep_kernel::{BrepKernel, ShapeHandle};
use tracing::{debug, info, warn};

use crate::config::MeshOptions;
use crate::error::MeshError;
use crate::pipeline::{shape_to_mesh, MeshBundle};

/// Result of a finished regeneration. The kernel comes back unless the worker
/// panicked.
pub struct Finished<K> {
    pub shape_version: u64,
    pub kernel: Option<K>,
    pub result: Result<MeshBundle, MeshError>,
}

/// Handle to a mesh pass running on its own thread.
pub struct Regeneration<K> {
    shape_version: u64,
    result_receiver: Receiver<Result<MeshBundle, MeshError>>,
    thread_handle: Option<JoinHandle<K>>,
}

/// Move `kernel` onto a named worker thread and mesh `shape` there.
pub fn spawn_regeneration<K>(
    mut kernel: K,
    shape: ShapeHandle,
    options: MeshOptions,
    shape_version: u64,
) -> Result<Regeneration<K>, MeshError>
where
    K: BrepKernel + Send + 'static,
{
    let (result_sender, result_receiver) = mpsc::channel();
    let thread_handle = thread::Builder::new()
        .name(format!("shape-mesher-v{shape_version}"))
        .spawn(move || {
            let result = shape_to_mesh(&mut kernel, &shape, &options, shape_version);
            // The receiver may already be gone; the kernel still comes back via join.
            let _ = result_sender.send(result);
            kernel
        })
        .map_err(|e| MeshError::Internal {
            reason: format!("failed to spawn mesh worker: {e}"),
        })?;

    debug!(shape_version, "regeneration started");
    Ok(Regeneration {
        shape_version,
        result_receiver,
        thread_handle: Some(thread_handle),
    })
}

impl<K> Regeneration<K> {
    pub fn shape_version(&self) -> u64 {
        self.shape_version
    }

    /// Non-blocking poll. Returns the outcome once, then `None`.
    pub fn try_finish(&mut self) -> Option<Finished<K>> {
        self.thread_handle.as_ref()?;
        match self.result_receiver.try_recv() {
            Ok(result) => Some(self.join(Some(result))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.join(None)),
        }
    }

    /// Block until the pass is done.
    pub fn wait(mut self) -> Finished<K> {
        let result = self.result_receiver.recv().ok();
        self.join(result)
    }

    fn join(&mut self, result: Option<Result<MeshBundle, MeshError>>) -> Finished<K> {
        let kernel = self.thread_handle.take().and_then(|h| h.join().ok());
        let result = result.unwrap_or_else(|| {
            Err(MeshError::Internal {
                reason: "mesh worker panicked".to_string(),
            })
        });
        match &result {
            Ok(_) => info!(shape_version = self.shape_version, "regeneration finished"),
            Err(e) => warn!(shape_version = self.shape_version, error = %e, "regeneration failed"),
        }
        Finished {
            shape_version: self.shape_version,
            kernel,
            result,
        }
    }
}

/// What [`MeshSlot::accept`] did with a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotUpdate {
    Replaced,
    /// The pass failed; the previous bundle stays on display.
    KeptStale,
    /// The result is for an older shape version than the one displayed.
    IgnoredOutdated,
}

/// The bundle currently on display.
///
/// Only whole bundles are ever shown. A failed regeneration leaves the last
/// good bundle in place, and a result older than the displayed version is
/// ignored.
#[derive(Debug, Default)]
pub struct MeshSlot {
    current: Option<MeshBundle>,
    last_error: Option<MeshError>,
}

impl MeshSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&MeshBundle> {
        self.current.as_ref()
    }

    /// Error of the most recent failed regeneration, cleared on success.
    pub fn last_error(&self) -> Option<&MeshError> {
        self.last_error.as_ref()
    }

    pub fn accept(&mut self, result: Result<MeshBundle, MeshError>) -> SlotUpdate {
        match result {
            Ok(bundle) => {
                if let Some(current) = &self.current {
                    if bundle.shape_version < current.shape_version {
                        debug!(
                            incoming = bundle.shape_version,
                            displayed = current.shape_version,
                            "outdated bundle ignored"
                        );
                        return SlotUpdate::IgnoredOutdated;
                    }
                }
                self.current = Some(bundle);
                self.last_error = None;
                SlotUpdate::Replaced
            }
            Err(e) => {
                warn!(error = %e, "keeping previous mesh after failed regeneration");
                self.last_error = Some(e);
                SlotUpdate::KeptStale
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brep_kernel::MockKernel;

    #[test]
    fn worker_returns_bundle_and_kernel() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_box(1.0, 1.0, 1.0);
        let regeneration = spawn_regeneration(kernel, shape.clone(), MeshOptions::default(), 7).unwrap();
        assert_eq!(regeneration.shape_version(), 7);

        let finished = regeneration.wait();
        let bundle = finished.result.unwrap();
        assert_eq!(bundle.shape_version, 7);
        assert_eq!(bundle.mesh.face_metadata.len(), 6);

        let kernel = finished.kernel.unwrap();
        assert!(!kernel.is_meshed(&shape));
    }

    #[test]
    fn try_finish_reports_once() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_plate(1.0, 1.0);
        let mut regeneration = spawn_regeneration(kernel, shape, MeshOptions::default(), 1).unwrap();

        let finished = loop {
            if let Some(f) = regeneration.try_finish() {
                break f;
            }
            thread::yield_now();
        };
        assert!(finished.result.is_ok());
        assert!(regeneration.try_finish().is_none());
    }

    #[test]
    fn worker_failure_returns_error_and_released_kernel() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_box(1.0, 1.0, 1.0);
        kernel.fail_next_mesh("tolerance mismatch");
        let mut regeneration = spawn_regeneration(kernel, shape.clone(), MeshOptions::default(), 4).unwrap();

        let finished = loop {
            if let Some(f) = regeneration.try_finish() {
                break f;
            }
            thread::yield_now();
        };
        assert_eq!(finished.shape_version, 4);
        let err = finished.result.unwrap_err();
        assert!(err.is_kernel_failure());
        assert!(err.to_string().contains("tolerance mismatch"));

        let kernel = finished.kernel.unwrap();
        assert!(!kernel.is_meshed(&shape));
        assert_eq!(kernel.release_calls(), 1);

        let mut slot = MeshSlot::new();
        assert_eq!(slot.accept(Err(err)), SlotUpdate::KeptStale);
        assert!(slot.current().is_none());
    }

    #[test]
    fn slot_keeps_stale_bundle_on_failure() {
        let mut kernel = MockKernel::new();
        let shape = kernel.make_box(1.0, 1.0, 1.0);
        let mut slot = MeshSlot::new();

        let first = shape_to_mesh(&mut kernel, &shape, &MeshOptions::default(), 1);
        assert_eq!(slot.accept(first), SlotUpdate::Replaced);

        kernel.fail_next_mesh("solver blew up");
        let second = shape_to_mesh(&mut kernel, &shape, &MeshOptions::default(), 2);
        assert_eq!(slot.accept(second), SlotUpdate::KeptStale);
        assert_eq!(slot.current().unwrap().shape_version, 1);
        assert!(slot.last_error().unwrap().is_kernel_failure());

        let third = shape_to_mesh(&mut kernel, &shape, &MeshOptions::default(), 3);
        assert_eq!(slot.accept(third), SlotUpdate::Replaced);
        assert!(slot.last_error().is_none());

        let late = shape_to_mesh(&mut kernel, &shape, &MeshOptions::default(), 2);
        assert_eq!(slot.accept(late), SlotUpdate::IgnoredOutdated);
        assert_eq!(slot.current().unwrap().shape_version, 3);
    }
}
