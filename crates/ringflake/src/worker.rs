use crate::error::Result;

/// Assigns the numeric identity embedded in every identifier a process
/// generates.
///
/// Global uniqueness of generated identifiers reduces to uniqueness of
/// worker ids among concurrently live processes, so production
/// deployments back this with shared storage (typically a table whose
/// auto-incremented row id becomes the worker id, keyed by host and
/// process metadata). That backend lives outside this crate; the
/// capability boundary is this one-method trait.
pub trait WorkerIdAssigner: Send + Sync {
    /// Returns a worker id for this process.
    ///
    /// The value must lie in `[0, max_worker_id]` for the generator's bit
    /// layout; the generator validates the range at startup.
    ///
    /// # Errors
    /// Returns [`Error::WorkerIdAssignment`] when no identity can be
    /// obtained, which fails generator construction.
    ///
    /// [`Error::WorkerIdAssignment`]: crate::Error::WorkerIdAssignment
    fn assign_worker_id(&self) -> Result<i64>;
}

/// Hands out a preassigned worker id.
///
/// For deployments where the id is provisioned out of band (an
/// environment value, an ordinal from the orchestrator) and for tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedWorkerIdAssigner {
    worker_id: i64,
}

impl FixedWorkerIdAssigner {
    pub const fn new(worker_id: i64) -> Self {
        Self { worker_id }
    }
}

impl WorkerIdAssigner for FixedWorkerIdAssigner {
    fn assign_worker_id(&self) -> Result<i64> {
        tracing::info!("reusing preassigned worker id:{}", self.worker_id);
        Ok(self.worker_id)
    }
}
