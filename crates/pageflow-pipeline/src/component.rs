//! The component contract pipeline stages implement.

use crate::manager::DatapointManager;
use pageflow_core::Result;

/// One pipeline stage over a single datapoint.
///
/// Components mutate the graph only through the manager and are cloned
/// per worker for parallel runs, so any state they carry is worker-local.
pub trait PipelineComponent: Send + Sync {
    /// Stable component name, used in logs and failure reports.
    fn name(&self) -> &str;

    /// Run this stage over the managed datapoint.
    fn process(&mut self, manager: &mut DatapointManager) -> Result<()>;

    /// Whether a failure of this stage degrades instead of failing the
    /// datapoint. Best-effort stages log and pass the graph through.
    fn is_best_effort(&self) -> bool {
        false
    }

    /// Clone into a boxed trait object, for per-worker pipelines.
    fn clone_box(&self) -> Box<dyn PipelineComponent>;
}

impl Clone for Box<dyn PipelineComponent> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
