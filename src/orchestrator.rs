//! Tree Orchestrator
//!
//! Walks a reconciled tree twice. The load phase provisions each node's artifacts and creates its
//! boundary; the launch phase creates each node's runtime context. Both phases share one shape:
//! a node's work runs as one task on the bounded [`WorkerPool`], and only once it succeeds are the
//! node's children submitted, concurrently, to the same pool. A failing node is marked `Error`
//! with its diagnostics and its subtree is skipped; its siblings carry on.
//!
//! Teardown is bottom-up: contexts are stopped children first, then boundaries are closed
//! children first.

pub mod launch;
pub mod load;
pub mod pool;
pub mod provision;
pub mod report;
pub mod teardown;

pub use pool::WorkerPool;
pub use provision::{ArtifactProvisioner, ResolverProvisioner};
pub use report::{BootReport, LaunchOutcome, LoadOutcome};

use crate::boundary::BoundaryManager;
use crate::progress::{ProgressSink, TracingProgress};
use crate::reconcile::ReconciledNode;
use crate::runtime::{RuntimeContext, RuntimeContextFactory};
use crate::types::{ExtensionId, LoadState};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

pub struct TreeOrchestrator {
    pool: WorkerPool,
    boundaries: Arc<BoundaryManager>,
    provisioner: Arc<dyn ArtifactProvisioner>,
    factory: Arc<dyn RuntimeContextFactory>,
    progress: RwLock<Arc<dyn ProgressSink>>,
    contexts: Mutex<HashMap<ExtensionId, Arc<dyn RuntimeContext>>>,
}

impl TreeOrchestrator {
    pub fn new(
        pool: WorkerPool,
        provisioner: Arc<dyn ArtifactProvisioner>,
        factory: Arc<dyn RuntimeContextFactory>,
    ) -> Self {
        Self {
            pool,
            boundaries: Arc::new(BoundaryManager::new()),
            provisioner,
            factory,
            progress: RwLock::new(Arc::new(TracingProgress)),
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_progress(self, progress: Arc<dyn ProgressSink>) -> Self {
        self.set_progress(progress);
        self
    }

    /// Replaces the sink for subsequent phases and returns the previous one.
    pub fn set_progress(&self, progress: Arc<dyn ProgressSink>) -> Arc<dyn ProgressSink> {
        std::mem::replace(&mut *self.progress.write(), progress)
    }

    pub fn progress(&self) -> Arc<dyn ProgressSink> {
        self.progress.read().clone()
    }

    pub fn pool_size(&self) -> usize {
        self.pool.size()
    }

    pub fn boundaries(&self) -> &Arc<BoundaryManager> {
        &self.boundaries
    }

    pub fn context(&self, id: &ExtensionId) -> Option<Arc<dyn RuntimeContext>> {
        self.contexts.lock().get(id).cloned()
    }

    pub fn is_running(&self, id: &ExtensionId) -> bool {
        self.contexts.lock().contains_key(id)
    }

    pub fn running_count(&self) -> usize {
        self.contexts.lock().len()
    }
}

/// Writes a phase's results back into the tree: listed successes take `success`, reported nodes
/// take `Error` and their messages.
fn apply_outcome(
    node: &mut ReconciledNode,
    succeeded: &dyn Fn(&ExtensionId) -> bool,
    success: LoadState,
    report: &BootReport,
) {
    if succeeded(&node.id) {
        node.load_state = success;
    } else if report.contains(&node.id) {
        node.load_state = LoadState::Error;
        node.messages.extend(report.messages(&node.id).iter().cloned());
    }
    for child in &mut node.children {
        apply_outcome(child, succeeded, success, report);
    }
}
