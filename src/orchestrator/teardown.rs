//! Bottom-up teardown: stop contexts, then close boundaries, children before parents.

use crate::error::BoundaryError;
use crate::orchestrator::TreeOrchestrator;
use crate::progress::{Phase, PhaseFinishedData};
use crate::reconcile::ReconciledNode;
use crate::types::LoadState;
use std::time::Instant;
use tracing::{debug, info};

impl TreeOrchestrator {
    /// Stops every running context of `tree`, children first. Stopped nodes go back to
    /// `Unloaded`; their boundaries stay open until [`TreeOrchestrator::unload`].
    pub fn stop(&self, tree: &mut ReconciledNode) -> usize {
        let application = tree.id;
        let started = Instant::now();
        let progress = self.progress();
        progress.notify_start(&application, Phase::Stop);

        let mut stopped = 0;
        self.stop_node(tree, &mut stopped);

        progress.notify_finish(
            &application,
            Phase::Stop,
            &PhaseFinishedData {
                ok: true,
                nodes: stopped,
                failed: 0,
                duration_ms: started.elapsed().as_millis(),
            },
        );
        info!(application = %application, stopped, "Stopped contexts");
        stopped
    }

    fn stop_node(&self, node: &mut ReconciledNode, stopped: &mut usize) {
        for child in node.children.iter_mut().rev() {
            self.stop_node(child, stopped);
        }
        let context = self.contexts.lock().remove(&node.id);
        if let Some(context) = context {
            context.stop();
            drop(context);
            *stopped += 1;
            debug!(extension_id = %node.id, "Context stopped");
        }
        if node.load_state == LoadState::Running {
            node.load_state = LoadState::Unloaded;
        }
    }

    /// Closes every boundary of `tree`, children first. Fails on the first node whose context
    /// is still live.
    pub fn unload(&self, tree: &mut ReconciledNode) -> Result<usize, BoundaryError> {
        let mut closed = 0;
        self.unload_node(tree, &mut closed)?;
        info!(application = %tree.id, closed, "Unloaded boundaries");
        Ok(closed)
    }

    fn unload_node(&self, node: &mut ReconciledNode, closed: &mut usize) -> Result<(), BoundaryError> {
        for child in node.children.iter_mut().rev() {
            self.unload_node(child, closed)?;
        }
        if self.boundaries.exists(&node.id) {
            self.boundaries.close(&node.id)?;
            *closed += 1;
        }
        if node.load_state == LoadState::Loaded {
            node.load_state = LoadState::Unloaded;
        }
        Ok(())
    }
}
