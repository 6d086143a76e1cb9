//! Launch phase: create runtime contexts over loaded boundaries, parents before children.

use crate::boundary::Symbol;
use crate::error::{BootError, ContextError};
use crate::orchestrator::report::{BootReport, LaunchOutcome};
use crate::orchestrator::{apply_outcome, TreeOrchestrator};
use crate::progress::{Phase, PhaseFinishedData};
use crate::reconcile::ReconciledNode;
use crate::runtime::{RuntimeContext, ScopeRegistry, Visibility};
use crate::types::{ExtensionId, LoadState};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Default)]
struct LaunchRun {
    running: Mutex<HashSet<ExtensionId>>,
    report: Mutex<BootReport>,
}

impl TreeOrchestrator {
    /// Runs the launch phase over the loaded nodes of `tree`, rooted at `bootstrap`.
    ///
    /// Any diagnostic anywhere in the tree fails the launch with the full report; contexts that
    /// did start stay running.
    pub fn launch(
        &self,
        tree: &mut ReconciledNode,
        bootstrap: Arc<dyn RuntimeContext>,
        scopes: &Arc<ScopeRegistry>,
    ) -> Result<LaunchOutcome, BootError> {
        let application = tree.id;
        let started = Instant::now();
        let progress = self.progress();
        progress.notify_start(&application, Phase::Launch);

        let run = LaunchRun::default();
        {
            let root: &ReconciledNode = tree;
            self.pool
                .block_on(self.launch_node(&run, root, bootstrap, scopes));
        }
        let running = run.running.into_inner();
        let report = run.report.into_inner();
        apply_outcome(tree, &|id| running.contains(id), LoadState::Running, &report);

        let finished = PhaseFinishedData {
            ok: report.is_empty(),
            nodes: tree.iter().count(),
            failed: report.len(),
            duration_ms: started.elapsed().as_millis(),
        };
        progress.notify_finish(&application, Phase::Launch, &finished);

        if !report.is_empty() {
            warn!(
                application = %application,
                running = running.len(),
                failed = report.len(),
                "Launch phase reported failures"
            );
            return Err(BootError::Launch(report));
        }
        info!(application = %application, running = running.len(), "Launch phase complete");
        Ok(LaunchOutcome {
            running: running.len(),
        })
    }

    fn launch_node<'a>(
        &'a self,
        run: &'a LaunchRun,
        node: &'a ReconciledNode,
        parent: Arc<dyn RuntimeContext>,
        scopes: &'a Arc<ScopeRegistry>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if node.load_state != LoadState::Loaded {
                debug!(extension_id = %node.id, state = %node.load_state, "Not launching subtree");
                return;
            }
            let id = node.id;
            let Some(boundary) = self.boundaries.get(&id) else {
                run.report
                    .lock()
                    .record(id, ContextError::BoundaryNotLoaded(id).to_string());
                return;
            };

            // Children launch after their parent, so their exports come from their boundaries.
            let exported: Vec<Symbol> = node
                .children
                .iter()
                .filter(|child| child.load_state == LoadState::Loaded)
                .filter_map(|child| self.boundaries.get(&child.id))
                .flat_map(|child| child.exported_symbols().cloned().collect::<Vec<_>>())
                .collect();
            let inherited = if node.sealed {
                parent.deported_symbols()
            } else {
                Vec::new()
            };
            let visibility = Visibility {
                exported,
                inherited,
            };

            let factory = self.factory.clone();
            let task_scopes = scopes.clone();
            let outcome = self
                .pool
                .run(move || {
                    factory
                        .create(id, parent, boundary, visibility, &task_scopes)
                        .map_err(|e| e.to_string())
                })
                .await
                .and_then(|result| result);

            let context = match outcome {
                Ok(context) => context,
                Err(message) => {
                    warn!(extension_id = %id, phase = "launch", error = %message, "Launch failed");
                    run.report.lock().record(id, message);
                    return;
                }
            };
            debug!(extension_id = %id, phase = "launch", "Running");
            self.contexts.lock().insert(id, context.clone());
            run.running.lock().insert(id);

            let mut children: FuturesUnordered<_> = node
                .children
                .iter()
                .map(|child| self.launch_node(run, child, context.clone(), scopes))
                .collect();
            while children.next().await.is_some() {}
        }
        .boxed()
    }
}
