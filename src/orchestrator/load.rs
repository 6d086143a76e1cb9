//! Load phase: provision artifacts and create boundaries, parents before children.

use crate::artifact::UniqueArtifact;
use crate::error::BootError;
use crate::orchestrator::report::{BootReport, LoadOutcome};
use crate::orchestrator::{apply_outcome, TreeOrchestrator};
use crate::progress::{Phase, PhaseFinishedData};
use crate::reconcile::ReconciledNode;
use crate::types::{ExtensionId, LoadState};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Default)]
struct LoadRun {
    loaded: Mutex<BTreeMap<ExtensionId, UniqueArtifact>>,
    report: Mutex<BootReport>,
}

impl TreeOrchestrator {
    /// Runs the load phase over `tree` and writes each node's resulting state back into it.
    ///
    /// Fails only when the root itself ends in `Error`.
    pub fn load(&self, tree: &mut ReconciledNode) -> Result<LoadOutcome, BootError> {
        let application = tree.id;
        let started = Instant::now();
        let progress = self.progress();
        progress.notify_start(&application, Phase::Load);

        let run = LoadRun::default();
        {
            let root: &ReconciledNode = tree;
            self.pool.block_on(self.load_node(&run, root, None));
        }
        let loaded = run.loaded.into_inner();
        let report = run.report.into_inner();
        apply_outcome(tree, &|id| loaded.contains_key(id), LoadState::Loaded, &report);

        let finished = PhaseFinishedData {
            ok: tree.load_state != LoadState::Error,
            nodes: tree.iter().count(),
            failed: report.len(),
            duration_ms: started.elapsed().as_millis(),
        };
        progress.notify_finish(&application, Phase::Load, &finished);

        if tree.load_state == LoadState::Error {
            warn!(application = %application, "Root extension failed to load");
            return Err(BootError::Load(report));
        }
        info!(
            application = %application,
            loaded = loaded.len(),
            failed = report.len(),
            "Load phase complete"
        );
        Ok(LoadOutcome {
            loaded: loaded.len(),
            failed: report.len(),
            report,
            resolved: loaded,
        })
    }

    fn load_node<'a>(
        &'a self,
        run: &'a LoadRun,
        node: &'a ReconciledNode,
        parent: Option<ExtensionId>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if node.load_state.is_skipped() {
                debug!(extension_id = %node.id, state = %node.load_state, "Skipping subtree");
                return;
            }

            let id = node.id;
            let coordinate = node.coordinate.clone();
            let strategy = node.strategy;
            let provisioner = self.provisioner.clone();
            let boundaries = self.boundaries.clone();
            let outcome = self
                .pool
                .run(move || -> Result<UniqueArtifact, String> {
                    let resolved = provisioner
                        .provision(&id, &coordinate, strategy)
                        .map_err(|e| e.to_string())?;
                    boundaries
                        .create(id, parent, &resolved)
                        .map_err(|e| e.to_string())?;
                    Ok(resolved.unique)
                })
                .await
                .and_then(|result| result);

            match outcome {
                Ok(unique) => {
                    debug!(extension_id = %id, artifact = %unique, phase = "load", "Loaded");
                    run.loaded.lock().insert(id, unique);
                }
                Err(message) => {
                    warn!(extension_id = %id, phase = "load", error = %message, "Load failed");
                    run.report.lock().record(id, message);
                    return;
                }
            }

            let mut children: FuturesUnordered<_> = node
                .children
                .iter()
                .map(|child| self.load_node(run, child, Some(id)))
                .collect();
            while children.next().await.is_some() {}
        }
        .boxed()
    }
}
