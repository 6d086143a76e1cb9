//! Platform facade
//!
//! Wires the registry, the state store, the reconciler, the resolver and the orchestrator into
//! the operations an operator runs against an application: start, stop, status and the explicit
//! extension lifecycle edits. Every start and stop is recorded in the run history when one is
//! attached.

use crate::artifact::{
    Artifact, ArtifactResolver, DirectoryRepository, HttpRepository, LocalCache, Repository,
    ResolvedArtifact, UniqueArtifact,
};
use crate::boundary::Symbol;
use crate::config::CanopyConfig;
use crate::error::{ApiError, ReconcileError, ResolveError};
use crate::orchestrator::{ResolverProvisioner, TreeOrchestrator, WorkerPool};
use crate::progress::{
    FanoutProgress, HistoryProgress, ProgressEvent, ProgressSink, RunHistory, RunRecord,
};
use crate::reconcile::{reconcile, ReconciledNode, UpdatePolicy};
use crate::registry::{FileRegistryClient, HttpRegistryClient, RegistryClient, StaticRegistryClient};
use crate::runtime::{
    BootstrapContext, PublishedEvent, RuntimeContext, ScopeRegistry, SymbolContextFactory,
};
use crate::store::{ApplicationRecord, SledStateStore, StateStore};
use crate::types::{ApplicationId, Coordinate, ExtensionId, ExtensionNode, LoadState};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a successful start.
#[derive(Debug, Clone, Serialize)]
pub struct StartReport {
    pub application: ApplicationId,
    pub policy: UpdatePolicy,
    pub tree: ExtensionNode,
    pub loaded: usize,
    /// Extensions that failed to load; their errors are in the tree's messages.
    pub failed: usize,
    pub running: usize,
    pub run_id: Option<String>,
}

struct RunningApplication {
    tree: ReconciledNode,
    scopes: Arc<ScopeRegistry>,
}

/// History bookkeeping for one start or stop.
struct ActiveRun {
    run_id: String,
    previous: Arc<dyn ProgressSink>,
}

pub struct Platform {
    store: Arc<dyn StateStore>,
    registry: Arc<dyn RegistryClient>,
    resolver: ArtifactResolver,
    orchestrator: TreeOrchestrator,
    history: Option<RunHistory>,
    max_history: usize,
    allow_snapshots: bool,
    bootstrap_symbols: Vec<Symbol>,
    running: Mutex<HashMap<ApplicationId, RunningApplication>>,
    run_lock: Mutex<()>,
}

impl Platform {
    pub fn new(
        store: Arc<dyn StateStore>,
        registry: Arc<dyn RegistryClient>,
        resolver: ArtifactResolver,
        orchestrator: TreeOrchestrator,
    ) -> Self {
        Self {
            store,
            registry,
            resolver,
            orchestrator,
            history: None,
            max_history: 50,
            allow_snapshots: false,
            bootstrap_symbols: Vec::new(),
            running: Mutex::new(HashMap::new()),
            run_lock: Mutex::new(()),
        }
    }

    /// Builds a platform from configuration: sled state and history, configured repositories
    /// and registry, and a worker pool of the configured size.
    pub fn open(config: &CanopyConfig) -> Result<Self, ApiError> {
        config.ensure_valid()?;

        let store = SledStateStore::new(&config.storage.state_path)?;
        let history = RunHistory::new(store.db().clone())?;
        let interrupted = history.mark_interrupted_runs()?;
        if interrupted > 0 {
            warn!(runs = interrupted, "Marked runs left active by a previous process as interrupted");
        }

        let mut repositories: Vec<Arc<dyn Repository>> = Vec::new();
        for repository in &config.repositories {
            if repository.is_remote() {
                repositories.push(Arc::new(HttpRepository::new(
                    &repository.id,
                    &repository.location,
                )?));
            } else {
                repositories.push(Arc::new(DirectoryRepository::new(
                    &repository.id,
                    &repository.location,
                )));
            }
        }
        let cache = Arc::new(LocalCache::new(&config.storage.cache_path));
        let mut resolver = ArtifactResolver::new(repositories, cache);
        if config.resolver.offline {
            resolver = resolver.offline();
        }

        let registry: Arc<dyn RegistryClient> = match &config.registry.location {
            Some(location) if location.starts_with("http://") || location.starts_with("https://") => {
                Arc::new(HttpRegistryClient::new(location)?)
            }
            Some(location) => Arc::new(FileRegistryClient::new(location)),
            None => Arc::new(StaticRegistryClient::new()),
        };

        let pool = WorkerPool::new(config.orchestrator.parallelism.unwrap_or(0))
            .map_err(|e| ApiError::ConfigError(format!("Failed to start worker pool: {}", e)))?;
        let orchestrator = TreeOrchestrator::new(
            pool,
            Arc::new(ResolverProvisioner::new(
                resolver.clone(),
                config.resolver.allow_snapshots,
            )),
            Arc::new(SymbolContextFactory::new()),
        );

        let bootstrap_symbols = config.bootstrap.symbols.iter().map(Symbol::from).collect();
        Ok(Self::new(Arc::new(store), registry, resolver, orchestrator)
            .with_history(history, config.storage.max_history)
            .with_snapshots(config.resolver.allow_snapshots)
            .with_bootstrap_symbols(bootstrap_symbols))
    }

    pub fn with_history(mut self, history: RunHistory, max_history: usize) -> Self {
        self.history = Some(history);
        self.max_history = max_history;
        self
    }

    pub fn with_snapshots(mut self, allow_snapshots: bool) -> Self {
        self.allow_snapshots = allow_snapshots;
        self
    }

    /// Symbols of the bootstrap context every application's root is parented to.
    pub fn with_bootstrap_symbols(mut self, symbols: Vec<Symbol>) -> Self {
        self.bootstrap_symbols = symbols;
        self
    }

    pub fn orchestrator(&self) -> &TreeOrchestrator {
        &self.orchestrator
    }

    pub fn is_running(&self, application: &ApplicationId) -> bool {
        self.running.lock().contains_key(application)
    }

    /// Reconciles, loads and launches an application.
    ///
    /// The resulting tree is persisted whatever the outcome. A launch failure leaves the
    /// contexts that did start running, so the application must still be stopped.
    pub fn start(
        &self,
        application: ApplicationId,
        policy: UpdatePolicy,
    ) -> Result<StartReport, ApiError> {
        let _guard = self.run_lock.lock();
        if self.is_running(&application) {
            return Err(ApiError::AlreadyRunning(application));
        }

        let run = self.begin_run(application, "start", Some(policy));
        let result = self.boot(application, policy).map(|mut report| {
            report.run_id = run.as_ref().map(|r| r.run_id.clone());
            report
        });
        self.end_run(run, result.as_ref().err());
        result
    }

    fn boot(
        &self,
        application: ApplicationId,
        policy: UpdatePolicy,
    ) -> Result<StartReport, ApiError> {
        let saved = self.store.load(&application)?;
        let expected = match self.registry.compute_expected_tree(&application) {
            Ok(expected) => expected,
            Err(err) if saved.is_some() => {
                warn!(application = %application, error = %err, "Registry unavailable, using saved state");
                None
            }
            Err(err) => return Err(err.into()),
        };
        if saved.is_none() && expected.is_none() {
            return Err(ApiError::ApplicationNotFound(application));
        }

        let mut tree = reconcile(saved.as_ref(), expected.as_ref(), policy)?;
        if tree.id != application {
            return Err(ReconcileError::InvalidTree(format!(
                "root {} does not match application {}",
                tree.id, application
            ))
            .into());
        }
        info!(
            application = %application,
            policy = %policy,
            extensions = tree.iter().count(),
            "Reconciled extension tree"
        );

        let loaded = match self.orchestrator.load(&mut tree) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.orchestrator.unload(&mut tree)?;
                self.store.save(&tree.to_extension_node())?;
                return Err(err.into());
            }
        };
        pin_versions(&mut tree, &loaded.resolved);

        let scopes = Arc::new(ScopeRegistry::new());
        let bootstrap: Arc<dyn RuntimeContext> = Arc::new(BootstrapContext::new(
            self.bootstrap_symbols.clone(),
            scopes.clone(),
        ));
        let launched = self.orchestrator.launch(&mut tree, bootstrap, &scopes);

        let snapshot = tree.to_extension_node();
        self.running
            .lock()
            .insert(application, RunningApplication { tree, scopes });
        self.store.save(&snapshot)?;

        let outcome = launched?;
        Ok(StartReport {
            application,
            policy,
            tree: snapshot,
            loaded: loaded.loaded,
            failed: loaded.failed,
            running: outcome.running,
            run_id: None,
        })
    }

    /// Stops every context bottom-up, closes every boundary bottom-up and persists the tree.
    pub fn stop(&self, application: ApplicationId) -> Result<ExtensionNode, ApiError> {
        let _guard = self.run_lock.lock();
        let Some(mut running) = self.running.lock().remove(&application) else {
            return Err(ApiError::NotRunning(application));
        };

        let run = self.begin_run(application, "stop", None);
        let result = self.teardown(&mut running.tree);
        self.end_run(run, result.as_ref().err());
        result
    }

    fn teardown(&self, tree: &mut ReconciledNode) -> Result<ExtensionNode, ApiError> {
        self.orchestrator.stop(tree);
        self.orchestrator.unload(tree)?;
        let node = tree.to_extension_node();
        self.store.save(&node)?;
        Ok(node)
    }

    /// The live tree of a running application, otherwise the persisted one.
    pub fn status(&self, application: &ApplicationId) -> Result<ExtensionNode, ApiError> {
        if let Some(running) = self.running.lock().get(application) {
            return Ok(running.tree.to_extension_node());
        }
        self.store
            .load(application)?
            .ok_or(ApiError::ApplicationNotFound(*application))
    }

    pub fn applications(&self) -> Result<Vec<ApplicationRecord>, ApiError> {
        Ok(self.store.applications()?)
    }

    /// Events published by the contexts of a running application.
    pub fn published_events(
        &self,
        application: &ApplicationId,
    ) -> Result<Vec<PublishedEvent>, ApiError> {
        self.running
            .lock()
            .get(application)
            .map(|running| running.scopes.events())
            .ok_or(ApiError::NotRunning(*application))
    }

    pub fn disable(
        &self,
        application: &ApplicationId,
        extension: &ExtensionId,
    ) -> Result<ExtensionNode, ApiError> {
        self.set_state(application, extension, LoadState::Disabled)
    }

    /// Clears a skip state so the extension takes part in the next start again.
    pub fn enable(
        &self,
        application: &ApplicationId,
        extension: &ExtensionId,
    ) -> Result<ExtensionNode, ApiError> {
        self.set_state(application, extension, LoadState::Unloaded)
    }

    /// Marks an extension deleted. The node stays in the tree so reconciliation cannot bring it
    /// back silently.
    pub fn delete_extension(
        &self,
        application: &ApplicationId,
        extension: &ExtensionId,
    ) -> Result<ExtensionNode, ApiError> {
        self.set_state(application, extension, LoadState::Deleted)
    }

    fn set_state(
        &self,
        application: &ApplicationId,
        extension: &ExtensionId,
        state: LoadState,
    ) -> Result<ExtensionNode, ApiError> {
        let _guard = self.run_lock.lock();
        if self.is_running(application) {
            return Err(ApiError::AlreadyRunning(*application));
        }
        let mut tree = self
            .store
            .load(application)?
            .ok_or(ApiError::ApplicationNotFound(*application))?;
        let node = tree
            .find_mut(extension)
            .ok_or(ApiError::ExtensionNotFound {
                application: *application,
                extension: *extension,
            })?;
        node.load_state = state;
        if state == LoadState::Unloaded {
            node.messages.clear();
        }
        self.store.save(&tree)?;
        info!(application = %application, extension_id = %extension, state = %state, "Extension state changed");
        Ok(tree)
    }

    pub fn versions(&self, artifact: &Artifact) -> Result<Vec<UniqueArtifact>, ApiError> {
        Ok(self.resolver.find_versions(artifact)?)
    }

    pub fn resolve(&self, coordinate: &Coordinate) -> Result<ResolvedArtifact, ApiError> {
        self.resolver
            .resolve_coordinate(coordinate, self.allow_snapshots)?
            .ok_or_else(|| ResolveError::NotFound(coordinate.to_string()).into())
    }

    pub fn history(
        &self,
        application: Option<&ApplicationId>,
    ) -> Result<Vec<RunRecord>, ApiError> {
        match &self.history {
            Some(history) => Ok(history.list_runs(application)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn run_events(&self, run_id: &str) -> Result<Vec<ProgressEvent>, ApiError> {
        match &self.history {
            Some(history) => Ok(history.read_events(run_id)?),
            None => Ok(Vec::new()),
        }
    }

    fn begin_run(
        &self,
        application: ApplicationId,
        command: &str,
        policy: Option<UpdatePolicy>,
    ) -> Option<ActiveRun> {
        let history = self.history.as_ref()?;
        let run_id = match history.begin(application, command, policy.map(UpdatePolicy::as_str)) {
            Ok(run_id) => run_id,
            Err(err) => {
                warn!(application = %application, error = %err, "Failed to record run");
                return None;
            }
        };
        let previous = self.orchestrator.progress();
        let fanout = FanoutProgress::new(vec![
            previous.clone(),
            Arc::new(HistoryProgress::new(history.clone(), run_id.clone())) as Arc<dyn ProgressSink>,
        ]);
        self.orchestrator.set_progress(Arc::new(fanout));
        Some(ActiveRun { run_id, previous })
    }

    fn end_run(&self, run: Option<ActiveRun>, error: Option<&ApiError>) {
        let (Some(run), Some(history)) = (run, self.history.as_ref()) else {
            return;
        };
        self.orchestrator.set_progress(run.previous);
        if let Err(err) = history.finish(&run.run_id, error.map(|e| e.to_string())) {
            warn!(run = %run.run_id, error = %err, "Failed to finish run record");
        }
        match history.prune(self.max_history) {
            Ok(0) => {}
            Ok(pruned) => info!(pruned, "Pruned run history"),
            Err(err) => warn!(error = %err, "Failed to prune run history"),
        }
    }
}

/// Writes the version picked by resolution into every unversioned coordinate, so the next
/// `LastSuccessful` run is pinned.
fn pin_versions(node: &mut ReconciledNode, resolved: &BTreeMap<ExtensionId, UniqueArtifact>) {
    if node.coordinate.version.is_none() {
        if let Some(unique) = resolved.get(&node.id) {
            node.coordinate.version = Some(unique.version.as_str().to_string());
        }
    }
    for child in &mut node.children {
        pin_versions(child, resolved);
    }
}
