//! Shared fixtures: a directory-backed repository, a local cache, a sled state store and an
//! in-memory registry, wired into a [`Platform`].

use canopy::artifact::{
    Artifact, ArtifactResolver, DependencyDecl, Descriptor, DirectoryRepository, LocalCache,
    Repository, Scope, SymbolDecl, Version,
};
use canopy::orchestrator::{ResolverProvisioner, TreeOrchestrator, WorkerPool};
use canopy::platform::Platform;
use canopy::progress::RunHistory;
use canopy::error::RegistryError;
use canopy::registry::{RegistryClient, StaticRegistryClient};
use canopy::runtime::SymbolContextFactory;
use canopy::store::SledStateStore;
use canopy::types::{ApplicationId, Coordinate, ExtensionId, RegistryNode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const GROUP: &str = "org.example";

/// Publishes artifacts with descriptors into a temp-dir repository.
pub struct RepositoryBuilder {
    _dir: TempDir,
    repository: Arc<DirectoryRepository>,
}

impl RepositoryBuilder {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repository = Arc::new(DirectoryRepository::new("central", dir.path()));
        Self {
            _dir: dir,
            repository,
        }
    }

    pub fn repository(&self) -> Arc<DirectoryRepository> {
        self.repository.clone()
    }

    pub fn publish(&self, name: &str, version: &str) -> &Self {
        self.publish_with(name, version, Vec::new(), Vec::new())
    }

    pub fn publish_with(
        &self,
        name: &str,
        version: &str,
        dependencies: Vec<(&str, &str)>,
        symbols: Vec<SymbolDecl>,
    ) -> &Self {
        let artifact = Artifact::new(GROUP, name);
        let parsed = Version::parse(version);
        let mut descriptor = Descriptor::leaf(&artifact, &parsed);
        descriptor.dependencies = dependencies
            .into_iter()
            .map(|(dep, range)| DependencyDecl {
                group: GROUP.to_string(),
                name: dep.to_string(),
                version: range.to_string(),
                scope: Scope::Runtime,
            })
            .collect();
        descriptor.symbols = symbols;
        self.repository
            .publish(
                &artifact,
                &parsed,
                format!("{}-{}", name, version).as_bytes(),
                Some(&descriptor),
            )
            .unwrap();
        self
    }
}

pub fn symbol(name: &str, category: &str, exported: bool) -> SymbolDecl {
    SymbolDecl {
        name: name.to_string(),
        categories: vec![category.to_string()],
        exported,
    }
}

pub fn node(name: &str, version: Option<&str>) -> RegistryNode {
    RegistryNode::new(ExtensionId::new(), Coordinate::new(GROUP, name, version))
}

/// In-memory registry that can be switched to unreachable.
#[derive(Default)]
pub struct TestRegistry {
    trees: StaticRegistryClient,
    unreachable: AtomicBool,
}

impl TestRegistry {
    pub fn set(&self, tree: RegistryNode) {
        self.trees.set(tree);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

impl RegistryClient for TestRegistry {
    fn compute_expected_tree(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<RegistryNode>, RegistryError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unreachable("connection refused".to_string()));
        }
        self.trees.compute_expected_tree(application_id)
    }
}

/// A platform over temp-dir storage with an in-memory registry.
pub struct PlatformFixture {
    pub repo: RepositoryBuilder,
    pub registry: Arc<TestRegistry>,
    pub platform: Platform,
    _state_dir: TempDir,
    cache_dir: TempDir,
}

impl PlatformFixture {
    pub fn new() -> Self {
        let repo = RepositoryBuilder::new();
        let state_dir = TempDir::new().unwrap();
        let cache_dir = TempDir::new().unwrap();

        let store = SledStateStore::new(state_dir.path()).unwrap();
        let history = RunHistory::new(store.db().clone()).unwrap();
        let resolver = ArtifactResolver::new(
            vec![repo.repository() as Arc<dyn Repository>],
            Arc::new(LocalCache::new(cache_dir.path())),
        );
        let orchestrator = TreeOrchestrator::new(
            WorkerPool::new(4).unwrap(),
            Arc::new(ResolverProvisioner::new(resolver.clone(), false)),
            Arc::new(SymbolContextFactory::new()),
        );
        let registry = Arc::new(TestRegistry::default());
        let platform = Platform::new(Arc::new(store), registry.clone(), resolver, orchestrator)
            .with_history(history, 10);

        Self {
            repo,
            registry,
            platform,
            _state_dir: state_dir,
            cache_dir,
        }
    }

    /// Empties the local artifact cache.
    pub fn wipe_cache(&self) {
        for entry in std::fs::read_dir(self.cache_dir.path()).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                std::fs::remove_dir_all(path).unwrap();
            } else {
                std::fs::remove_file(path).unwrap();
            }
        }
    }

    /// Number of entries directly under the cache root.
    pub fn cache_entries(&self) -> usize {
        std::fs::read_dir(self.cache_dir.path()).unwrap().count()
    }
}
