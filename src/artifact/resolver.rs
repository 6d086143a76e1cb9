//! Artifact resolution: version queries, transitive dependency resolution and caching.

use crate::artifact::cache::LocalCache;
use crate::artifact::coordinate::{
    Artifact, ResolvedArtifact, ResolvedDependency, UniqueArtifact,
};
use crate::artifact::descriptor::{DependencyDecl, Descriptor};
use crate::artifact::repository::Repository;
use crate::artifact::version::VersionRange;
use crate::error::ResolveError;
use crate::types::Coordinate;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cached binary path and descriptor of one artifact.
type Materialized = (PathBuf, Option<Descriptor>);

/// Resolves artifacts against a list of repositories, materialising them in a local cache.
///
/// An offline resolver never contacts a repository: version queries only see what the cache
/// holds, and resolution of anything not fully cached yields `Ok(None)`.
#[derive(Clone)]
pub struct ArtifactResolver {
    repositories: Vec<Arc<dyn Repository>>,
    cache: Arc<LocalCache>,
    offline: bool,
}

impl ArtifactResolver {
    pub fn new(repositories: Vec<Arc<dyn Repository>>, cache: Arc<LocalCache>) -> Self {
        Self {
            repositories,
            cache,
            offline: false,
        }
    }

    /// Offline view sharing this resolver's cache.
    pub fn offline(&self) -> Self {
        Self {
            repositories: self.repositories.clone(),
            cache: self.cache.clone(),
            offline: true,
        }
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Every known version, ascending.
    pub fn find_versions(&self, artifact: &Artifact) -> Result<Vec<UniqueArtifact>, ResolveError> {
        self.find_in_range(artifact, &VersionRange::all())
    }

    pub fn find_in_range(
        &self,
        artifact: &Artifact,
        range: &VersionRange,
    ) -> Result<Vec<UniqueArtifact>, ResolveError> {
        if self.offline {
            return Ok(self
                .cache
                .cached_versions(artifact)
                .into_iter()
                .filter(|unique| range.contains(&unique.version))
                .collect());
        }

        let mut found: Vec<UniqueArtifact> = Vec::new();
        let mut reached_any = false;
        let mut last_error = None;
        for repository in &self.repositories {
            match repository.list_versions(artifact) {
                Ok(entries) => {
                    reached_any = true;
                    for entry in entries {
                        if !range.contains(&entry.version)
                            || found.iter().any(|u| u.version == entry.version)
                        {
                            continue;
                        }
                        found.push(UniqueArtifact::new(
                            artifact.clone(),
                            entry.version,
                            repository.id(),
                        ));
                    }
                }
                Err(err) => {
                    warn!(
                        repository = %repository.id(),
                        artifact = %artifact,
                        error = %err,
                        "Repository query failed"
                    );
                    last_error = Some(err);
                }
            }
        }
        if !reached_any {
            if let Some(err) = last_error {
                return Err(err);
            }
        }
        // Installed or since-unpublished versions stay visible online.
        for cached in self.cache.cached_versions(artifact) {
            if range.contains(&cached.version) && !found.iter().any(|u| u.version == cached.version)
            {
                found.push(cached);
            }
        }
        found.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(found)
    }

    /// Versions without a snapshot marker, ascending.
    pub fn find_releases(&self, artifact: &Artifact) -> Result<Vec<UniqueArtifact>, ResolveError> {
        Ok(self
            .find_versions(artifact)?
            .into_iter()
            .filter(|unique| unique.version.is_release())
            .collect())
    }

    pub fn find_latest_version(
        &self,
        artifact: &Artifact,
    ) -> Result<Option<UniqueArtifact>, ResolveError> {
        Ok(self.find_versions(artifact)?.pop())
    }

    pub fn find_latest_release(
        &self,
        artifact: &Artifact,
    ) -> Result<Option<UniqueArtifact>, ResolveError> {
        Ok(self.find_releases(artifact)?.pop())
    }

    /// Resolves the primary binary and its flattened runtime dependencies.
    ///
    /// Dependencies are walked breadth-first so the nearest declaration of an artifact wins;
    /// the primary artifact is never listed among its own dependencies.
    pub fn resolve_with_dependencies(
        &self,
        unique: &UniqueArtifact,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        self.soften(self.resolve_graph(unique))
    }

    /// Picks a version for a node coordinate and resolves it. An unversioned coordinate takes
    /// the latest release, or the latest version at all when snapshots are allowed.
    pub fn resolve_coordinate(
        &self,
        coordinate: &Coordinate,
        allow_snapshots: bool,
    ) -> Result<Option<ResolvedArtifact>, ResolveError> {
        let artifact = Artifact::from(coordinate);
        let selected = match &coordinate.version {
            Some(spec) => self.select(&artifact, spec),
            None => {
                let latest = if allow_snapshots {
                    self.find_latest_version(&artifact)
                } else {
                    self.find_latest_release(&artifact)
                };
                latest.and_then(|found| {
                    found.ok_or_else(|| ResolveError::NoMatchingVersion {
                        artifact: artifact.to_string(),
                        range: if allow_snapshots { "latest" } else { "latest release" }
                            .to_string(),
                    })
                })
            }
        };
        match self.soften(selected)? {
            Some(unique) => self.resolve_with_dependencies(&unique),
            None => Ok(None),
        }
    }

    /// Copies a resolved artifact into the local cache; failure is reported, not raised.
    pub fn install(&self, resolved: &ResolvedArtifact) -> bool {
        self.cache.install(resolved)
    }

    fn resolve_graph(&self, unique: &UniqueArtifact) -> Result<ResolvedArtifact, ResolveError> {
        let (path, descriptor) = self.materialize(unique)?;
        let symbols = descriptor
            .as_ref()
            .map(|d| d.symbols.clone())
            .unwrap_or_default();

        let mut seen: HashSet<Artifact> = HashSet::from([unique.artifact.clone()]);
        let mut queue: VecDeque<DependencyDecl> = descriptor
            .iter()
            .flat_map(|d| d.runtime_dependencies().cloned())
            .collect();
        let mut dependencies = Vec::new();

        while let Some(decl) = queue.pop_front() {
            let artifact = decl.artifact();
            if !seen.insert(artifact.clone()) {
                continue;
            }
            let dependency = self.select(&artifact, &decl.version)?;
            let (dependency_path, dependency_descriptor) = self.materialize(&dependency)?;
            if let Some(d) = dependency_descriptor {
                queue.extend(d.runtime_dependencies().cloned());
            }
            debug!(artifact = %unique, dependency = %dependency, "Resolved dependency");
            dependencies.push(ResolvedDependency {
                unique: dependency,
                path: dependency_path,
            });
        }

        info!(
            artifact = %unique,
            dependencies = dependencies.len(),
            offline = self.offline,
            "Resolved artifact"
        );
        Ok(ResolvedArtifact {
            unique: unique.clone(),
            path,
            dependencies,
            symbols,
        })
    }

    /// Highest version satisfying a version spec, preferring an exact pin already in the cache.
    /// Online, a pinned snapshot is looked up in the repositories like any range.
    fn select(&self, artifact: &Artifact, spec: &str) -> Result<UniqueArtifact, ResolveError> {
        let range = VersionRange::parse(spec)?;
        let exact = range
            .as_exact()
            .filter(|version| self.offline || !version.is_snapshot());
        if let Some(version) = exact {
            if let Some(cached) = self
                .cache
                .cached_versions(artifact)
                .into_iter()
                .find(|u| u.version == *version)
            {
                return Ok(cached);
            }
        }
        self.find_in_range(artifact, &range)?
            .pop()
            .ok_or_else(|| ResolveError::NoMatchingVersion {
                artifact: artifact.to_string(),
                range: range.to_string(),
            })
    }

    /// Ensures one artifact is in the cache and returns its binary path and descriptor.
    ///
    /// Online, a cached snapshot is fetched again; the cached copy is kept if the fetch fails.
    fn materialize(&self, unique: &UniqueArtifact) -> Result<Materialized, ResolveError> {
        let cached = self.cache.contains(&unique.artifact, &unique.version);
        if cached && (self.offline || !unique.version.is_snapshot()) {
            return self.cached(unique);
        }
        if self.offline {
            return Err(ResolveError::NotCached(unique.to_string()));
        }
        match self.fetch(unique) {
            Err(err) if cached => {
                warn!(
                    artifact = %unique,
                    error = %err,
                    "Snapshot refresh failed, using cached copy"
                );
                self.cached(unique)
            }
            fetched => fetched,
        }
    }

    fn cached(&self, unique: &UniqueArtifact) -> Result<Materialized, ResolveError> {
        let artifact = &unique.artifact;
        let version = &unique.version;
        let descriptor = self.cache.descriptor(artifact, version)?;
        if descriptor.is_none() && self.offline {
            return Err(ResolveError::NotCached(format!("descriptor of {}", unique)));
        }
        Ok((self.cache.binary_path(artifact, version), descriptor))
    }

    fn fetch(&self, unique: &UniqueArtifact) -> Result<Materialized, ResolveError> {
        let artifact = &unique.artifact;
        let version = &unique.version;
        let repository = self.repository_for(unique)?;
        let entry = repository
            .list_versions(artifact)?
            .into_iter()
            .find(|entry| entry.version == *version)
            .ok_or_else(|| ResolveError::NotFound(unique.to_string()))?;
        let binary = repository.fetch_binary(unique)?;
        if let Some(expected) = entry.digest {
            let actual = blake3::hash(&binary).to_hex().to_string();
            if !actual.eq_ignore_ascii_case(&expected) {
                return Err(ResolveError::DigestMismatch {
                    artifact: unique.to_string(),
                    expected,
                    actual,
                });
            }
        }
        let descriptor_bytes = repository.fetch_descriptor(unique)?;
        let descriptor = descriptor_bytes
            .as_deref()
            .map(|bytes| Descriptor::from_slice(bytes, &unique.to_string()))
            .transpose()?;
        if descriptor.is_none() {
            warn!(artifact = %unique, "Repository publishes no descriptor; treating as leaf");
        }
        let path = self.cache.store(unique, &binary, descriptor_bytes.as_deref())?;
        Ok((path, descriptor))
    }

    fn repository_for(&self, unique: &UniqueArtifact) -> Result<&Arc<dyn Repository>, ResolveError> {
        self.repositories
            .iter()
            .find(|repo| repo.id() == unique.repository)
            .or_else(|| self.repositories.first())
            .ok_or_else(|| ResolveError::Unreachable {
                repository: unique.repository.clone(),
                reason: "no repositories configured".to_string(),
            })
    }

    /// Offline misses are soft: a partially cached graph is reported as "nothing resolved".
    fn soften<T>(&self, result: Result<T, ResolveError>) -> Result<Option<T>, ResolveError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(
                err @ (ResolveError::NotCached(_)
                | ResolveError::NoMatchingVersion { .. }
                | ResolveError::NotFound(_)),
            ) if self.offline => {
                warn!(error = %err, "Offline resolution incomplete");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
