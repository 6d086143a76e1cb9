//! Local artifact cache.
//!
//! Same layout as a repository, plus an `<name>-<version>.origin` marker naming the repository
//! an artifact was fetched from. Writes are serialised through one lock: the cache is shared by
//! every worker of an orchestration run.

use crate::artifact::coordinate::{Artifact, ResolvedArtifact, UniqueArtifact, LOCAL_ORIGIN};
use crate::artifact::descriptor::Descriptor;
use crate::artifact::repository::{
    artifact_dir, binary_file_name, descriptor_file_name, version_dir,
};
use crate::artifact::version::Version;
use crate::error::ResolveError;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct LocalCache {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn binary_path(&self, artifact: &Artifact, version: &Version) -> PathBuf {
        self.root
            .join(version_dir(artifact, version))
            .join(binary_file_name(artifact, version))
    }

    pub fn descriptor_path(&self, artifact: &Artifact, version: &Version) -> PathBuf {
        self.root
            .join(version_dir(artifact, version))
            .join(descriptor_file_name(artifact, version))
    }

    fn origin_path(&self, artifact: &Artifact, version: &Version) -> PathBuf {
        self.root
            .join(version_dir(artifact, version))
            .join(format!("{}-{}.origin", artifact.name, version))
    }

    pub fn contains(&self, artifact: &Artifact, version: &Version) -> bool {
        self.binary_path(artifact, version).is_file()
    }

    /// Cached descriptor; `Ok(None)` when it was never cached.
    pub fn descriptor(
        &self,
        artifact: &Artifact,
        version: &Version,
    ) -> Result<Option<Descriptor>, ResolveError> {
        let path = self.descriptor_path(artifact, version);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        Descriptor::from_slice(&bytes, &format!("{}:{}", artifact, version)).map(Some)
    }

    /// Versions whose binary is present, with the repository each came from, ascending.
    pub fn cached_versions(&self, artifact: &Artifact) -> Vec<UniqueArtifact> {
        let dir = self.root.join(artifact_dir(artifact));
        if !dir.is_dir() {
            return Vec::new();
        }
        let mut found: Vec<UniqueArtifact> = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| {
                let version = Version::parse(&entry.file_name().to_string_lossy());
                self.contains(artifact, &version).then(|| {
                    let origin = std::fs::read_to_string(self.origin_path(artifact, &version))
                        .map(|s| s.trim().to_string())
                        .unwrap_or_else(|_| LOCAL_ORIGIN.to_string());
                    UniqueArtifact::new(artifact.clone(), version, origin)
                })
            })
            .collect();
        found.sort_by(|a, b| a.version.cmp(&b.version));
        found
    }

    /// Writes a fetched artifact into the cache.
    pub fn store(
        &self,
        unique: &UniqueArtifact,
        binary: &[u8],
        descriptor: Option<&[u8]>,
    ) -> Result<PathBuf, ResolveError> {
        let _guard = self.write_lock.lock();
        let dir = self.root.join(version_dir(&unique.artifact, &unique.version));
        std::fs::create_dir_all(&dir)?;
        if let Some(descriptor) = descriptor {
            std::fs::write(
                self.descriptor_path(&unique.artifact, &unique.version),
                descriptor,
            )?;
        }
        std::fs::write(
            self.origin_path(&unique.artifact, &unique.version),
            &unique.repository,
        )?;
        // Binary last: its presence is what marks the version as cached.
        let path = self.binary_path(&unique.artifact, &unique.version);
        std::fs::write(&path, binary)?;
        debug!(artifact = %unique, path = %path.display(), "Cached artifact");
        Ok(path)
    }

    /// Copies a resolved artifact (and its dependencies) into this cache. Failures are logged and
    /// reported as `false`.
    pub fn install(&self, resolved: &ResolvedArtifact) -> bool {
        let primary = std::iter::once((&resolved.unique, &resolved.path));
        let dependencies = resolved.dependencies.iter().map(|d| (&d.unique, &d.path));
        for (unique, source) in primary.chain(dependencies) {
            if let Err(err) = self.install_one(unique, source) {
                warn!(artifact = %unique, error = %err, "Failed to install artifact");
                return false;
            }
        }
        true
    }

    fn install_one(&self, unique: &UniqueArtifact, source: &Path) -> Result<(), ResolveError> {
        let target = self.binary_path(&unique.artifact, &unique.version);
        if target == source {
            return Ok(());
        }
        let binary = std::fs::read(source)?;
        let descriptor_source = source.with_extension("json");
        let descriptor = if descriptor_source.is_file() {
            Some(std::fs::read(descriptor_source)?)
        } else {
            None
        };
        self.store(unique, &binary, descriptor.as_deref())?;
        Ok(())
    }
}
