//! Artifact repositories.
//!
//! Repository layout, shared with the local cache:
//!
//! ```text
//! <root>/<group with dots as slashes>/<name>/index.json
//! <root>/<group with dots as slashes>/<name>/<version>/<name>-<version>.bin
//! <root>/<group with dots as slashes>/<name>/<version>/<name>-<version>.json
//! ```

use crate::artifact::coordinate::{Artifact, UniqueArtifact};
use crate::artifact::descriptor::{Descriptor, IndexEntry, VersionIndex};
use crate::artifact::version::Version;
use crate::error::ResolveError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const INDEX_FILE: &str = "index.json";

/// Directory of an artifact, relative to a repository or cache root.
pub fn artifact_dir(artifact: &Artifact) -> PathBuf {
    let mut dir = PathBuf::new();
    for segment in artifact.group.split('.') {
        dir.push(segment);
    }
    dir.push(&artifact.name);
    dir
}

pub fn version_dir(artifact: &Artifact, version: &Version) -> PathBuf {
    artifact_dir(artifact).join(version.as_str())
}

pub fn binary_file_name(artifact: &Artifact, version: &Version) -> String {
    format!("{}-{}.bin", artifact.name, version)
}

pub fn descriptor_file_name(artifact: &Artifact, version: &Version) -> String {
    format!("{}-{}.json", artifact.name, version)
}

/// A source of published artifacts.
pub trait Repository: Send + Sync {
    fn id(&self) -> &str;

    /// Published versions, in index order.
    fn list_versions(&self, artifact: &Artifact) -> Result<Vec<IndexEntry>, ResolveError>;

    fn fetch_binary(&self, unique: &UniqueArtifact) -> Result<Vec<u8>, ResolveError>;

    /// `Ok(None)` when the repository publishes no descriptor for this version.
    fn fetch_descriptor(&self, unique: &UniqueArtifact) -> Result<Option<Vec<u8>>, ResolveError>;
}

/// Repository backed by a directory (a mounted share, a mirror, a test fixture).
pub struct DirectoryRepository {
    id: String,
    root: PathBuf,
}

impl DirectoryRepository {
    pub fn new(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Publishes a binary (and optionally its descriptor) and records it in the index with its
    /// blake3 digest.
    pub fn publish(
        &self,
        artifact: &Artifact,
        version: &Version,
        binary: &[u8],
        descriptor: Option<&Descriptor>,
    ) -> Result<(), ResolveError> {
        let dir = self.root.join(version_dir(artifact, version));
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(binary_file_name(artifact, version)), binary)?;
        if let Some(descriptor) = descriptor {
            std::fs::write(
                dir.join(descriptor_file_name(artifact, version)),
                descriptor.to_vec()?,
            )?;
        }

        let index_path = self.root.join(artifact_dir(artifact)).join(INDEX_FILE);
        let mut index = if index_path.exists() {
            VersionIndex::from_slice(&std::fs::read(&index_path)?, artifact)?
        } else {
            VersionIndex::default()
        };
        index.versions.retain(|entry| entry.version != *version);
        index.versions.push(IndexEntry {
            version: version.clone(),
            digest: Some(blake3::hash(binary).to_hex().to_string()),
        });
        let encoded = serde_json::to_vec_pretty(&index).map_err(|e| {
            ResolveError::InvalidDescriptor {
                artifact: artifact.to_string(),
                reason: e.to_string(),
            }
        })?;
        std::fs::write(index_path, encoded)?;
        Ok(())
    }

    fn unreachable(&self, reason: impl Into<String>) -> ResolveError {
        ResolveError::Unreachable {
            repository: self.id.clone(),
            reason: reason.into(),
        }
    }
}

impl Repository for DirectoryRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn list_versions(&self, artifact: &Artifact) -> Result<Vec<IndexEntry>, ResolveError> {
        if !self.root.is_dir() {
            return Err(self.unreachable(format!("{} is not a directory", self.root.display())));
        }
        let index_path = self.root.join(artifact_dir(artifact)).join(INDEX_FILE);
        if !index_path.exists() {
            debug!(repository = %self.id, artifact = %artifact, "No index in repository");
            return Ok(Vec::new());
        }
        Ok(VersionIndex::from_slice(&std::fs::read(&index_path)?, artifact)?.versions)
    }

    fn fetch_binary(&self, unique: &UniqueArtifact) -> Result<Vec<u8>, ResolveError> {
        let path = self
            .root
            .join(version_dir(&unique.artifact, &unique.version))
            .join(binary_file_name(&unique.artifact, &unique.version));
        if !path.exists() {
            return Err(ResolveError::NotFound(unique.to_string()));
        }
        Ok(std::fs::read(path)?)
    }

    fn fetch_descriptor(&self, unique: &UniqueArtifact) -> Result<Option<Vec<u8>>, ResolveError> {
        let path = self
            .root
            .join(version_dir(&unique.artifact, &unique.version))
            .join(descriptor_file_name(&unique.artifact, &unique.version));
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }
}

/// Repository served over HTTP with the same layout as [`DirectoryRepository`].
pub struct HttpRepository {
    id: String,
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpRepository {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ResolveError> {
        let id = id.into();
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ResolveError::Unreachable {
                repository: id.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            id,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, relative: &Path, file: &str) -> String {
        let mut url = self.base_url.clone();
        for component in relative.iter() {
            url.push('/');
            url.push_str(&component.to_string_lossy());
        }
        url.push('/');
        url.push_str(file);
        url
    }

    /// `Ok(None)` on 404, bytes on success.
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>, ResolveError> {
        let unreachable = |reason: String| ResolveError::Unreachable {
            repository: self.id.clone(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| unreachable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(unreachable(format!("GET {} returned {}", url, response.status())));
        }
        let bytes = response.bytes().map_err(|e| unreachable(e.to_string()))?;
        Ok(Some(bytes.to_vec()))
    }
}

impl Repository for HttpRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn list_versions(&self, artifact: &Artifact) -> Result<Vec<IndexEntry>, ResolveError> {
        let url = self.url(&artifact_dir(artifact), INDEX_FILE);
        match self.get(&url)? {
            Some(bytes) => Ok(VersionIndex::from_slice(&bytes, artifact)?.versions),
            None => Ok(Vec::new()),
        }
    }

    fn fetch_binary(&self, unique: &UniqueArtifact) -> Result<Vec<u8>, ResolveError> {
        let url = self.url(
            &version_dir(&unique.artifact, &unique.version),
            &binary_file_name(&unique.artifact, &unique.version),
        );
        self.get(&url)?
            .ok_or_else(|| ResolveError::NotFound(unique.to_string()))
    }

    fn fetch_descriptor(&self, unique: &UniqueArtifact) -> Result<Option<Vec<u8>>, ResolveError> {
        let url = self.url(
            &version_dir(&unique.artifact, &unique.version),
            &descriptor_file_name(&unique.artifact, &unique.version),
        );
        self.get(&url)
    }
}
