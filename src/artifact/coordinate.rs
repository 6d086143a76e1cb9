//! Artifact identities: logical artifacts, version-bound artifacts and resolution results.

use crate::artifact::descriptor::SymbolDecl;
use crate::artifact::version::Version;
use crate::types::Coordinate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Repository id recorded for artifacts whose origin is unknown.
pub const LOCAL_ORIGIN: &str = "local";

/// A logical artifact without a version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Artifact {
    pub group: String,
    pub name: String,
}

impl Artifact {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl From<&Coordinate> for Artifact {
    fn from(coordinate: &Coordinate) -> Self {
        Artifact::new(coordinate.group.clone(), coordinate.name.clone())
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// An artifact bound to one concrete version and the repository it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueArtifact {
    pub artifact: Artifact,
    pub version: Version,
    pub repository: String,
}

impl UniqueArtifact {
    pub fn new(artifact: Artifact, version: Version, repository: impl Into<String>) -> Self {
        Self {
            artifact,
            version,
            repository: repository.into(),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(
            self.artifact.group.clone(),
            self.artifact.name.clone(),
            Some(self.version.as_str()),
        )
    }
}

impl fmt::Display for UniqueArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.artifact, self.version, self.repository)
    }
}

/// A transitive dependency materialised in the local cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub unique: UniqueArtifact,
    pub path: PathBuf,
}

/// A primary artifact materialised in the local cache, with its flattened runtime dependencies.
/// `dependencies` never contains the primary artifact itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub unique: UniqueArtifact,
    pub path: PathBuf,
    pub dependencies: Vec<ResolvedDependency>,
    pub symbols: Vec<SymbolDecl>,
}

impl ResolvedArtifact {
    /// Primary binary first, then dependencies in resolution order.
    pub fn binaries(&self) -> Vec<PathBuf> {
        std::iter::once(self.path.clone())
            .chain(self.dependencies.iter().map(|d| d.path.clone()))
            .collect()
    }
}
