//! Artifact descriptors and repository version indexes (JSON documents).

use crate::artifact::coordinate::Artifact;
use crate::artifact::version::Version;
use crate::error::ResolveError;
use serde::{Deserialize, Serialize};

/// Dependency scope. Only `Compile` and `Runtime` are followed transitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Compile,
    Runtime,
    Provided,
    Test,
}

impl Scope {
    pub fn is_runtime(self) -> bool {
        matches!(self, Scope::Compile | Scope::Runtime)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDecl {
    pub group: String,
    pub name: String,
    /// Exact version or version range.
    pub version: String,
    #[serde(default)]
    pub scope: Scope,
}

impl DependencyDecl {
    pub fn artifact(&self) -> Artifact {
        Artifact::new(self.group.clone(), self.name.clone())
    }
}

/// A symbol (type, service, endpoint) provided by an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolDecl {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Offered to the parent extension's context.
    #[serde(default)]
    pub exported: bool,
}

/// Dependency and symbol metadata published next to an artifact binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<DependencyDecl>,
    #[serde(default)]
    pub symbols: Vec<SymbolDecl>,
}

impl Descriptor {
    /// Descriptor without dependencies or symbols.
    pub fn leaf(artifact: &Artifact, version: &Version) -> Self {
        Self {
            group: artifact.group.clone(),
            name: artifact.name.clone(),
            version: version.to_string(),
            dependencies: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn from_slice(bytes: &[u8], artifact: &str) -> Result<Self, ResolveError> {
        serde_json::from_slice(bytes).map_err(|e| ResolveError::InvalidDescriptor {
            artifact: artifact.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ResolveError> {
        serde_json::to_vec_pretty(self).map_err(|e| ResolveError::InvalidDescriptor {
            artifact: format!("{}:{}:{}", self.group, self.name, self.version),
            reason: e.to_string(),
        })
    }

    pub fn runtime_dependencies(&self) -> impl Iterator<Item = &DependencyDecl> {
        self.dependencies.iter().filter(|d| d.scope.is_runtime())
    }
}

/// One published version in a repository index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub version: Version,
    /// Hex blake3 digest of the binary, when the repository publishes one.
    #[serde(default)]
    pub digest: Option<String>,
}

/// `index.json` of one artifact in a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionIndex {
    #[serde(default)]
    pub versions: Vec<IndexEntry>,
}

impl VersionIndex {
    pub fn from_slice(bytes: &[u8], artifact: &Artifact) -> Result<Self, ResolveError> {
        serde_json::from_slice(bytes).map_err(|e| ResolveError::InvalidDescriptor {
            artifact: artifact.to_string(),
            reason: format!("invalid version index: {}", e),
        })
    }
}
