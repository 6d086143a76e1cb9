//! Artifact Resolution
//!
//! Resolves logical artifact coordinates to concrete, locally cached binaries plus their
//! transitive runtime dependencies, from one or more repositories. Supports version-range
//! queries, release/snapshot selection and an offline mode that only sees the local cache.

pub mod cache;
pub mod coordinate;
pub mod descriptor;
pub mod repository;
pub mod resolver;
pub mod version;

pub use cache::LocalCache;
pub use coordinate::{Artifact, ResolvedArtifact, ResolvedDependency, UniqueArtifact};
pub use descriptor::{DependencyDecl, Descriptor, IndexEntry, Scope, SymbolDecl, VersionIndex};
pub use repository::{DirectoryRepository, HttpRepository, Repository};
pub use resolver::ArtifactResolver;
pub use version::{Version, VersionRange};
