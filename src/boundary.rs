//! Isolated loading boundaries.
//!
//! A [`Boundary`] is the visibility scope of one extension's binaries: the resolved binary paths,
//! the parent boundary they may see through, and the symbols the artifact declares. Boundaries
//! are created and closed only by the [`BoundaryManager`]; everyone else holds `Arc` handles.

pub mod manager;

pub use manager::BoundaryManager;

use crate::artifact::{ResolvedArtifact, SymbolDecl, UniqueArtifact};
use crate::types::ExtensionId;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A named symbol ("class") provided by a boundary, with its declared categories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    pub name: String,
    pub categories: BTreeSet<String>,
    pub exported: bool,
}

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            categories: BTreeSet::new(),
            exported: false,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.insert(category.into());
        self
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains(category)
    }
}

impl From<&SymbolDecl> for Symbol {
    fn from(decl: &SymbolDecl) -> Self {
        Self {
            name: decl.name.clone(),
            categories: decl.categories.iter().cloned().collect(),
            exported: decl.exported,
        }
    }
}

#[derive(Debug)]
pub struct Boundary {
    id: ExtensionId,
    artifact: UniqueArtifact,
    binaries: Vec<PathBuf>,
    parent: Option<Arc<Boundary>>,
    symbols: Vec<Symbol>,
    live_contexts: AtomicUsize,
}

impl Boundary {
    pub(crate) fn new(
        id: ExtensionId,
        resolved: &ResolvedArtifact,
        parent: Option<Arc<Boundary>>,
    ) -> Self {
        Self {
            id,
            artifact: resolved.unique.clone(),
            binaries: resolved.binaries(),
            parent,
            symbols: resolved.symbols.iter().map(Symbol::from).collect(),
            live_contexts: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> ExtensionId {
        self.id
    }

    pub fn artifact(&self) -> &UniqueArtifact {
        &self.artifact
    }

    /// Primary binary first, then its dependencies.
    pub fn binaries(&self) -> &[PathBuf] {
        &self.binaries
    }

    pub fn parent(&self) -> Option<&Arc<Boundary>> {
        self.parent.as_ref()
    }

    /// Symbols declared by this boundary's own artifact.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn exported_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.exported)
    }

    pub fn has_live_context(&self) -> bool {
        self.live_contexts.load(Ordering::SeqCst) > 0
    }

    /// Marks a runtime context as living on this boundary until the lease is dropped.
    pub fn lease(self: &Arc<Self>) -> ContextLease {
        self.live_contexts.fetch_add(1, Ordering::SeqCst);
        ContextLease {
            boundary: Arc::clone(self),
        }
    }
}

/// Held by a runtime context for as long as it lives. While any lease is outstanding the
/// boundary cannot be closed.
#[derive(Debug)]
pub struct ContextLease {
    boundary: Arc<Boundary>,
}

impl ContextLease {
    pub fn boundary(&self) -> &Arc<Boundary> {
        &self.boundary
    }
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        self.boundary.live_contexts.fetch_sub(1, Ordering::SeqCst);
    }
}
