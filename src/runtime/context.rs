//! Built-in symbol-table contexts.

use crate::boundary::{Boundary, ContextLease, Symbol};
use crate::error::ContextError;
use crate::runtime::scope::{ContextEvent, ScopeRegistry};
use crate::runtime::{lookup_in_ancestors, partition, RuntimeContext, RuntimeContextFactory, Visibility};
use crate::types::ExtensionId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Root of every context hierarchy, supplied by the host platform.
#[derive(Debug)]
pub struct BootstrapContext {
    shared: Vec<Symbol>,
    deported: Vec<Symbol>,
    scopes: Arc<ScopeRegistry>,
}

impl BootstrapContext {
    /// The bootstrap context always has the nil id.
    pub const ID: ExtensionId = ExtensionId(Uuid::nil());

    pub fn new(symbols: Vec<Symbol>, scopes: Arc<ScopeRegistry>) -> Self {
        let (shared, deported) = partition(&symbols);
        Self {
            shared,
            deported,
            scopes,
        }
    }

    pub fn empty(scopes: Arc<ScopeRegistry>) -> Self {
        Self::new(Vec::new(), scopes)
    }
}

impl RuntimeContext for BootstrapContext {
    fn id(&self) -> ExtensionId {
        Self::ID
    }

    fn parent(&self) -> Option<Arc<dyn RuntimeContext>> {
        None
    }

    fn boundary(&self) -> Option<&Arc<Boundary>> {
        None
    }

    fn shared_symbols(&self) -> Vec<Symbol> {
        self.shared.clone()
    }

    fn deported_symbols(&self) -> Vec<Symbol> {
        self.deported.clone()
    }

    fn get_bean(&self, name: &str) -> Option<Symbol> {
        self.shared.iter().find(|s| s.name == name).cloned()
    }

    fn publish(&self, event: ContextEvent) {
        self.scopes.publish(Self::ID, event);
    }
}

/// Context that resolves beans from a symbol table.
///
/// Own local symbols and child exports are shared with descendants; symbols inherited from the
/// parent's deportation stay private to this context.
#[derive(Debug)]
pub struct SymbolContext {
    id: ExtensionId,
    parent: Arc<dyn RuntimeContext>,
    lease: ContextLease,
    shared: BTreeMap<String, Symbol>,
    inherited: BTreeMap<String, Symbol>,
    deported: Vec<Symbol>,
    scopes: Arc<ScopeRegistry>,
}

impl RuntimeContext for SymbolContext {
    fn id(&self) -> ExtensionId {
        self.id
    }

    fn parent(&self) -> Option<Arc<dyn RuntimeContext>> {
        Some(self.parent.clone())
    }

    fn boundary(&self) -> Option<&Arc<Boundary>> {
        Some(self.lease.boundary())
    }

    fn shared_symbols(&self) -> Vec<Symbol> {
        self.shared.values().cloned().collect()
    }

    fn deported_symbols(&self) -> Vec<Symbol> {
        self.deported.clone()
    }

    fn get_bean(&self, name: &str) -> Option<Symbol> {
        self.shared
            .get(name)
            .or_else(|| self.inherited.get(name))
            .cloned()
            .or_else(|| lookup_in_ancestors(self, name))
    }

    fn publish(&self, event: ContextEvent) {
        self.scopes.publish(self.id, event);
    }

    fn stop(&self) {
        self.scopes.unregister(&self.id);
        debug!(extension_id = %self.id, "Stopped context");
    }
}

#[derive(Debug, Default)]
pub struct SymbolContextFactory;

impl SymbolContextFactory {
    pub fn new() -> Self {
        Self
    }
}

impl RuntimeContextFactory for SymbolContextFactory {
    fn create(
        &self,
        id: ExtensionId,
        parent: Arc<dyn RuntimeContext>,
        boundary: Arc<Boundary>,
        visibility: Visibility,
        scopes: &Arc<ScopeRegistry>,
    ) -> Result<Arc<dyn RuntimeContext>, ContextError> {
        if boundary.id() != id {
            return Err(ContextError::CreationFailed {
                id,
                reason: format!("boundary belongs to extension {}", boundary.id()),
            });
        }
        if let (Some(expected), Some(actual)) = (boundary.parent(), parent.boundary()) {
            if expected.id() != actual.id() {
                return Err(ContextError::CreationFailed {
                    id,
                    reason: format!(
                        "parent context {} does not own parent boundary {}",
                        actual.id(),
                        expected.id()
                    ),
                });
            }
        }
        if parent.id() != BootstrapContext::ID && !scopes.is_registered(&parent.id()) {
            return Err(ContextError::ParentNotRunning(id));
        }
        if scopes.is_registered(&id) {
            return Err(ContextError::AlreadyRunning(id));
        }

        let (local, deported) = partition(boundary.symbols());
        let shared: BTreeMap<String, Symbol> = local
            .into_iter()
            .chain(visibility.exported)
            .map(|s| (s.name.clone(), s))
            .collect();
        let inherited: BTreeMap<String, Symbol> = visibility
            .inherited
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        scopes.register(id, boundary.artifact().to_string());
        debug!(
            extension_id = %id,
            shared = shared.len(),
            inherited = inherited.len(),
            deported = deported.len(),
            "Created context"
        );
        Ok(Arc::new(SymbolContext {
            id,
            parent,
            lease: boundary.lease(),
            shared,
            inherited,
            deported,
            scopes: scopes.clone(),
        }))
    }
}
