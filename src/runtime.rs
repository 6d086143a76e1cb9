//! Runtime contexts.
//!
//! The orchestrator only sees the narrow [`RuntimeContext`] interface and creates contexts through
//! a [`RuntimeContextFactory`]; the container behind them is pluggable. [`SymbolContextFactory`]
//! is the built-in factory, realising a context as the set of symbols it can resolve.
//!
//! Visibility rules:
//! * a context shares its local symbols and the exports of its children with its descendants;
//! * symbols in a deportable category are kept out of the declaring context and offered to its
//!   sealed children instead;
//! * a sealed child sees the deported symbols of its parent but never passes them further down.

pub mod context;
pub mod scope;

pub use context::{BootstrapContext, SymbolContext, SymbolContextFactory};
pub use scope::{ContextEvent, PublishedEvent, ScopeRegistry};

use crate::boundary::{Boundary, Symbol};
use crate::error::ContextError;
use crate::types::ExtensionId;
use std::fmt;
use std::sync::Arc;

/// Categories whose symbols are deported to sealed children instead of staying local.
pub const DEPORTABLE_CATEGORIES: [&str; 3] = ["http-endpoint", "web-controller", "scheduled-task"];

pub fn is_deportable(symbol: &Symbol) -> bool {
    DEPORTABLE_CATEGORIES
        .iter()
        .any(|category| symbol.has_category(category))
}

/// Splits symbols into (local, deportable).
pub fn partition(symbols: &[Symbol]) -> (Vec<Symbol>, Vec<Symbol>) {
    symbols.iter().cloned().partition(|s| !is_deportable(s))
}

/// Symbols handed to a context at creation, on top of its own boundary's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visibility {
    /// Exported by the node's children.
    pub exported: Vec<Symbol>,
    /// Deported by the parent; only set for sealed nodes.
    pub inherited: Vec<Symbol>,
}

pub trait RuntimeContext: Send + Sync + fmt::Debug {
    fn id(&self) -> ExtensionId;

    fn parent(&self) -> Option<Arc<dyn RuntimeContext>>;

    /// `None` for the bootstrap context.
    fn boundary(&self) -> Option<&Arc<Boundary>>;

    /// Symbols this context makes visible to its descendants.
    fn shared_symbols(&self) -> Vec<Symbol>;

    /// Symbols this context pushes down to its sealed children.
    fn deported_symbols(&self) -> Vec<Symbol>;

    fn get_bean(&self, name: &str) -> Option<Symbol>;

    fn publish(&self, event: ContextEvent);

    /// Shutdown hook, called before the context is dropped.
    fn stop(&self) {}
}

/// Looks `name` up in the shared symbols of `context`'s ancestors, nearest first.
pub fn lookup_in_ancestors(context: &dyn RuntimeContext, name: &str) -> Option<Symbol> {
    let mut current = context.parent();
    while let Some(ancestor) = current {
        if let Some(symbol) = ancestor
            .shared_symbols()
            .into_iter()
            .find(|s| s.name == name)
        {
            return Some(symbol);
        }
        current = ancestor.parent();
    }
    None
}

pub trait RuntimeContextFactory: Send + Sync {
    fn create(
        &self,
        id: ExtensionId,
        parent: Arc<dyn RuntimeContext>,
        boundary: Arc<Boundary>,
        visibility: Visibility,
        scopes: &Arc<ScopeRegistry>,
    ) -> Result<Arc<dyn RuntimeContext>, ContextError>;
}
