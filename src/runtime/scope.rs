//! Per-run scope registry, threaded explicitly through context creation.

use crate::types::ExtensionId;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEvent {
    pub topic: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ContextEvent {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub source: ExtensionId,
    pub at: DateTime<Utc>,
    pub event: ContextEvent,
}

/// Which contexts are live in one orchestration run, and what they published.
///
/// One value per run; two registries never share state, so runs stay independent.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: RwLock<BTreeMap<ExtensionId, String>>,
    events: Mutex<Vec<PublishedEvent>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ExtensionId, scope: impl Into<String>) {
        self.scopes.write().insert(id, scope.into());
    }

    pub fn unregister(&self, id: &ExtensionId) -> bool {
        self.scopes.write().remove(id).is_some()
    }

    pub fn is_registered(&self, id: &ExtensionId) -> bool {
        self.scopes.read().contains_key(id)
    }

    pub fn live(&self) -> Vec<ExtensionId> {
        self.scopes.read().keys().copied().collect()
    }

    pub fn publish(&self, source: ExtensionId, event: ContextEvent) {
        self.events.lock().push(PublishedEvent {
            source,
            at: Utc::now(),
            event,
        });
    }

    pub fn events(&self) -> Vec<PublishedEvent> {
        self.events.lock().clone()
    }
}
