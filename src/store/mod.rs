//! Extension State Store
//!
//! Persists the last known-good extension tree of each application. A tree is stored as one
//! flat record per extension (children referenced by id) plus one application entry naming the
//! root, and is reassembled on load.

pub mod persistence;

pub use persistence::SledStateStore;

use crate::error::StorageError;
use crate::types::{ApplicationId, Coordinate, ExtensionId, ExtensionNode, LoadState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// ExtensionRecord: one persisted extension, children by id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub id: ExtensionId,
    pub parent: Option<ExtensionId>,
    pub coordinate: Coordinate,
    pub load_state: LoadState,
    pub messages: Vec<String>,
    pub sealed: bool,
    pub children: Vec<ExtensionId>,
}

/// Application entry: which record is the root, and when the tree was saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub root: ExtensionId,
    pub extension_count: usize,
    pub saved_at: DateTime<Utc>,
}

/// State store interface. The application id is the id of the tree's root extension.
pub trait StateStore: Send + Sync {
    fn load(&self, application_id: &ApplicationId) -> Result<Option<ExtensionNode>, StorageError>;

    fn save(&self, root: &ExtensionNode) -> Result<(), StorageError>;

    /// Removes an application's tree. Returns whether anything was stored.
    fn remove(&self, application_id: &ApplicationId) -> Result<bool, StorageError>;

    fn applications(&self) -> Result<Vec<ApplicationRecord>, StorageError>;
}

impl ExtensionRecord {
    fn from_node(node: &ExtensionNode) -> Self {
        Self {
            id: node.id,
            parent: node.parent_id,
            coordinate: node.coordinate.clone(),
            load_state: node.load_state,
            messages: node.messages.clone(),
            sealed: node.sealed,
            children: node.children.iter().map(|child| child.id).collect(),
        }
    }

    /// Flattens a tree into records, parents before children.
    pub fn flatten(root: &ExtensionNode) -> Vec<ExtensionRecord> {
        root.iter().map(Self::from_node).collect()
    }

    /// Rebuilds the tree rooted at `root` from a record lookup.
    pub fn assemble(
        root: &ExtensionId,
        records: &HashMap<ExtensionId, ExtensionRecord>,
    ) -> Result<ExtensionNode, StorageError> {
        let record = records
            .get(root)
            .ok_or(StorageError::ExtensionNotFound(*root))?;
        let mut children = Vec::with_capacity(record.children.len());
        for child_id in &record.children {
            let child = Self::assemble(child_id, records)?;
            if child.parent_id != Some(record.id) {
                return Err(StorageError::CorruptRecord(format!(
                    "extension {} is listed under {} but names parent {:?}",
                    child.id, record.id, child.parent_id
                )));
            }
            children.push(child);
        }
        Ok(ExtensionNode {
            id: record.id,
            parent_id: record.parent,
            coordinate: record.coordinate.clone(),
            load_state: record.load_state,
            messages: record.messages.clone(),
            sealed: record.sealed,
            children,
        })
    }
}
