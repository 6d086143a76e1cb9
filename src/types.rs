//! Core tree types shared by the store, the registry, the reconciler and the orchestrator.

use crate::error::ReconcileError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of an extension, kept across reconciliations and restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionId(pub Uuid);

impl ExtensionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ExtensionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ExtensionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Application identifiers share the extension id space: the root extension is the application.
pub type ApplicationId = ExtensionId;

/// Artifact coordinate of an extension. A missing version means "pick one at resolution time".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl Coordinate {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.map(str::to_string),
        }
    }

    /// `group:name` without the version.
    pub fn key(&self) -> String {
        format!("{}:{}", self.group, self.name)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}:{}:{}", self.group, self.name, version),
            None => write!(f, "{}:{}", self.group, self.name),
        }
    }
}

impl FromStr for Coordinate {
    type Err = String;

    /// Parses `group:name` or `group:name:version`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [group, name] if !group.is_empty() && !name.is_empty() => {
                Ok(Coordinate::new(*group, *name, None))
            }
            [group, name, version]
                if !group.is_empty() && !name.is_empty() && !version.is_empty() =>
            {
                Ok(Coordinate::new(*group, *name, Some(version)))
            }
            _ => Err(format!(
                "Invalid coordinate '{}' (expected group:name[:version])",
                s
            )),
        }
    }
}

/// Load state of a node. `Disabled` and `Deleted` are only ever set by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Unloaded,
    Loaded,
    Running,
    Error,
    Disabled,
    Deleted,
}

impl LoadState {
    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Unloaded => "unloaded",
            LoadState::Loaded => "loaded",
            LoadState::Running => "running",
            LoadState::Error => "error",
            LoadState::Disabled => "disabled",
            LoadState::Deleted => "deleted",
        }
    }

    /// Skip states are never entered or left by the orchestrator.
    pub fn is_skipped(self) -> bool {
        matches!(self, LoadState::Disabled | LoadState::Deleted)
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted extension tree node: the last known-good local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionNode {
    pub id: ExtensionId,
    pub parent_id: Option<ExtensionId>,
    pub coordinate: Coordinate,
    pub load_state: LoadState,
    #[serde(default)]
    pub messages: Vec<String>,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub children: Vec<ExtensionNode>,
}

impl ExtensionNode {
    pub fn new(id: ExtensionId, parent_id: Option<ExtensionId>, coordinate: Coordinate) -> Self {
        Self {
            id,
            parent_id,
            coordinate,
            load_state: LoadState::Unloaded,
            messages: Vec::new(),
            sealed: false,
            children: Vec::new(),
        }
    }

    /// Appends a child, fixing up its parent link.
    pub fn with_child(mut self, mut child: ExtensionNode) -> Self {
        child.parent_id = Some(self.id);
        self.children.push(child);
        self
    }

    pub fn find(&self, id: &ExtensionId) -> Option<&ExtensionNode> {
        if self.id == *id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn find_mut(&mut self, id: &ExtensionId) -> Option<&mut ExtensionNode> {
        if self.id == *id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// Pre-order traversal, parent before children.
    pub fn iter(&self) -> impl Iterator<Item = &ExtensionNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Checks tree-wide id uniqueness and parent links. `self` is treated as the root.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if let Some(parent) = self.parent_id {
            return Err(ReconcileError::InvalidTree(format!(
                "root {} has parent {}",
                self.id, parent
            )));
        }
        let mut seen = HashSet::new();
        validate_links(self, &mut seen)
    }
}

fn validate_links(
    node: &ExtensionNode,
    seen: &mut HashSet<ExtensionId>,
) -> Result<(), ReconcileError> {
    if !seen.insert(node.id) {
        return Err(ReconcileError::InvalidTree(format!(
            "duplicate extension id {}",
            node.id
        )));
    }
    for child in &node.children {
        if child.parent_id != Some(node.id) {
            return Err(ReconcileError::InvalidTree(format!(
                "extension {} names parent {:?} but sits under {}",
                child.id, child.parent_id, node.id
            )));
        }
        validate_links(child, seen)?;
    }
    Ok(())
}

/// Desired state of one extension as published by the registry. Carries no load state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryNode {
    pub id: ExtensionId,
    pub coordinate: Coordinate,
    #[serde(default)]
    pub sealed: bool,
    #[serde(default)]
    pub children: Vec<RegistryNode>,
}

impl RegistryNode {
    pub fn new(id: ExtensionId, coordinate: Coordinate) -> Self {
        Self {
            id,
            coordinate,
            sealed: false,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: RegistryNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn find(&self, id: &ExtensionId) -> Option<&RegistryNode> {
        if self.id == *id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Registry trees have no parent links to check, only id uniqueness.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        let mut seen = HashSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if !seen.insert(node.id) {
                return Err(ReconcileError::InvalidTree(format!(
                    "duplicate extension id {} in registry tree",
                    node.id
                )));
            }
            stack.extend(node.children.iter());
        }
        Ok(())
    }
}
