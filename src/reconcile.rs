//! State Reconciler
//!
//! Merges the persisted tree (last known-good local state) with the registry's expected tree under
//! an [`UpdatePolicy`]. Children are matched by id. Nodes present only in the saved tree are
//! carried through; removing an extension is an explicit operation, never a side effect of
//! reconciliation.

use crate::error::ReconcileError;
use crate::types::{Coordinate, ExtensionId, ExtensionNode, LoadState, RegistryNode};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How saved and expected state are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePolicy {
    /// Reuse the saved tree; only binaries missing locally are fetched.
    LastSuccessful,
    /// Adopt changed coordinates from the registry, resolving them remotely.
    UpdateOnly,
    /// Rebuild every node the registry knows from scratch.
    FullUpdate,
    /// As `UpdateOnly`, resolving from the local cache only.
    LocalUpdateOnly,
    /// As `FullUpdate`, resolving from the local cache only.
    LocalFullUpdate,
}

impl UpdatePolicy {
    pub const ALL: [UpdatePolicy; 5] = [
        UpdatePolicy::LastSuccessful,
        UpdatePolicy::UpdateOnly,
        UpdatePolicy::FullUpdate,
        UpdatePolicy::LocalUpdateOnly,
        UpdatePolicy::LocalFullUpdate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdatePolicy::LastSuccessful => "last-successful",
            UpdatePolicy::UpdateOnly => "update-only",
            UpdatePolicy::FullUpdate => "full-update",
            UpdatePolicy::LocalUpdateOnly => "local-update-only",
            UpdatePolicy::LocalFullUpdate => "local-full-update",
        }
    }

    /// Local policies never contact a remote repository.
    pub fn is_local(self) -> bool {
        matches!(
            self,
            UpdatePolicy::LocalUpdateOnly | UpdatePolicy::LocalFullUpdate
        )
    }

    pub fn is_full(self) -> bool {
        matches!(
            self,
            UpdatePolicy::FullUpdate | UpdatePolicy::LocalFullUpdate
        )
    }

    /// Strategy for a node whose coordinate comes from the registry.
    fn update_strategy(self) -> ProvisioningStrategy {
        if self.is_local() {
            ProvisioningStrategy::UpdateLocalOnly
        } else {
            ProvisioningStrategy::UpdateFromRemote
        }
    }

    /// Strategy for a saved node whose coordinate is kept as is.
    fn carried_strategy(self) -> ProvisioningStrategy {
        if self.is_local() {
            ProvisioningStrategy::UpdateLocalOnly
        } else {
            ProvisioningStrategy::CreateOnly
        }
    }

    /// Strategy for a node the saved tree has never seen.
    fn new_node_strategy(self) -> ProvisioningStrategy {
        match self {
            UpdatePolicy::LastSuccessful | UpdatePolicy::UpdateOnly => {
                ProvisioningStrategy::CreateOnly
            }
            UpdatePolicy::FullUpdate => ProvisioningStrategy::UpdateFromRemote,
            UpdatePolicy::LocalUpdateOnly | UpdatePolicy::LocalFullUpdate => {
                ProvisioningStrategy::UpdateLocalOnly
            }
        }
    }
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        UpdatePolicy::LastSuccessful
    }
}

impl fmt::Display for UpdatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdatePolicy {
    type Err = ReconcileError;

    /// Accepts kebab-case, snake_case and CamelCase spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "lastsuccessful" => Ok(UpdatePolicy::LastSuccessful),
            "updateonly" => Ok(UpdatePolicy::UpdateOnly),
            "fullupdate" => Ok(UpdatePolicy::FullUpdate),
            "localupdateonly" => Ok(UpdatePolicy::LocalUpdateOnly),
            "localfullupdate" => Ok(UpdatePolicy::LocalFullUpdate),
            _ => Err(ReconcileError::UnknownPolicy(s.to_string())),
        }
    }
}

/// How a node's binaries are obtained during the load phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningStrategy {
    /// Use what is cached; fetch only if missing.
    CreateOnly,
    /// Resolve against the remote repositories.
    UpdateFromRemote,
    /// Resolve against the local cache only.
    UpdateLocalOnly,
}

impl ProvisioningStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ProvisioningStrategy::CreateOnly => "create-only",
            ProvisioningStrategy::UpdateFromRemote => "update-from-remote",
            ProvisioningStrategy::UpdateLocalOnly => "update-local-only",
        }
    }
}

impl fmt::Display for ProvisioningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the authoritative tree for an orchestration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledNode {
    pub id: ExtensionId,
    pub parent_id: Option<ExtensionId>,
    pub coordinate: Coordinate,
    pub load_state: LoadState,
    pub messages: Vec<String>,
    pub sealed: bool,
    pub strategy: ProvisioningStrategy,
    pub children: Vec<ReconciledNode>,
}

impl ReconciledNode {
    pub fn find(&self, id: &ExtensionId) -> Option<&ReconciledNode> {
        if self.id == *id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    pub fn find_mut(&mut self, id: &ExtensionId) -> Option<&mut ReconciledNode> {
        if self.id == *id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|child| child.find_mut(id))
    }

    /// Pre-order traversal, parent before children.
    pub fn iter(&self) -> impl Iterator<Item = &ReconciledNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }

    /// Persistable form, without the provisioning strategy.
    pub fn to_extension_node(&self) -> ExtensionNode {
        ExtensionNode {
            id: self.id,
            parent_id: self.parent_id,
            coordinate: self.coordinate.clone(),
            load_state: self.load_state,
            messages: self.messages.clone(),
            sealed: self.sealed,
            children: self
                .children
                .iter()
                .map(ReconciledNode::to_extension_node)
                .collect(),
        }
    }
}

/// Reconciles a saved tree against an expected tree.
///
/// With no saved state at all the run behaves as [`UpdatePolicy::FullUpdate`] whatever `policy`
/// asks for. Fails fatally when both inputs are absent, when ids disagree, or when the merged tree
/// would hold the same id twice.
pub fn reconcile(
    saved: Option<&ExtensionNode>,
    expected: Option<&RegistryNode>,
    policy: UpdatePolicy,
) -> Result<ReconciledNode, ReconcileError> {
    if let Some(expected) = expected {
        expected.validate()?;
    }
    let effective = if saved.is_none() {
        debug!(requested = %policy, "No saved state, reconciling as full update");
        UpdatePolicy::FullUpdate
    } else {
        policy
    };
    let parent_id = saved.and_then(|s| s.parent_id);
    let reconciled = reconcile_node(saved, expected, effective, parent_id)?;

    let mut seen = HashSet::new();
    for node in reconciled.iter() {
        if !seen.insert(node.id) {
            return Err(ReconcileError::InvalidTree(format!(
                "extension {} appears twice in the reconciled tree",
                node.id
            )));
        }
    }
    Ok(reconciled)
}

fn reconcile_node(
    saved: Option<&ExtensionNode>,
    expected: Option<&RegistryNode>,
    policy: UpdatePolicy,
    parent_id: Option<ExtensionId>,
) -> Result<ReconciledNode, ReconcileError> {
    let mut node = match (saved, expected) {
        (None, None) => return Err(ReconcileError::NothingToReconcile),
        (Some(s), Some(e)) if s.id != e.id => {
            return Err(ReconcileError::IdentityMismatch {
                saved: s.id,
                expected: e.id,
            })
        }
        (None, Some(e)) => fresh(e, parent_id, policy.new_node_strategy()),
        (Some(s), None) => carried(s, parent_id, policy.carried_strategy()),
        (Some(s), Some(e)) => match policy {
            UpdatePolicy::LastSuccessful => carried(s, parent_id, policy.carried_strategy()),
            UpdatePolicy::UpdateOnly | UpdatePolicy::LocalUpdateOnly => {
                let mut node = carried(s, parent_id, policy.carried_strategy());
                node.sealed = e.sealed;
                if e.coordinate != s.coordinate {
                    debug!(
                        extension_id = %s.id,
                        from = %s.coordinate,
                        to = %e.coordinate,
                        "Adopting updated coordinate"
                    );
                    node.coordinate = e.coordinate.clone();
                    node.strategy = policy.update_strategy();
                }
                node
            }
            UpdatePolicy::FullUpdate | UpdatePolicy::LocalFullUpdate => {
                let mut node = fresh(e, parent_id, policy.update_strategy());
                // Operator skip states outlive rebuilds.
                if s.load_state.is_skipped() {
                    node.load_state = s.load_state;
                    node.messages = s.messages.clone();
                }
                node
            }
        },
    };

    let saved_children: &[ExtensionNode] = saved.map(|s| s.children.as_slice()).unwrap_or(&[]);
    let expected_children: &[RegistryNode] =
        expected.map(|e| e.children.as_slice()).unwrap_or(&[]);
    let expected_by_id: HashMap<ExtensionId, &RegistryNode> =
        expected_children.iter().map(|e| (e.id, e)).collect();

    let mut children = Vec::with_capacity(saved_children.len().max(expected_children.len()));
    for saved_child in saved_children {
        if saved_child.parent_id != Some(node.id) {
            return Err(ReconcileError::InvalidTree(format!(
                "saved extension {} names parent {:?} but sits under {}",
                saved_child.id, saved_child.parent_id, node.id
            )));
        }
        let expected_child = expected_by_id.get(&saved_child.id).copied();
        if expected_child.is_none() && expected.is_some() {
            debug!(extension_id = %saved_child.id, "Extension no longer expected, carrying it through");
        }
        children.push(reconcile_node(
            Some(saved_child),
            expected_child,
            policy,
            Some(node.id),
        )?);
    }
    let saved_ids: HashSet<ExtensionId> = saved_children.iter().map(|s| s.id).collect();
    for expected_child in expected_children {
        if !saved_ids.contains(&expected_child.id) {
            children.push(reconcile_node(
                None,
                Some(expected_child),
                policy,
                Some(node.id),
            )?);
        }
    }
    node.children = children;
    Ok(node)
}

/// Node built from the registry alone, ready to load.
fn fresh(
    expected: &RegistryNode,
    parent_id: Option<ExtensionId>,
    strategy: ProvisioningStrategy,
) -> ReconciledNode {
    ReconciledNode {
        id: expected.id,
        parent_id,
        coordinate: expected.coordinate.clone(),
        load_state: LoadState::Unloaded,
        messages: Vec::new(),
        sealed: expected.sealed,
        strategy,
        children: Vec::new(),
    }
}

/// Node reused from saved state. Run states restart at `Unloaded` with an empty report; skip
/// states and their messages are kept.
fn carried(
    saved: &ExtensionNode,
    parent_id: Option<ExtensionId>,
    strategy: ProvisioningStrategy,
) -> ReconciledNode {
    let (load_state, messages) = if saved.load_state.is_skipped() {
        (saved.load_state, saved.messages.clone())
    } else {
        (LoadState::Unloaded, Vec::new())
    };
    ReconciledNode {
        id: saved.id,
        parent_id,
        coordinate: saved.coordinate.clone(),
        load_state,
        messages,
        sealed: saved.sealed,
        strategy,
        children: Vec::new(),
    }
}
