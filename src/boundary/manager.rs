//! Boundary Manager: creates, tracks and closes boundaries.

use crate::artifact::ResolvedArtifact;
use crate::boundary::Boundary;
use crate::error::BoundaryError;
use crate::types::ExtensionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of open boundaries, keyed by extension id. Shared by every worker of a run.
#[derive(Default)]
pub struct BoundaryManager {
    boundaries: Mutex<HashMap<ExtensionId, Arc<Boundary>>>,
}

impl BoundaryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the boundary of `id` from its resolved binaries, parented to `parent`'s boundary.
    pub fn create(
        &self,
        id: ExtensionId,
        parent: Option<ExtensionId>,
        resolved: &ResolvedArtifact,
    ) -> Result<Arc<Boundary>, BoundaryError> {
        for binary in resolved.binaries() {
            if !binary.is_file() {
                return Err(BoundaryError::MissingBinary(binary));
            }
        }

        let mut boundaries = self.boundaries.lock();
        if boundaries.contains_key(&id) {
            return Err(BoundaryError::AlreadyExists(id));
        }
        let parent_boundary = match parent {
            Some(parent_id) => Some(
                boundaries
                    .get(&parent_id)
                    .cloned()
                    .ok_or(BoundaryError::ParentMissing { id, parent: parent_id })?,
            ),
            None => None,
        };
        let boundary = Arc::new(Boundary::new(id, resolved, parent_boundary));
        boundaries.insert(id, boundary.clone());
        debug!(
            extension_id = %id,
            artifact = %resolved.unique,
            binaries = boundary.binaries().len(),
            "Created boundary"
        );
        Ok(boundary)
    }

    pub fn get(&self, id: &ExtensionId) -> Option<Arc<Boundary>> {
        self.boundaries.lock().get(id).cloned()
    }

    pub fn exists(&self, id: &ExtensionId) -> bool {
        self.boundaries.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.boundaries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.lock().is_empty()
    }

    /// Closes a boundary. Unknown ids are a no-op. A boundary with a live runtime context or an
    /// open child boundary cannot be closed.
    pub fn close(&self, id: &ExtensionId) -> Result<(), BoundaryError> {
        let mut boundaries = self.boundaries.lock();
        let Some(boundary) = boundaries.get(id) else {
            warn!(extension_id = %id, "Close requested for unknown boundary");
            return Ok(());
        };
        if boundary.has_live_context() {
            return Err(BoundaryError::ContextStillLive(*id));
        }
        if let Some(child) = boundaries
            .values()
            .find(|b| b.parent().map(|p| p.id()) == Some(*id))
        {
            return Err(BoundaryError::ChildStillOpen {
                id: *id,
                child: child.id(),
            });
        }
        boundaries.remove(id);
        debug!(extension_id = %id, "Closed boundary");
        Ok(())
    }
}
