//! Obtaining a node's binaries according to its provisioning strategy.

use crate::artifact::{ArtifactResolver, ResolvedArtifact};
use crate::error::ResolveError;
use crate::reconcile::ProvisioningStrategy;
use crate::types::{Coordinate, ExtensionId};
use tracing::debug;

pub trait ArtifactProvisioner: Send + Sync {
    fn provision(
        &self,
        id: &ExtensionId,
        coordinate: &Coordinate,
        strategy: ProvisioningStrategy,
    ) -> Result<ResolvedArtifact, ResolveError>;
}

/// Provisions through an [`ArtifactResolver`] and its offline view.
pub struct ResolverProvisioner {
    online: ArtifactResolver,
    offline: ArtifactResolver,
    allow_snapshots: bool,
}

impl ResolverProvisioner {
    pub fn new(resolver: ArtifactResolver, allow_snapshots: bool) -> Self {
        Self {
            offline: resolver.offline(),
            online: resolver,
            allow_snapshots,
        }
    }

    fn remote(&self, coordinate: &Coordinate) -> Result<ResolvedArtifact, ResolveError> {
        self.online
            .resolve_coordinate(coordinate, self.allow_snapshots)?
            .ok_or_else(|| ResolveError::NotFound(coordinate.to_string()))
    }

    fn local(&self, coordinate: &Coordinate) -> Result<Option<ResolvedArtifact>, ResolveError> {
        self.offline
            .resolve_coordinate(coordinate, self.allow_snapshots)
    }
}

impl ArtifactProvisioner for ResolverProvisioner {
    fn provision(
        &self,
        id: &ExtensionId,
        coordinate: &Coordinate,
        strategy: ProvisioningStrategy,
    ) -> Result<ResolvedArtifact, ResolveError> {
        debug!(extension_id = %id, coordinate = %coordinate, strategy = %strategy, "Provisioning");
        match strategy {
            ProvisioningStrategy::CreateOnly => match self.local(coordinate)? {
                Some(resolved) => Ok(resolved),
                None => self.remote(coordinate),
            },
            ProvisioningStrategy::UpdateFromRemote => self.remote(coordinate),
            ProvisioningStrategy::UpdateLocalOnly => self
                .local(coordinate)?
                .ok_or_else(|| ResolveError::NotCached(coordinate.to_string())),
        }
    }
}
