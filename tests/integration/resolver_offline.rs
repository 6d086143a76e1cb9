//! Offline resolution only ever sees what an online resolution left in the cache.

use super::test_utils::{RepositoryBuilder, GROUP};
use canopy::artifact::{Artifact, ArtifactResolver, LocalCache, Repository, UniqueArtifact, Version};
use canopy::types::Coordinate;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

fn versions(found: &[UniqueArtifact]) -> BTreeSet<String> {
    found.iter().map(|u| u.version.as_str().to_string()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn offline_versions_are_the_cached_subset(
        published in prop::collection::btree_set(0u32..8, 1..6),
        mask in prop::collection::vec(any::<bool>(), 8),
        installed in proptest::option::of(0u32..4),
    ) {
        let repo = RepositoryBuilder::new();
        for minor in &published {
            repo.publish("core", &format!("1.{}", minor));
        }
        let cache_dir = TempDir::new().unwrap();
        let online = ArtifactResolver::new(
            vec![repo.repository() as Arc<dyn Repository>],
            Arc::new(LocalCache::new(cache_dir.path())),
        );
        let artifact = Artifact::new(GROUP, "core");

        let mut fetched = BTreeSet::new();
        for minor in published.iter().filter(|m| mask[**m as usize]) {
            let version = format!("1.{}", minor);
            let unique = UniqueArtifact::new(artifact.clone(), Version::parse(&version), "central");
            let resolved = online.resolve_with_dependencies(&unique).unwrap();
            prop_assert!(resolved.is_some());
            fetched.insert(version);
        }

        // A version only another repository publishes, copied into this cache.
        if let Some(minor) = installed {
            let version = format!("2.{}", minor);
            let mirror = RepositoryBuilder::new();
            mirror.publish("core", &version);
            let mirror_cache = TempDir::new().unwrap();
            let from_mirror = ArtifactResolver::new(
                vec![mirror.repository() as Arc<dyn Repository>],
                Arc::new(LocalCache::new(mirror_cache.path())),
            );
            let unique = UniqueArtifact::new(artifact.clone(), Version::parse(&version), "central");
            let resolved = from_mirror.resolve_with_dependencies(&unique).unwrap().unwrap();
            prop_assert!(online.install(&resolved));
            fetched.insert(version);
        }

        let offline = online.offline();
        let all_online = versions(&online.find_versions(&artifact).unwrap());
        let all_offline = versions(&offline.find_versions(&artifact).unwrap());

        prop_assert!(all_offline.is_subset(&all_online));
        prop_assert_eq!(&all_offline, &fetched);
    }
}

#[test]
fn offline_resolution_of_uncached_coordinate_is_absent() {
    let repo = RepositoryBuilder::new();
    repo.publish("core", "2.0");
    let cache_dir = TempDir::new().unwrap();
    let resolver = ArtifactResolver::new(
        vec![repo.repository() as Arc<dyn Repository>],
        Arc::new(LocalCache::new(cache_dir.path())),
    )
    .offline();

    let coordinate = Coordinate::new(GROUP, "core", Some("2.0"));
    assert!(resolver.resolve_coordinate(&coordinate, false).unwrap().is_none());
    assert!(resolver
        .find_versions(&Artifact::new(GROUP, "core"))
        .unwrap()
        .is_empty());
}

#[test]
fn online_resolution_feeds_offline_resolution() {
    let repo = RepositoryBuilder::new();
    repo.publish("util", "1.0");
    repo.publish_with("core", "2.0", vec![("util", "[1.0,2.0)")], Vec::new());
    let cache_dir = TempDir::new().unwrap();
    let online = ArtifactResolver::new(
        vec![repo.repository() as Arc<dyn Repository>],
        Arc::new(LocalCache::new(cache_dir.path())),
    );

    let coordinate = Coordinate::new(GROUP, "core", Some("2.0"));
    let resolved = online.resolve_coordinate(&coordinate, false).unwrap().unwrap();
    assert_eq!(resolved.dependencies.len(), 1);
    assert!(online.install(&resolved));

    let offline = online.offline();
    let again = offline.resolve_coordinate(&coordinate, false).unwrap().unwrap();
    assert_eq!(again.unique.version, resolved.unique.version);
    assert_eq!(again.dependencies.len(), 1);
    assert!(again.path.exists());
}
