//! Saved trees survive a reopen of the sled database unchanged.

use super::test_utils::GROUP;
use canopy::store::{SledStateStore, StateStore};
use canopy::types::{Coordinate, ExtensionId, ExtensionNode, LoadState};
use tempfile::TempDir;

fn sample_tree() -> ExtensionNode {
    let mut failed = ExtensionNode::new(
        ExtensionId::new(),
        None,
        Coordinate::new(GROUP, "reports", Some("1.2")),
    );
    failed.load_state = LoadState::Error;
    failed.sealed = true;
    failed.messages = vec![
        "Artifact not found: org.example:reports:1.2".to_string(),
        "Boundary for extension was never created".to_string(),
    ];

    let mut disabled = ExtensionNode::new(
        ExtensionId::new(),
        None,
        Coordinate::new(GROUP, "billing", None),
    );
    disabled.load_state = LoadState::Disabled;

    let leaf = ExtensionNode::new(
        ExtensionId::new(),
        None,
        Coordinate::new(GROUP, "charts", Some("0.3")),
    );

    ExtensionNode::new(
        ExtensionId::new(),
        None,
        Coordinate::new(GROUP, "app", Some("3.0")),
    )
    .with_child(failed.with_child(leaf))
    .with_child(disabled)
}

#[test]
fn tree_round_trips_across_reopen() {
    let dir = TempDir::new().unwrap();
    let tree = sample_tree();
    tree.validate().unwrap();

    {
        let store = SledStateStore::new(dir.path()).unwrap();
        store.save(&tree).unwrap();
        store.flush().unwrap();
    }

    let store = SledStateStore::new(dir.path()).unwrap();
    let loaded = store.load(&tree.id).unwrap().unwrap();
    assert_eq!(loaded, tree);
    assert_eq!(loaded.children[0].messages.len(), 2);
    assert_eq!(loaded.children[0].children[0].parent_id, Some(loaded.children[0].id));

    let applications = store.applications().unwrap();
    assert_eq!(applications.len(), 1);
    assert_eq!(applications[0].application_id, tree.id);
    assert_eq!(applications[0].extension_count, 4);
}

#[test]
fn saving_a_smaller_tree_drops_removed_extensions() {
    let dir = TempDir::new().unwrap();
    let store = SledStateStore::new(dir.path()).unwrap();
    let mut tree = sample_tree();
    store.save(&tree).unwrap();

    tree.children.truncate(1);
    tree.children[0].children.clear();
    store.save(&tree).unwrap();

    let loaded = store.load(&tree.id).unwrap().unwrap();
    assert_eq!(loaded, tree);
    assert_eq!(store.applications().unwrap()[0].extension_count, 2);
}

#[test]
fn remove_forgets_the_application() {
    let dir = TempDir::new().unwrap();
    let store = SledStateStore::new(dir.path()).unwrap();
    let tree = sample_tree();
    store.save(&tree).unwrap();

    assert!(store.remove(&tree.id).unwrap());
    assert!(store.load(&tree.id).unwrap().is_none());
    assert!(!store.remove(&tree.id).unwrap());
    assert!(store.applications().unwrap().is_empty());
}

#[test]
fn unknown_application_loads_as_absent() {
    let dir = TempDir::new().unwrap();
    let store = SledStateStore::new(dir.path()).unwrap();
    assert!(store.load(&ExtensionId::new()).unwrap().is_none());
}
