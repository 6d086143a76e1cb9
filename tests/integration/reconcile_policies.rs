//! Update policies observed end to end: registry edits against what a start actually loads.

use super::test_utils::{node, PlatformFixture, GROUP};
use canopy::error::{ApiError, ReconcileError};
use canopy::reconcile::{reconcile, UpdatePolicy};
use canopy::types::{Coordinate, ExtensionId, ExtensionNode, LoadState, RegistryNode};

/// app 1.0 -> [billing 1.0, reports 1.0]
fn publish_and_register(fixture: &PlatformFixture) -> (RegistryNode, ExtensionId) {
    fixture
        .repo
        .publish("app", "1.0")
        .publish("billing", "1.0")
        .publish("billing", "1.1")
        .publish("reports", "1.0");
    let billing = node("billing", Some("1.0"));
    let billing_id = billing.id;
    let tree = node("app", Some("1.0"))
        .with_child(billing)
        .with_child(node("reports", Some("1.0")));
    fixture.registry.set(tree.clone());
    (tree, billing_id)
}

fn bump_billing(tree: &RegistryNode, billing: &ExtensionId) -> RegistryNode {
    let mut bumped = tree.clone();
    for child in &mut bumped.children {
        if child.id == *billing {
            child.coordinate = Coordinate::new(GROUP, "billing", Some("1.1"));
        }
    }
    bumped
}

fn version_of(tree: &ExtensionNode, id: &ExtensionId) -> Option<String> {
    tree.find(id).and_then(|n| n.coordinate.version.clone())
}

fn start_and_stop(fixture: &PlatformFixture, app: ExtensionId, policy: UpdatePolicy) -> ExtensionNode {
    let report = fixture.platform.start(app, policy).unwrap();
    assert_eq!(report.failed, 0);
    fixture.platform.stop(app).unwrap();
    report.tree
}

#[test]
fn last_successful_ignores_registry_changes() {
    let fixture = PlatformFixture::new();
    let (tree, billing) = publish_and_register(&fixture);
    start_and_stop(&fixture, tree.id, UpdatePolicy::LastSuccessful);

    fixture.registry.set(bump_billing(&tree, &billing));
    let started = start_and_stop(&fixture, tree.id, UpdatePolicy::LastSuccessful);
    assert_eq!(version_of(&started, &billing).as_deref(), Some("1.0"));
}

#[test]
fn update_only_adopts_changed_coordinates() {
    let fixture = PlatformFixture::new();
    let (tree, billing) = publish_and_register(&fixture);
    start_and_stop(&fixture, tree.id, UpdatePolicy::LastSuccessful);

    fixture.registry.set(bump_billing(&tree, &billing));
    let started = start_and_stop(&fixture, tree.id, UpdatePolicy::UpdateOnly);
    assert_eq!(version_of(&started, &billing).as_deref(), Some("1.1"));

    let saved = fixture.platform.status(&tree.id).unwrap();
    assert_eq!(version_of(&saved, &billing).as_deref(), Some("1.1"));
}

#[test]
fn local_update_only_fails_for_uncached_versions() {
    let fixture = PlatformFixture::new();
    let (tree, billing) = publish_and_register(&fixture);
    start_and_stop(&fixture, tree.id, UpdatePolicy::LastSuccessful);

    fixture.registry.set(bump_billing(&tree, &billing));
    let report = fixture
        .platform
        .start(tree.id, UpdatePolicy::LocalUpdateOnly)
        .unwrap();
    let failed = report.tree.find(&billing).unwrap();
    assert_eq!(failed.load_state, LoadState::Error);
    assert!(!failed.messages.is_empty());
    assert_eq!(report.failed, 1);
    fixture.platform.stop(tree.id).unwrap();
}

#[test]
fn first_run_fetches_whatever_the_policy() {
    for policy in [UpdatePolicy::LastSuccessful, UpdatePolicy::UpdateOnly] {
        let fixture = PlatformFixture::new();
        let (tree, _) = publish_and_register(&fixture);
        let report = fixture.platform.start(tree.id, policy).unwrap();
        assert_eq!(report.running, 3);
        fixture.platform.stop(tree.id).unwrap();
    }
}

#[test]
fn extensions_dropped_by_the_registry_are_carried() {
    let fixture = PlatformFixture::new();
    let (tree, billing) = publish_and_register(&fixture);
    start_and_stop(&fixture, tree.id, UpdatePolicy::LastSuccessful);

    let mut trimmed = tree.clone();
    trimmed.children.retain(|c| c.id != billing);
    fixture.registry.set(trimmed);

    let started = start_and_stop(&fixture, tree.id, UpdatePolicy::UpdateOnly);
    assert_eq!(started.find(&billing).unwrap().load_state, LoadState::Running);
}

#[test]
fn unreachable_registry_falls_back_to_saved_state() {
    let fixture = PlatformFixture::new();
    let (tree, billing) = publish_and_register(&fixture);
    start_and_stop(&fixture, tree.id, UpdatePolicy::LastSuccessful);

    fixture.registry.set_unreachable(true);
    let started = start_and_stop(&fixture, tree.id, UpdatePolicy::UpdateOnly);
    assert_eq!(version_of(&started, &billing).as_deref(), Some("1.0"));
}

#[test]
fn unreachable_registry_without_saved_state_fails() {
    let fixture = PlatformFixture::new();
    let (tree, _) = publish_and_register(&fixture);
    fixture.registry.set_unreachable(true);

    let err = fixture
        .platform
        .start(tree.id, UpdatePolicy::LastSuccessful)
        .unwrap_err();
    assert!(matches!(err, ApiError::RegistryError(_)));
    assert!(!fixture.platform.is_running(&tree.id));
}

#[test]
fn unknown_application_is_not_found() {
    let fixture = PlatformFixture::new();
    let missing = ExtensionId::new();
    let err = fixture
        .platform
        .start(missing, UpdatePolicy::FullUpdate)
        .unwrap_err();
    assert!(matches!(err, ApiError::ApplicationNotFound(id) if id == missing));
}

#[test]
fn identity_mismatch_aborts_reconciliation() {
    let saved = ExtensionNode::new(
        ExtensionId::new(),
        None,
        Coordinate::new(GROUP, "app", Some("1.0")),
    );
    let expected = RegistryNode::new(ExtensionId::new(), saved.coordinate.clone());
    for policy in UpdatePolicy::ALL {
        assert!(matches!(
            reconcile(Some(&saved), Some(&expected), policy),
            Err(ReconcileError::IdentityMismatch { .. })
        ));
    }
}
