//! Start, status, stop and the operator lifecycle edits against a real repository and store.

use super::test_utils::{node, symbol, PlatformFixture, RepositoryBuilder};
use canopy::config::{CanopyConfig, RepositoryConfig};
use canopy::error::{ApiError, BootError};
use canopy::platform::Platform;
use canopy::progress::{Phase, RunStatus};
use canopy::reconcile::UpdatePolicy;
use canopy::registry::FileRegistryClient;
use canopy::runtime::ContextEvent;
use canopy::types::{ExtensionId, LoadState, RegistryNode};
use tempfile::TempDir;

struct App {
    tree: RegistryNode,
    billing: ExtensionId,
    reports: ExtensionId,
    charts: ExtensionId,
}

/// app 3.0 -> [billing (unversioned), reports 1.0 (sealed) -> [charts 0.3]]
fn app(fixture: &PlatformFixture) -> App {
    fixture
        .repo
        .publish_with(
            "app",
            "3.0",
            Vec::new(),
            vec![
                symbol("router", "http-endpoint", false),
                symbol("clock", "service", false),
            ],
        )
        .publish("billing", "1.0")
        .publish("billing", "1.1")
        .publish("billing", "1.2-SNAPSHOT")
        .publish_with(
            "reports",
            "1.0",
            Vec::new(),
            vec![symbol("report-service", "service", true)],
        )
        .publish("charts", "0.3");

    let billing = node("billing", None);
    let charts = node("charts", Some("0.3"));
    let mut reports = node("reports", Some("1.0")).with_child(charts.clone());
    reports.sealed = true;
    let app = App {
        billing: billing.id,
        reports: reports.id,
        charts: charts.id,
        tree: node("app", Some("3.0")).with_child(billing).with_child(reports),
    };
    fixture.registry.set(app.tree.clone());
    app
}

#[test]
fn start_status_stop() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);
    let platform = &fixture.platform;

    let report = platform.start(app.tree.id, UpdatePolicy::LastSuccessful).unwrap();
    assert_eq!(report.loaded, 4);
    assert_eq!(report.failed, 0);
    assert_eq!(report.running, 4);
    assert!(report.run_id.is_some());
    assert!(platform.is_running(&app.tree.id));
    assert_eq!(platform.orchestrator().boundaries().len(), 4);
    assert_eq!(platform.orchestrator().running_count(), 4);

    let status = platform.status(&app.tree.id).unwrap();
    assert!(status.iter().all(|n| n.load_state == LoadState::Running));
    assert_eq!(status.find(&app.charts).unwrap().parent_id, Some(app.reports));

    let stopped = platform.stop(app.tree.id).unwrap();
    assert!(stopped.iter().all(|n| n.load_state == LoadState::Unloaded));
    assert!(!platform.is_running(&app.tree.id));
    assert!(platform.orchestrator().boundaries().is_empty());
    assert_eq!(platform.orchestrator().running_count(), 0);

    let saved = platform.status(&app.tree.id).unwrap();
    assert_eq!(saved, stopped);
    let applications = platform.applications().unwrap();
    assert_eq!(applications.len(), 1);
    assert_eq!(applications[0].extension_count, 4);
}

#[test]
fn unversioned_coordinates_are_pinned_to_the_loaded_release() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);

    let report = fixture
        .platform
        .start(app.tree.id, UpdatePolicy::LastSuccessful)
        .unwrap();
    let billing = report.tree.find(&app.billing).unwrap();
    assert_eq!(billing.coordinate.version.as_deref(), Some("1.1"));
    fixture.platform.stop(app.tree.id).unwrap();

    let saved = fixture.platform.status(&app.tree.id).unwrap();
    assert_eq!(
        saved.find(&app.billing).unwrap().coordinate.version.as_deref(),
        Some("1.1")
    );
}

#[test]
fn failed_extension_does_not_stop_its_siblings() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);
    let missing = node("ledger", Some("9.9"));
    let missing_id = missing.id;
    let mut tree = app.tree.clone();
    tree.children.push(missing);
    fixture.registry.set(tree);

    let report = fixture
        .platform
        .start(app.tree.id, UpdatePolicy::LastSuccessful)
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.running, 4);

    let failed = report.tree.find(&missing_id).unwrap();
    assert_eq!(failed.load_state, LoadState::Error);
    assert!(!failed.messages.is_empty());
    assert_eq!(
        report.tree.find(&app.billing).unwrap().load_state,
        LoadState::Running
    );

    let stopped = fixture.platform.stop(app.tree.id).unwrap();
    assert_eq!(stopped.find(&missing_id).unwrap().load_state, LoadState::Error);
}

#[test]
fn children_of_a_failed_extension_are_not_loaded() {
    let fixture = PlatformFixture::new();
    fixture.repo.publish("app", "1.0").publish("charts", "0.3");
    let charts = node("charts", Some("0.3"));
    let charts_id = charts.id;
    let broken = node("reports", Some("4.0")).with_child(charts);
    let broken_id = broken.id;
    let tree = node("app", Some("1.0")).with_child(broken);
    fixture.registry.set(tree.clone());

    let report = fixture
        .platform
        .start(tree.id, UpdatePolicy::LastSuccessful)
        .unwrap();
    assert_eq!(report.tree.find(&broken_id).unwrap().load_state, LoadState::Error);
    assert_ne!(report.tree.find(&charts_id).unwrap().load_state, LoadState::Running);
    assert!(!fixture.platform.orchestrator().boundaries().exists(&charts_id));
    assert_eq!(report.running, 1);
    fixture.platform.stop(tree.id).unwrap();
}

#[test]
fn root_failure_fails_the_start_and_is_persisted() {
    let fixture = PlatformFixture::new();
    let tree = node("app", Some("1.0")).with_child(node("billing", Some("1.0")));
    fixture.registry.set(tree.clone());

    let err = fixture
        .platform
        .start(tree.id, UpdatePolicy::FullUpdate)
        .unwrap_err();
    match err {
        ApiError::BootError(BootError::Load(report)) => assert!(report.contains(&tree.id)),
        other => panic!("expected load failure, got {other:?}"),
    }
    assert!(!fixture.platform.is_running(&tree.id));
    assert!(fixture.platform.orchestrator().boundaries().is_empty());

    let saved = fixture.platform.status(&tree.id).unwrap();
    assert_eq!(saved.load_state, LoadState::Error);
    assert!(!saved.messages.is_empty());

    let runs = fixture.platform.history(Some(&tree.id)).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error.is_some());
}

#[test]
fn local_policies_never_refetch_a_wiped_cache() {
    let fixture = PlatformFixture::new();
    fixture.repo.publish("app", "1.0").publish("billing", "1.0");
    let tree = node("app", Some("1.0")).with_child(node("billing", Some("1.0")));
    fixture.registry.set(tree.clone());

    let report = fixture.platform.start(tree.id, UpdatePolicy::FullUpdate).unwrap();
    assert_eq!(report.running, 2);
    fixture.platform.stop(tree.id).unwrap();
    assert!(fixture.cache_entries() > 0);

    fixture.wipe_cache();
    for policy in [UpdatePolicy::LocalUpdateOnly, UpdatePolicy::LocalFullUpdate] {
        let err = fixture.platform.start(tree.id, policy).unwrap_err();
        match err {
            ApiError::BootError(BootError::Load(report)) => assert!(report.contains(&tree.id)),
            other => panic!("expected load failure under {policy}, got {other:?}"),
        }
        assert!(!fixture.platform.is_running(&tree.id));
        assert_eq!(fixture.cache_entries(), 0, "{policy} fetched from the repository");
    }
}

#[test]
fn deported_symbols_reach_only_sealed_children() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);
    fixture
        .platform
        .start(app.tree.id, UpdatePolicy::LastSuccessful)
        .unwrap();
    let orchestrator = fixture.platform.orchestrator();

    let root = orchestrator.context(&app.tree.id).unwrap();
    assert!(root.get_bean("router").is_none());
    assert!(root.get_bean("clock").is_some());
    assert!(root.get_bean("report-service").is_some());

    let reports = orchestrator.context(&app.reports).unwrap();
    assert!(reports.get_bean("router").is_some());

    let billing = orchestrator.context(&app.billing).unwrap();
    assert!(billing.get_bean("router").is_none());
    assert!(billing.get_bean("clock").is_some());

    let charts = orchestrator.context(&app.charts).unwrap();
    assert!(charts.get_bean("router").is_none());

    fixture.platform.stop(app.tree.id).unwrap();
}

#[test]
fn configured_bootstrap_symbols_reach_the_root() {
    let repo = RepositoryBuilder::new();
    repo.publish("app", "1.0")
        .publish("billing", "1.0")
        .publish("reports", "1.0");
    let billing = node("billing", Some("1.0"));
    let mut reports = node("reports", Some("1.0"));
    reports.sealed = true;
    let mut tree = node("app", Some("1.0"))
        .with_child(billing.clone())
        .with_child(reports.clone());
    tree.sealed = true;

    let dir = TempDir::new().unwrap();
    let registry = FileRegistryClient::new(dir.path().join("registry"));
    registry.publish(&tree.id, &tree).unwrap();

    let mut config = CanopyConfig::default();
    config.storage.state_path = dir.path().join("state");
    config.storage.cache_path = dir.path().join("cache");
    config.repositories.push(RepositoryConfig {
        id: "central".to_string(),
        location: repo.repository().root().to_string_lossy().to_string(),
    });
    config.registry.location = Some(dir.path().join("registry").to_string_lossy().to_string());
    config.orchestrator.parallelism = Some(2);
    config.bootstrap.symbols = vec![
        symbol("host-router", "http-endpoint", false),
        symbol("host-clock", "service", false),
    ];

    let platform = Platform::open(&config).unwrap();
    let report = platform.start(tree.id, UpdatePolicy::FullUpdate).unwrap();
    assert_eq!(report.running, 3);
    let orchestrator = platform.orchestrator();

    // The sealed root takes the deportable symbol; the rest is shared by the bootstrap context.
    let root = orchestrator.context(&tree.id).unwrap();
    assert!(root.get_bean("host-router").is_some());
    assert!(root.get_bean("host-clock").is_some());

    let billing = orchestrator.context(&billing.id).unwrap();
    assert!(billing.get_bean("host-router").is_none());
    assert!(billing.get_bean("host-clock").is_some());

    // Not re-deported by the root, so a sealed grandchild of the host never sees it.
    let reports = orchestrator.context(&reports.id).unwrap();
    assert!(reports.get_bean("host-router").is_none());

    platform.stop(tree.id).unwrap();
}

#[test]
fn published_events_are_visible_while_running() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);
    fixture
        .platform
        .start(app.tree.id, UpdatePolicy::LastSuccessful)
        .unwrap();

    let billing = fixture.platform.orchestrator().context(&app.billing).unwrap();
    billing.publish(ContextEvent::new(
        "invoice.created",
        serde_json::json!({ "invoice": 17 }),
    ));
    let events = fixture.platform.published_events(&app.tree.id).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source, app.billing);
    assert_eq!(events[0].event.topic, "invoice.created");

    fixture.platform.stop(app.tree.id).unwrap();
    assert!(matches!(
        fixture.platform.published_events(&app.tree.id),
        Err(ApiError::NotRunning(_))
    ));
}

#[test]
fn disable_enable_delete() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);
    let platform = &fixture.platform;
    platform.start(app.tree.id, UpdatePolicy::LastSuccessful).unwrap();

    assert!(matches!(
        platform.disable(&app.tree.id, &app.billing),
        Err(ApiError::AlreadyRunning(_))
    ));
    platform.stop(app.tree.id).unwrap();

    let edited = platform.disable(&app.tree.id, &app.billing).unwrap();
    assert_eq!(edited.find(&app.billing).unwrap().load_state, LoadState::Disabled);

    let report = platform.start(app.tree.id, UpdatePolicy::FullUpdate).unwrap();
    assert_eq!(
        report.tree.find(&app.billing).unwrap().load_state,
        LoadState::Disabled
    );
    assert_eq!(report.running, 3);
    assert!(!platform.orchestrator().boundaries().exists(&app.billing));
    platform.stop(app.tree.id).unwrap();

    let enabled = platform.enable(&app.tree.id, &app.billing).unwrap();
    assert_eq!(enabled.find(&app.billing).unwrap().load_state, LoadState::Unloaded);

    platform.delete_extension(&app.tree.id, &app.charts).unwrap();
    let report = platform.start(app.tree.id, UpdatePolicy::UpdateOnly).unwrap();
    let charts = report.tree.find(&app.charts).unwrap();
    assert_eq!(charts.load_state, LoadState::Deleted);
    assert_eq!(report.running, 3);
    platform.stop(app.tree.id).unwrap();

    assert!(matches!(
        platform.disable(&app.tree.id, &ExtensionId::new()),
        Err(ApiError::ExtensionNotFound { .. })
    ));
}

#[test]
fn double_start_and_idle_stop_are_refused() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);

    assert!(matches!(
        fixture.platform.stop(app.tree.id),
        Err(ApiError::NotRunning(_))
    ));
    fixture
        .platform
        .start(app.tree.id, UpdatePolicy::LastSuccessful)
        .unwrap();
    assert!(matches!(
        fixture.platform.start(app.tree.id, UpdatePolicy::LastSuccessful),
        Err(ApiError::AlreadyRunning(_))
    ));
    fixture.platform.stop(app.tree.id).unwrap();
}

#[test]
fn runs_are_recorded_with_their_phases() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);
    let report = fixture
        .platform
        .start(app.tree.id, UpdatePolicy::UpdateOnly)
        .unwrap();
    fixture.platform.stop(app.tree.id).unwrap();

    let runs = fixture.platform.history(Some(&app.tree.id)).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
    let start = runs.iter().find(|r| r.command == "start").unwrap();
    assert_eq!(Some(&start.run_id), report.run_id.as_ref());
    assert_eq!(start.policy.as_deref(), Some("update-only"));

    let events = fixture.platform.run_events(&start.run_id).unwrap();
    let phases: Vec<(Phase, bool)> = events.iter().map(|e| (e.phase, e.is_finish())).collect();
    assert_eq!(
        phases,
        vec![
            (Phase::Load, false),
            (Phase::Load, true),
            (Phase::Launch, false),
            (Phase::Launch, true),
        ]
    );

    let stop = runs.iter().find(|r| r.command == "stop").unwrap();
    let events = fixture.platform.run_events(&stop.run_id).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.phase == Phase::Stop));

    assert!(fixture.platform.history(Some(&ExtensionId::new())).unwrap().is_empty());
}

#[test]
fn history_is_pruned_to_its_limit() {
    let fixture = PlatformFixture::new();
    let app = app(&fixture);
    for _ in 0..7 {
        fixture
            .platform
            .start(app.tree.id, UpdatePolicy::LastSuccessful)
            .unwrap();
        fixture.platform.stop(app.tree.id).unwrap();
    }
    let runs = fixture.platform.history(None).unwrap();
    assert_eq!(runs.len(), 10);
}
