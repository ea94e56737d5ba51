//! Action gateway and safe-mode run over real HTTP.

mod common;

use common::{eventually, MockBackend};
use lib_opsdash::core::{QueueItem, RunStatus};
use lib_opsdash::{ActionError, Dashboard};

#[tokio::test]
async fn rejected_restart_surfaces_the_backend_detail() {
    let mock = MockBackend::spawn().await;
    let dash = Dashboard::new(mock.settings());
    dash.caches().services.refresh().await;
    let before = dash.caches().services.snapshot();

    let err = dash.restart(QueueItem::service("nginx")).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(
        err.to_string(),
        "Failed to restart service nginx: Unit nginx.service not found."
    );

    let after = dash.caches().services.snapshot();
    assert_eq!(after.data, before.data);
    assert_eq!(after.error, None);
    // Exactly one request: actions never retry.
    assert_eq!(mock.count("POST /api/actions/restart service nginx"), 1);
}

#[tokio::test]
async fn accepted_restart_refetches_the_resource() {
    let mock = MockBackend::spawn().await;
    let dash = Dashboard::new(mock.settings());

    let outcome = dash.restart(QueueItem::container("guacamole-db")).await.unwrap();
    assert_eq!(outcome.message, "Container guacamole-db restarted successfully");
    eventually("containers refetch", || dash.caches().containers.data().is_some()).await;
}

#[tokio::test]
async fn resolve_returns_actions_taken() {
    let mock = MockBackend::spawn().await;
    let dash = Dashboard::new(mock.settings());

    let outcome = dash.resolve("old_kernels").await.unwrap();
    assert_eq!(outcome.actions_taken, vec!["Removed old kernels".to_string()]);
}

#[tokio::test]
async fn safe_mode_run_stops_at_the_first_failing_step() {
    let mock = MockBackend::spawn().await;
    let dash = Dashboard::new(mock.settings());
    let safe_mode = dash.safe_mode();

    safe_mode
        .start(vec![
            QueueItem::container("guacamole-db"),
            QueueItem::service("nginx"),
            QueueItem::container("guacamole-web"),
        ])
        .unwrap();

    // Manual restarts are locked out while the run owns the host.
    assert_eq!(
        dash.restart(QueueItem::container("guacamole-db")).await.unwrap_err(),
        ActionError::SafeModeActive
    );

    assert_eq!(safe_mode.wait().await, RunStatus::Failed);

    let restarts: Vec<String> = mock
        .hits()
        .into_iter()
        .filter(|h| h.starts_with("POST /api/actions/restart"))
        .collect();
    assert_eq!(
        restarts,
        vec![
            "POST /api/actions/restart container guacamole-db",
            "POST /api/actions/restart service nginx",
        ]
    );
    assert!(mock.count("GET /api/containers") >= 1);

    let run = safe_mode.run();
    assert_eq!(run.current_step, Some(1));
    let log: Vec<&str> = run.log.iter().map(|l| l.text.as_str()).collect();
    // The mock has no safe_mode endpoint; the run carries on without it.
    assert!(log.iter().any(|l| l.starts_with("Backend did not acknowledge 'enter safe mode'")));
    assert!(log.contains(&"container guacamole-db is running"));
    assert!(log.contains(
        &"Run failed: restart of service nginx failed: Failed to restart service nginx: Unit nginx.service not found."
    ));
    assert!(log.iter().any(|l| l.starts_with("Backend did not acknowledge 'exit safe mode'")));

    // The lock is gone with the run.
    dash.restart(QueueItem::container("guacamole-db")).await.unwrap();
}
