//! Integration tests for the stuck-submission audit.

mod common;

use std::time::Duration;

use cam2_api::background::consistency;
use cam2_core::submission::{SubmissionKey, SubmissionStatus, OUTPUT_PLACEHOLDER};
use cam2_db::repositories::SubmissionRepo;
use common::build_test_app;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn audit_flags_running_record_without_process() {
    let app = build_test_app().await;
    app.register_and_login("alice").await;
    let orphan = SubmissionKey::new("alice", "orphan");
    SubmissionRepo::upsert(
        &app.state.pool,
        &orphan,
        SubmissionStatus::Running,
        OUTPUT_PLACEHOLDER,
        OUTPUT_PLACEHOLDER,
    )
    .await
    .unwrap();

    assert_eq!(consistency::audit_once(&app.state.supervisor).await, 1);
}

#[tokio::test]
async fn audit_ignores_live_and_finished_jobs() {
    let app = build_test_app().await;
    let token = app.register_and_login("alice").await;
    app.submit(&token, "live", "exec sleep 30\n").await;
    app.submit(&token, "done", "true\n").await;
    app.wait_finalized("alice", "done").await;

    assert_eq!(consistency::audit_once(&app.state.supervisor).await, 0);

    app.post_auth("/api/v1/submissions/live/terminate", &token)
        .await;
    app.wait_finalized("alice", "live").await;
}

#[tokio::test]
async fn audit_loop_stops_on_cancel() {
    let app = build_test_app().await;
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(consistency::run(
        app.state.supervisor.clone(),
        Duration::from_millis(10),
        cancel.clone(),
    ));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("audit loop exits after cancel")
        .unwrap();
}
