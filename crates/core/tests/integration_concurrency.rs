//! Integration tests for per-identity serialization and operation deadlines

mod common;

use common::{devcontainer, gitspace, infra, Harness};
use gitspace_core::config::{IdeType, OrchestratorConfig};
use gitspace_core::docker::mock::{MockContainer, MockOperation};
use gitspace_core::errors::GitspaceError;
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_creates_on_same_identity_provision_once() {
    let h = Harness::new();
    h.docker
        .update_config(|c| c.operation_delay = Some(Duration::from_millis(20)));
    let config = gitspace("u1", "proj", IdeType::VsCode);
    let dc = devcontainer("alpine", "");
    let infra = infra();

    let (first, second) = tokio::join!(
        h.orchestrator
            .create_and_start_gitspace(&config, &dc, &infra, "proj"),
        h.orchestrator
            .create_and_start_gitspace(&config, &dc, &infra, "proj"),
    );

    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.container_id, second.container_id);
    assert_eq!(h.docker.count(MockOperation::Create), 1);
    assert_eq!(h.docker.count(MockOperation::Close), 2);
    assert_eq!(h.orchestrator.locks().active(), 0);
}

#[tokio::test]
async fn test_create_then_remove_race_is_serialized() {
    let h = Harness::new();
    h.docker
        .update_config(|c| c.operation_delay = Some(Duration::from_millis(10)));
    let config = gitspace("u1", "proj", IdeType::VsCode);
    let dc = devcontainer("alpine", "");
    let infra = infra();

    let (created, removed) = tokio::join!(
        h.orchestrator
            .create_and_start_gitspace(&config, &dc, &infra, "proj"),
        async {
            // Let the create acquire the identity first
            tokio::task::yield_now().await;
            h.orchestrator.stop_and_remove_gitspace(&config, &infra).await
        },
    );

    created.unwrap();
    removed.unwrap();
    // Removal ran against the fully provisioned container
    assert_eq!(h.docker.count(MockOperation::Remove), 1);
    assert!(h.docker.container("gitspace-u1-proj").is_none());
}

#[tokio::test]
async fn test_different_identities_proceed_independently() {
    let h = Harness::new();
    let a = gitspace("u1", "proj", IdeType::VsCode);
    let b = gitspace("u2", "proj", IdeType::VsCodeWeb);
    let dc = devcontainer("alpine", "");
    let infra = infra();

    let (ra, rb) = tokio::join!(
        h.orchestrator.create_and_start_gitspace(&a, &dc, &infra, "proj"),
        h.orchestrator.create_and_start_gitspace(&b, &dc, &infra, "proj"),
    );

    assert_eq!(ra.unwrap().container_name, "gitspace-u1-proj");
    assert_eq!(rb.unwrap().container_name, "gitspace-u2-proj");
    assert_eq!(h.docker.count(MockOperation::Create), 2);
}

#[tokio::test]
async fn test_operation_deadline_aborts_and_releases_client() {
    let h = Harness::with_config(OrchestratorConfig {
        operation_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    h.docker
        .update_config(|c| c.operation_delay = Some(Duration::from_millis(500)));
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .create_and_start_gitspace(&config, &devcontainer("alpine", ""), &infra(), "proj")
        .await
        .unwrap_err();

    assert!(matches!(err, GitspaceError::Timeout { .. }));
    assert_eq!(
        err.to_string(),
        "create and start gitspace timed out after 50ms"
    );
    // The pull was in flight; nothing after it started
    assert_eq!(h.docker.count(MockOperation::Create), 0);
    assert_eq!(h.docker.count(MockOperation::Close), 1);

    // The interrupted step is recorded and the stream still flushed
    assert_eq!(
        h.logs.messages(42),
        vec![
            "Pulling image: alpine".to_string(),
            "Error while pulling image: create and start gitspace timed out after 50ms"
                .to_string(),
        ]
    );
    assert_eq!(h.logs.flushes(), vec![42]);
}

#[tokio::test]
async fn test_stop_deadline_records_failure_and_flushes() {
    let h = Harness::with_config(OrchestratorConfig {
        operation_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    h.docker.add_container(MockContainer::new(
        "c-1".into(),
        "gitspace-u1-proj".into(),
        "alpine".into(),
    ));
    h.docker
        .update_config(|c| c.operation_delay = Some(Duration::from_millis(500)));
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .stop_gitspace(&config, &infra())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "stop gitspace timed out after 50ms");
    assert_eq!(
        h.logs.messages(42),
        vec![
            "Stopping container: gitspace-u1-proj".to_string(),
            "Error while stopping container: stop gitspace timed out after 50ms".to_string(),
        ]
    );
    assert_eq!(h.logs.flushes(), vec![42]);
    assert_eq!(h.docker.count(MockOperation::Close), 1);
}

#[tokio::test]
async fn test_deadline_with_failing_log_keeps_timeout() {
    let h = Harness::with_config(OrchestratorConfig {
        operation_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    h.docker
        .update_config(|c| c.operation_delay = Some(Duration::from_millis(500)));
    h.logs.fail_writes_containing("timed out");
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .create_and_start_gitspace(&config, &devcontainer("alpine", ""), &infra(), "proj")
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, GitspaceError::Composite { .. }));
    assert!(message
        .starts_with("original error: create and start gitspace timed out after 50ms; logging error: "));
    assert_eq!(h.logs.flushes(), vec![42]);
}

#[tokio::test]
async fn test_deadline_not_hit_for_fast_operations() {
    let h = Harness::with_config(OrchestratorConfig {
        operation_timeout: Some(Duration::from_secs(30)),
        ..Default::default()
    });
    let config = gitspace("u1", "proj", IdeType::VsCode);

    h.orchestrator
        .create_and_start_gitspace(&config, &devcontainer("alpine", ""), &infra(), "proj")
        .await
        .unwrap();
    h.orchestrator.stop_gitspace(&config, &infra()).await.unwrap();
}
