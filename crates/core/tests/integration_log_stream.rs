//! Integration tests for operator log streams and failure composition
//!
//! A failure to write or flush the log must never hide the failure being
//! reported, and must surface on its own when nothing else went wrong.

mod common;

use common::{devcontainer, gitspace, infra, Harness};
use gitspace_core::config::{IdeType, OrchestratorConfig};
use gitspace_core::docker::mock::{MockContainer, MockDocker, MockDockerFactory, MockOperation};
use gitspace_core::errors::GitspaceError;
use gitspace_core::ide::IdeRegistry;
use gitspace_core::logstream::{read_log_file, FileLogStreamFactory};
use gitspace_core::Orchestrator;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_step_failure_and_log_failure_are_combined() {
    let h = Harness::new();
    h.docker.fail_on(MockOperation::Pull);
    h.logs.fail_writes_containing("Error while");
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .create_and_start_gitspace(&config, &devcontainer("alpine", ""), &infra(), "proj")
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with(
        "failed to start gitspace gitspace-u1-proj: original error: could not pull image alpine: "
    ));
    assert!(message.contains("; logging error: "));
    assert!(message.contains("Error while pulling image"));
}

#[tokio::test]
async fn test_log_failure_alone_aborts_pipeline() {
    let h = Harness::new();
    h.logs.fail_writes_containing("Successfully pulled image");
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .create_and_start_gitspace(&config, &devcontainer("alpine", ""), &infra(), "proj")
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .starts_with("failed to start gitspace gitspace-u1-proj: logging error: "));
    assert_eq!(h.docker.count(MockOperation::Create), 0);
}

#[tokio::test]
async fn test_flush_failure_surfaces_after_successful_stop() {
    let h = Harness::new();
    h.docker.add_container(MockContainer::new(
        "c-1".into(),
        "gitspace-u1-proj".into(),
        "alpine".into(),
    ));
    h.logs.fail_flush();
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .stop_gitspace(&config, &infra())
        .await
        .unwrap_err();

    assert!(matches!(err, GitspaceError::Logging(_)));
    assert_eq!(
        err.to_string(),
        "logging error: log stream for gitspace 42 is closed"
    );
    // The stop itself went through
    assert_eq!(h.docker.container("gitspace-u1-proj").unwrap().state, "exited");
}

#[tokio::test]
async fn test_flush_failure_keeps_primary_error() {
    let h = Harness::new();
    h.docker.add_container(MockContainer::new(
        "c-1".into(),
        "gitspace-u1-proj".into(),
        "alpine".into(),
    ));
    h.docker.fail_on(MockOperation::Stop);
    h.logs.fail_flush();
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .stop_gitspace(&config, &infra())
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(matches!(err, GitspaceError::Composite { .. }));
    assert!(message.starts_with("original error: failed to stop gitspace gitspace-u1-proj: "));
    assert!(message.ends_with("; logging error: log stream for gitspace 42 is closed"));
}

#[tokio::test]
async fn test_log_stream_creation_failure_prevents_mutation() {
    let h = Harness::new();
    h.logs.fail_create();
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let err = h
        .orchestrator
        .create_and_start_gitspace(&config, &devcontainer("", ""), &infra(), "proj")
        .await
        .unwrap_err();

    assert!(err
        .to_string()
        .starts_with("error getting log stream for gitspace ID 42: "));
    assert!(h.docker.mutating_operations().is_empty());
    assert_eq!(h.docker.count(MockOperation::Close), 1);
}

#[tokio::test]
async fn test_client_close_failure_does_not_replace_result() {
    let h = Harness::new();
    h.docker.fail_on(MockOperation::Close);
    let config = gitspace("u1", "proj", IdeType::VsCode);

    let result = h
        .orchestrator
        .create_and_start_gitspace(&config, &devcontainer("", ""), &infra(), "proj")
        .await;

    assert!(result.is_ok());
    assert_eq!(h.docker.count(MockOperation::Close), 1);
}

#[tokio::test]
async fn test_file_log_stream_records_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let logs = FileLogStreamFactory::new(temp_dir.path());
    let docker = MockDocker::new();
    let orchestrator = Orchestrator::new(
        OrchestratorConfig::default(),
        Arc::new(MockDockerFactory::new(docker.clone())),
        Arc::new(logs.clone()),
        IdeRegistry::with_defaults(),
    );
    let config = gitspace("u1", "proj", IdeType::VsCodeWeb);

    orchestrator
        .create_and_start_gitspace(&config, &devcontainer("alpine", ""), &infra(), "proj")
        .await
        .unwrap();
    orchestrator
        .stop_and_remove_gitspace(&config, &infra())
        .await
        .unwrap();

    let entries = read_log_file(&logs.log_path(42)).unwrap();
    assert_eq!(
        entries.first().map(|e| e.message.as_str()),
        Some("Pulling image: alpine")
    );
    assert_eq!(
        entries.last().map(|e| e.message.as_str()),
        Some("Successfully removed container")
    );
    assert!(entries.iter().all(|e| e.gitspace_id == 42));
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}
