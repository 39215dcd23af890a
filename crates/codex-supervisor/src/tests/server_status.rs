use crate::{ServerProcessHandle, ServerState, ServerStatus, SupervisorError};

use std::path::PathBuf;

use error_location::ErrorLocation;
use googletest::assert_that;
use googletest::prelude::eq;

#[test]
fn given_running_handle_when_status_built_then_base_url_present() {
    // Given
    let mut handle = ServerProcessHandle::new(42, 8081);
    handle.running = true;
    let state = ServerState::Running { pid: 42, port: 8081 };

    // When
    let status = ServerStatus::build(&state, Some(&handle), "127.0.0.1", 2);

    // Then
    assert!(status.is_running);
    assert_eq!(status.base_url.as_deref(), Some("http://127.0.0.1:8081"));
    assert_eq!(status.pid, Some(42));
    assert_that!(status.restart_count, eq(2));
    assert_that!(status.state.as_str(), eq("running"));
}

#[test]
fn given_probing_handle_when_status_built_then_no_base_url() {
    let handle = ServerProcessHandle::new(42, 8080);
    let state = ServerState::ProbingReadiness { pid: 42, port: 8080 };

    let status = ServerStatus::build(&state, Some(&handle), "127.0.0.1", 0);

    assert!(!status.is_running);
    assert_eq!(status.base_url, None);
    assert_eq!(status.port, Some(8080));
}

#[test]
fn given_failed_state_when_status_built_then_error_and_hint() {
    let state = ServerState::Failed {
        error: "boom".into(),
    };

    let status = ServerStatus::build(&state, None, "127.0.0.1", 0);

    assert_eq!(status.error.as_deref(), Some("boom"));
    assert!(status.recovery_hint.is_some());
}

#[test]
fn given_missing_executable_error_when_status_from_error_then_reinstall_hint() {
    let error = SupervisorError::ExecutableNotFound {
        path: PathBuf::from("/opt/codex/codex-server"),
        location: ErrorLocation::from(std::panic::Location::caller()),
    };

    let status = ServerStatus::from_error(&error);

    assert_that!(status.state.as_str(), eq("failed"));
    assert!(status.recovery_hint.unwrap().contains("reinstall"));
}

#[test]
fn given_status_when_serialized_then_json_has_state_label() {
    let status = ServerStatus::build(&ServerState::Stopped, None, "127.0.0.1", 0);

    let json = serde_json::to_value(&status).unwrap();

    assert_eq!(json["state"], "stopped");
    assert_eq!(json["is_running"], false);
}
