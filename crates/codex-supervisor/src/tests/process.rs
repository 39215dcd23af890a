use crate::process::{LaunchRequest, ProcessController, UnixProcessController, pkill_args};

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::time::Instant;

fn shell(script: &str) -> LaunchRequest {
    LaunchRequest {
        program: "sh".into(),
        args: vec!["-c".into(), script.into()],
        ..Default::default()
    }
}

async fn wait_until_gone(controller: &UnixProcessController, pid: u32) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.is_alive(pid) {
        assert!(Instant::now() < deadline, "PID {pid} still alive");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn given_spawned_child_when_terminated_then_reaped_and_not_alive() {
    // Given
    let controller = UnixProcessController::new();
    let spawned = controller.spawn(&shell("sleep 30")).unwrap();
    assert!(controller.is_alive(spawned.pid));

    // When
    controller.terminate(spawned.pid).unwrap();

    // Then
    wait_until_gone(&controller, spawned.pid).await;
}

#[tokio::test]
async fn given_child_ignoring_sigterm_when_tree_killed_then_gone() {
    // Given
    let controller = UnixProcessController::new();
    let spawned = controller
        .spawn(&shell("trap '' TERM; sleep 30 & wait"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // When
    controller.terminate(spawned.pid).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let survived_term = controller.is_alive(spawned.pid);
    controller.kill_tree(spawned.pid).unwrap();

    // Then
    assert!(survived_term);
    wait_until_gone(&controller, spawned.pid).await;
}

#[tokio::test]
async fn given_env_and_capture_when_spawned_then_child_sees_env_and_output_is_piped() {
    // Given
    let mut env = BTreeMap::new();
    env.insert("PORT".to_string(), "8123".to_string());
    let request = LaunchRequest {
        env,
        capture_output: true,
        ..shell("echo port=$PORT")
    };
    let controller = UnixProcessController::new();

    // When
    let spawned = controller.spawn(&request).unwrap();
    let mut output = String::new();
    spawned
        .stdout
        .unwrap()
        .read_to_string(&mut output)
        .await
        .unwrap();

    // Then
    assert_eq!(output.trim(), "port=8123");
    wait_until_gone(&controller, spawned.pid).await;
}

#[tokio::test]
async fn given_missing_program_when_spawned_then_launch_error() {
    let controller = UnixProcessController::new();
    let request = LaunchRequest {
        program: "/nonexistent/codex-server".into(),
        ..Default::default()
    };

    let result = controller.spawn(&request);

    assert!(result.unwrap_err().is_launch_error());
}

#[test]
fn given_unknown_pid_when_checked_then_not_alive() {
    let controller = UnixProcessController::new();

    assert!(!controller.is_alive(3_999_999));
}

#[test]
fn given_short_executable_name_when_killing_by_name_then_exact_comm_match() {
    assert_eq!(pkill_args("codex-server"), ["-KILL", "-x", "codex-server"]);
}

#[test]
fn given_name_longer_than_comm_when_killing_by_name_then_command_line_match() {
    assert_eq!(
        pkill_args("codex-backend-server.bin"),
        ["-KILL", "-f", r"^([^ ]*/)?codex-backend-server\.bin( |$)"]
    );
}
