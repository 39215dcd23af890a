use crate::{LogFile, OutputStream, rotate_log};

use googletest::assert_that;
use googletest::prelude::{eq, none};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;

#[test]
fn given_no_previous_file_when_rotate_then_nothing_renamed() {
    let temp = TempDir::new().unwrap();

    let rotated = rotate_log(&temp.path().join("server.log")).unwrap();

    assert_that!(rotated, none());
}

#[test]
fn given_previous_log_when_open_then_renamed_with_timestamp_and_fresh_file_created() {
    // Given
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("logs").join("server.log");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "old run\n").unwrap();

    // When
    let log = LogFile::open(&path).unwrap();

    // Then
    let rotated: Vec<_> = std::fs::read_dir(path.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("server.log."))
        .collect();
    assert_that!(rotated.len(), eq(1));
    assert!(!rotated[0].contains(':'));
    assert!(rotated[0].ends_with('Z'));
    assert!(log.is_open());
    assert_that!(std::fs::read_to_string(&path).unwrap().as_str(), eq(""));
}

#[test]
fn given_open_log_when_append_then_line_has_timestamp_and_stream() {
    // Given
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("server.log");
    let log = LogFile::open(&path).unwrap();

    // When
    assert!(log.append(OutputStream::Stderr, "boom\n").unwrap());
    log.close().unwrap();

    // Then
    let content = std::fs::read_to_string(&path).unwrap();
    let line = content.lines().next().unwrap();
    assert!(line.starts_with('['));
    assert!(line.ends_with("] [stderr] boom"));
}

#[test]
fn given_closed_log_when_append_then_line_dropped() {
    // Given
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("server.log");
    let log = LogFile::open(&path).unwrap();
    log.close().unwrap();

    // When
    let written = log.append(OutputStream::Stdout, "late").unwrap();

    // Then
    assert!(!written);
    assert!(!log.is_open());
    assert!(log.close().is_ok());
    assert_that!(std::fs::read_to_string(&path).unwrap().as_str(), eq(""));
}

#[tokio::test]
async fn given_child_output_when_pumped_then_every_line_captured() {
    // Given
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("server.log");
    let log = LogFile::open(&path).unwrap();
    let (mut writer, reader) = tokio::io::duplex(256);

    // When
    let pump = log.pump(reader, OutputStream::Stdout);
    writer.write_all(b"listening on 8080\nready\n").await.unwrap();
    drop(writer);
    pump.await.unwrap();
    log.close().unwrap();

    // Then
    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = content.lines().collect();
    assert_that!(lines.len(), eq(2));
    assert!(lines[0].ends_with("[stdout] listening on 8080"));
    assert!(lines[1].ends_with("[stdout] ready"));
}
