//! Rotated log file capturing the backend's stdout and stderr.

use crate::{SupervisorError, SupervisorResult};

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{LineWriter, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use error_location::ErrorLocation;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Which child stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Rename an existing log file by appending an ISO-8601 timestamp.
///
/// `server.log` becomes `server.log.2026-01-31T09-15-02.123Z`; colons are
/// replaced so the name is valid on every platform. Returns the new path,
/// or `None` when there was nothing to rotate.
pub fn rotate_log(path: &Path) -> SupervisorResult<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }

    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "log".into());
    let rotated = path.with_file_name(format!("{file_name}.{stamp}"));

    std::fs::rename(path, &rotated)?;
    debug!("Rotated {} to {}", path.display(), rotated.display());

    Ok(Some(rotated))
}

/// Append-only, line-buffered log shared between the output pumps.
///
/// Clones share the same file handle. After [`LogFile::close`] further
/// lines are dropped.
#[derive(Clone)]
pub struct LogFile {
    path: PathBuf,
    writer: Arc<Mutex<Option<LineWriter<File>>>>,
}

impl LogFile {
    /// Rotate any previous file at `path` and open a fresh one.
    pub fn open(path: &Path) -> SupervisorResult<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| SupervisorError::DataDirCreation {
                path: dir.to_path_buf(),
                source: e,
                location: ErrorLocation::from(Location::caller()),
            })?;
        }

        rotate_log(path)?;

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Arc::new(Mutex::new(Some(LineWriter::new(file)))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Write one timestamped line. Returns false if the file is closed.
    pub fn append(&self, stream: OutputStream, line: &str) -> std::io::Result<bool> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(writer) = guard.as_mut() else {
            return Ok(false);
        };

        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        writeln!(writer, "[{stamp}] [{stream}] {}", line.trim_end())?;
        Ok(true)
    }

    /// Flush and release the file handle. Safe to call repeatedly.
    pub fn close(&self) -> std::io::Result<()> {
        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut writer) = writer {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Copy every line of `reader` into this file until EOF or close.
    pub fn pump<R>(&self, reader: R, stream: OutputStream) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let log = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match log.append(stream, &line) {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            warn!("Failed to write backend {stream} to {}: {e}", log.path.display());
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Backend {stream} closed: {e}");
                        break;
                    }
                }
            }
        })
    }
}
