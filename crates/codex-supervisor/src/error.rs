use std::panic::Location;
use std::path::PathBuf;

use error_location::ErrorLocation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Backend executable not found at {path} {location}")]
    ExecutableNotFound {
        path: PathBuf,
        location: ErrorLocation,
    },

    #[error("Failed to launch backend process: {message} {location}")]
    Launch {
        message: String,
        #[source]
        source: Option<std::io::Error>,
        location: ErrorLocation,
    },

    #[error("No available port among {candidates:?} {location}")]
    NoAvailablePort {
        candidates: Vec<u16>,
        location: ErrorLocation,
    },

    #[error("Backend did not become ready after {attempts} health checks (last: {last_result}) {location}")]
    StartupTimeout {
        attempts: u32,
        last_result: String,
        location: ErrorLocation,
    },

    #[error("Backend startup cancelled by a shutdown request {location}")]
    StartupCancelled { location: ErrorLocation },

    #[error("Health check failed: {message} {location}")]
    HealthCheck {
        message: String,
        location: ErrorLocation,
    },

    #[error("Graceful shutdown request failed: {message} {location}")]
    Shutdown {
        message: String,
        location: ErrorLocation,
    },

    #[error("Configuration invalid: {message} {location}")]
    ConfigInvalid {
        message: String,
        location: ErrorLocation,
    },

    #[error("Failed to create directory at {path}: {source} {location}")]
    DataDirCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("Logging setup failed: {message} {location}")]
    Logging {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO error: {source} {location}")]
    Io {
        #[source]
        source: std::io::Error,
        location: ErrorLocation,
    },

    #[error("HTTP error: {source} {location}")]
    Http {
        #[source]
        source: reqwest::Error,
        location: ErrorLocation,
    },
}

impl SupervisorError {
    #[track_caller]
    pub fn launch<S: Into<String>>(message: S, source: Option<std::io::Error>) -> Self {
        Self::Launch {
            message: message.into(),
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn health_check<S: Into<String>>(message: S) -> Self {
        Self::HealthCheck {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn shutdown<S: Into<String>>(message: S) -> Self {
        Self::Shutdown {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub fn logging<S: Into<String>>(message: S) -> Self {
        Self::Logging {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// Whether this error is recoverable via retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::HealthCheck { .. } | Self::Http { .. } | Self::Shutdown { .. }
        )
    }

    /// Whether this error belongs to the launch phase (missing binary, spawn failure).
    pub fn is_launch_error(&self) -> bool {
        matches!(
            self,
            Self::ExecutableNotFound { .. } | Self::Launch { .. } | Self::NoAvailablePort { .. }
        )
    }

    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound { .. } => {
                "The backend executable is missing. \
                   Please reinstall the application."
            }
            Self::Launch { .. } => {
                "The backend could not be started. \
                   Check the logs directory for details."
            }
            Self::NoAvailablePort { .. } => {
                "Ports 8080-8083 are all in use. \
                   Close other applications using them or restart your computer."
            }
            Self::StartupTimeout { .. } => {
                "The backend is taking too long to start. \
                   Try restarting the application or check server.log."
            }
            Self::ConfigInvalid { .. } => {
                "Configuration file has invalid settings. \
                   Check the logs for details or delete the config file to use defaults."
            }
            Self::DataDirCreation { .. } => {
                "Unable to create the logs directory. \
                   Check file permissions or available disk space."
            }
            _ => "An unexpected error occurred. Please check the logs for details.",
        }
    }
}

impl From<std::io::Error> for SupervisorError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<reqwest::Error> for SupervisorError {
    #[track_caller]
    fn from(source: reqwest::Error) -> Self {
        Self::Http {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
