//! Outcome of a single health probe and how it is interpreted.

use std::fmt;

/// Result of one `GET /health` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckResult {
    /// The backend answered with this HTTP status
    Status(u16),
    /// Nothing is listening on the port
    Refused,
    /// No answer within the probe timeout
    TimedOut,
    /// Any other transport failure
    Failed(String),
}

/// Whether a probe proves the backend is still up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
}

impl HealthCheckResult {
    /// Only a 200 marks the backend as initialised.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Status(200))
    }

    /// 401 and 403 still prove a live server that is rejecting the request.
    pub fn liveness(&self) -> Liveness {
        match self {
            Self::Status(200 | 401 | 403) => Liveness::Alive,
            _ => Liveness::Dead,
        }
    }

    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::TimedOut
        } else if error.is_connect() {
            Self::Refused
        } else {
            Self::Failed(error.to_string())
        }
    }
}

impl fmt::Display for HealthCheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "HTTP {code}"),
            Self::Refused => write!(f, "connection refused"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Failed(message) => write!(f, "{message}"),
        }
    }
}
