//! Port selection for the backend.

use crate::{SupervisorError, SupervisorResult};

use std::panic::Location;

use error_location::ErrorLocation;

const HOST: &str = "127.0.0.1";

pub struct PortManager;

impl PortManager {
    /// First bindable port from `candidates`, in order.
    ///
    /// The preferred port comes first; fallbacks are tried sequentially.
    pub fn find_available(candidates: &[u16]) -> SupervisorResult<u16> {
        candidates
            .iter()
            .copied()
            .find(|port| Self::is_available(*port))
            .ok_or_else(|| SupervisorError::NoAvailablePort {
                candidates: candidates.to_vec(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Check if a port is available for binding.
    ///
    /// Attempts to bind to 127.0.0.1:port. The socket is released
    /// as soon as the listener is dropped.
    pub fn is_available(port: u16) -> bool {
        std::net::TcpListener::bind((HOST, port)).is_ok()
    }
}
