//! Readiness polling after launch.

use crate::{BackendApi, HealthCheckResult, ResilienceSettings, SupervisorError, SupervisorResult};

use std::panic::Location;
use std::time::Duration;

use error_location::ErrorLocation;
use tracing::{debug, info};

/// Polls the health endpoint until the first 200 or the attempt budget runs out.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProber {
    attempts: u32,
    interval: Duration,
    probe_timeout: Duration,
}

impl ReadinessProber {
    pub fn new(attempts: u32, interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
            probe_timeout,
        }
    }

    pub fn from_settings(settings: &ResilienceSettings) -> Self {
        Self::new(
            settings.readiness_attempts,
            settings.readiness_interval(),
            settings.probe_timeout(),
        )
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Wait for the backend on `port` to report ready.
    ///
    /// Returns the number of probes it took.
    pub async fn wait_ready(&self, api: &dyn BackendApi, port: u16) -> SupervisorResult<u32> {
        let mut last_result = HealthCheckResult::Failed("not probed".into());

        for attempt in 1..=self.attempts {
            let result = api.health(port, self.probe_timeout).await;

            if result.is_ready() {
                info!("Backend ready on port {port} after {attempt} health check(s)");
                return Ok(attempt);
            }

            debug!(
                "Readiness check {attempt}/{} on port {port}: {result}",
                self.attempts
            );
            last_result = result;

            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(SupervisorError::StartupTimeout {
            attempts: self.attempts,
            last_result: last_result.to_string(),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}
