//! HTTP calls the supervisor makes against the backend.

use crate::{HEALTH_PATH, HealthCheckResult, SHUTDOWN_PATH, SupervisorError, SupervisorResult};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// Exit deadline declared by the backend in its shutdown acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTimeout {
    Declared(Duration),
    Unspecified,
}

impl ShutdownTimeout {
    pub fn or_default(self, fallback: Duration) -> Duration {
        match self {
            Self::Declared(timeout) => timeout,
            Self::Unspecified => fallback,
        }
    }

    /// Parse the `{ "timeout": <seconds> }` body of a shutdown acknowledgement.
    pub fn from_body(body: &str) -> Self {
        #[derive(Deserialize)]
        struct ShutdownResponse {
            timeout: Option<f64>,
        }

        match serde_json::from_str::<ShutdownResponse>(body) {
            Ok(ShutdownResponse {
                timeout: Some(secs),
            }) if secs.is_finite() && secs >= 0.0 => Self::Declared(Duration::from_secs_f64(secs)),
            _ => Self::Unspecified,
        }
    }
}

/// Backend endpoints used by the lifecycle manager.
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// Probe `GET /health` once.
    async fn health(&self, port: u16, timeout: Duration) -> HealthCheckResult;

    /// Ask the backend to exit via `POST /shutdown`.
    async fn request_shutdown(
        &self,
        port: u16,
        timeout: Duration,
    ) -> SupervisorResult<ShutdownTimeout>;
}

/// [`BackendApi`] over plain HTTP on the loopback interface.
pub struct HttpBackendApi {
    client: reqwest::Client,
    host: String,
}

impl HttpBackendApi {
    pub fn new(host: impl Into<String>) -> SupervisorResult<Self> {
        // Fresh connection per probe; a pooled socket to a dead backend proves nothing
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self {
            client,
            host: host.into(),
        })
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{port}{path}", self.host)
    }
}

#[async_trait]
impl BackendApi for HttpBackendApi {
    async fn health(&self, port: u16, timeout: Duration) -> HealthCheckResult {
        let url = self.url(port, HEALTH_PATH);

        match self.client.get(&url).timeout(timeout).send().await {
            Ok(resp) => HealthCheckResult::Status(resp.status().as_u16()),
            Err(e) => {
                debug!("Health probe to {url} failed: {e}");
                HealthCheckResult::from_reqwest_error(&e)
            }
        }
    }

    async fn request_shutdown(
        &self,
        port: u16,
        timeout: Duration,
    ) -> SupervisorResult<ShutdownTimeout> {
        let url = self.url(port, SHUTDOWN_PATH);

        let resp = self
            .client
            .post(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| SupervisorError::shutdown(format!("POST {url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SupervisorError::shutdown(format!(
                "POST {url} returned HTTP {status}"
            )));
        }
        if status != StatusCode::ACCEPTED {
            debug!("Shutdown acknowledged with HTTP {status} instead of 202");
        }

        // A missing or malformed body still counts as an acknowledgement
        let body = resp.text().await.unwrap_or_default();
        Ok(ShutdownTimeout::from_body(&body))
    }
}
