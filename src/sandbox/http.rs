//! Sandbox adapter for a JSON-over-HTTP desktop service.
//!
//! Routes (relative to `api_base`):
//!   POST   /sandboxes                 → `{ "sandbox_id": "..." }`
//!   POST   /sandboxes/{id}/input      ← `DesktopCommand`
//!   GET    /sandboxes/{id}/screenshot → PNG bytes
//!   POST   /sandboxes/{id}/commands   ← `{ "cmd": "..." }` → `CommandOutput`
//!   DELETE /sandboxes/{id}
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::perception::types::ScreenSize;
use crate::sandbox::{CommandOutput, Desktop, DesktopCommand, SandboxProvider, SandboxSpec};

/// Per-request ceiling for input and screenshot calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpSandboxProvider {
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpSandboxProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }
}

#[derive(Deserialize)]
struct ProvisionResponse {
    sandbox_id: String,
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn provision(&self, spec: &SandboxSpec) -> DeskBenchResult<Box<dyn Desktop>> {
        let body = serde_json::json!({
            "template": spec.template,
            "resolution": [spec.resolution.width, spec.resolution.height],
            "dpi": spec.dpi,
            "timeout_secs": spec.timeout.as_secs(),
        });
        tracing::debug!(template = %spec.template, "requesting sandbox");

        let response = self
            .client
            .post(format!("{}/sandboxes", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeskBenchError::Provisioning(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(DeskBenchError::Provisioning(format!("{}: {}", status, err_body)));
        }

        let created: ProvisionResponse = response
            .json()
            .await
            .map_err(|e| DeskBenchError::Provisioning(format!("bad provision response: {e}")))?;

        tracing::info!(sandbox = %created.sandbox_id, "sandbox provisioned");
        Ok(Box::new(HttpDesktop {
            id: created.sandbox_id.clone(),
            base: format!("{}/sandboxes/{}", self.api_base, created.sandbox_id),
            api_key: self.api_key.clone(),
            size: spec.resolution,
            client: self.client.clone(),
        }))
    }
}

pub struct HttpDesktop {
    id: String,
    base: String,
    api_key: String,
    size: ScreenSize,
    client: reqwest::Client,
}

impl HttpDesktop {
    async fn check(response: reqwest::Response) -> DeskBenchResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let err_body = response.text().await.unwrap_or_default();
        Err(DeskBenchError::Sandbox(format!("{}: {}", status, err_body)))
    }
}

#[async_trait]
impl Desktop for HttpDesktop {
    fn id(&self) -> &str {
        &self.id
    }

    fn screen_size(&self) -> ScreenSize {
        self.size
    }

    async fn perform(&self, command: &DesktopCommand) -> DeskBenchResult<()> {
        let response = self
            .client
            .post(format!("{}/input", self.base))
            .bearer_auth(&self.api_key)
            .json(command)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn screenshot(&self) -> DeskBenchResult<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}/screenshot", self.base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| DeskBenchError::CaptureFailure(e.to_string()))?;
        let response = Self::check(response)
            .await
            .map_err(|e| DeskBenchError::CaptureFailure(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DeskBenchError::CaptureFailure(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn run_command(&self, command: &str) -> DeskBenchResult<CommandOutput> {
        let response = self
            .client
            .post(format!("{}/commands", self.base))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "cmd": command }))
            .send()
            .await?;
        let output: CommandOutput = Self::check(response).await?.json().await?;
        Ok(output)
    }

    async fn kill(&self) -> DeskBenchResult<()> {
        let response = self
            .client
            .delete(&self.base)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
