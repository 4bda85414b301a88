//! API client for the Chart Gatekeeper service

use anyhow::{Context, Result};
use reqwest::{multipart, Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// API client for the gatekeeper deploy API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Upload an archive to `/deploy`
    pub async fn deploy(&self, archive: &Path) -> Result<DeployReport> {
        let filename = archive
            .file_name()
            .and_then(|n| n.to_str())
            .context("Archive path has no usable file name")?
            .to_string();
        let bytes = tokio::fs::read(archive)
            .await
            .with_context(|| format!("Failed to read {}", archive.display()))?;

        let part = multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("application/octet-stream")?;
        let form = multipart::Form::new().part("archive", part);

        let url = self.base_url.join("deploy").context("Invalid path")?;
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }

    pub async fn undeploy(&self, release: &str) -> Result<ReleaseResponse> {
        self.post("undeploy", &ReleaseRequest { release }).await
    }

    pub async fn status(&self, release: &str) -> Result<ReleaseResponse> {
        self.post("status", &ReleaseRequest { release }).await
    }

    /// Make a POST request with JSON body
    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        parse(response).await
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("API error ({}): {}", status, body);
    }

    response.json().await.context("Failed to parse response")
}

// API request and response types

#[derive(Debug, Serialize)]
struct ReleaseRequest<'a> {
    release: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployReport {
    pub deployments: Vec<ChartOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOutcome {
    pub chart: String,
    pub chart_path: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<ChartFeatures>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartFeatures {
    pub workload_type: String,
    pub replica_count: u32,
    pub cpu_limit: i64,
    pub memory_limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub release: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
