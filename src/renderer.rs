//! Client for the PDF rendering service.
//!
//! The service is a separate container running a headless browser. All we
//! know about it is that `POST /generate-report` with a comparison payload
//! returns the PDF bytes, and that it wants our shared secret in a header.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use tracing::debug;

pub const INTERNAL_AUTH_HEADER: &str = "X-Internal-Auth-Token";

/// Where and how to reach the rendering service.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RendererTarget {
    pub base_url: String,

    /// Service-to-service secret. Never the caller's own token.
    pub token: String,
}

impl RendererTarget {
    pub fn generate_url(&self) -> String {
        format!("{}/generate-report", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Send `payload` (raw JSON) for rendering and return the PDF.
    async fn render(&self, target: &RendererTarget, payload: &[u8]) -> Result<Vec<u8>>;
}

#[derive(Clone, Debug)]
pub struct HttpReportRenderer {
    http: reqwest::Client,
}

impl HttpReportRenderer {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for the report service")?;
        Ok(HttpReportRenderer { http })
    }
}

#[async_trait]
impl ReportRenderer for HttpReportRenderer {
    async fn render(&self, target: &RendererTarget, payload: &[u8]) -> Result<Vec<u8>> {
        let url = target.generate_url();
        debug!("POST {} ({} bytes)", url, payload.len());

        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(INTERNAL_AUTH_HEADER, &target.token)
            .body(payload.to_vec())
            .send()
            .await
            .with_context(|| format!("request to report service at {url} failed"))?;

        let status = resp.status();

        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
            bail!("Report service responded with {}: {}", status, text);
        }

        let pdf = resp
            .bytes()
            .await
            .context("failed to read report service response body")?;
        Ok(pdf.to_vec())
    }
}
