use anyhow::{bail, Context, Result};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTPS "edge online" handshake against the platform's /edge/signup
/// endpoint.
#[derive(Clone)]
pub struct OnboardClient {
    http: reqwest::Client,
    base_url: String,
}

impl OnboardClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build onboarding HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Registers (or re-registers) this edge. A conflict means the serial is
    /// already onboarded, which counts as being online.
    pub async fn report_online(&self, edge_id: &str, version: &str) -> Result<()> {
        let url = format!("{}/edge/signup", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "serial_number": edge_id, "version": version }))
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::CONFLICT {
            tracing::info!(%status, "edge online handshake accepted");
            return Ok(());
        }
        bail!("edge online handshake rejected with status {status}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed_from_the_base_url() {
        let client = OnboardClient::new("https://api.example.com/").unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
    }

    #[tokio::test]
    async fn unreachable_server_reports_an_error() {
        let client = OnboardClient::new("http://127.0.0.1:9").unwrap();
        assert!(client
            .report_online("RED-0A1B2C3D", "1.0.0")
            .await
            .is_err());
    }
}
