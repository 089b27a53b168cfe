use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

/// Builds the shared HTTP client with connect and overall timeouts.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(timeout)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Performs a single GET and returns the body of a `200 OK` response.
pub async fn fetch_text(client: &Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| anyhow!("Request error: {} URL: {}", e, url))?;

    debug!(status = %response.status(), "Received response from {}", url);

    if response.status() != StatusCode::OK {
        return Err(anyhow!("HTTP error: {} for URL: {}", response.status(), url));
    }

    response
        .text()
        .await
        .with_context(|| format!("Failed to get response text from {url}"))
}

/// Host part of `url`, or the url itself when it cannot be parsed.
pub fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}
