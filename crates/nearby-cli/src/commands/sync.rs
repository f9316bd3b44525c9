//! Sync command implementation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct SyncResponse {
    processed: usize,
    remaining: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(default)]
    request_id: String,
}

/// Trigger one index-sync batch on a running server.
pub async fn run(url: &str, max_events: Option<usize>) -> Result<()> {
    let mut sync_url = format!("{}/v1/admin/index-sync", url.trim_end_matches('/'));
    if let Some(max_events) = max_events {
        sync_url = format!("{}?max_events={}", sync_url, max_events);
    }

    let response = reqwest::Client::new()
        .post(&sync_url)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", sync_url))?;

    let status = response.status();
    if !status.is_success() {
        match response.json::<ErrorResponse>().await {
            Ok(error) => bail!(
                "index sync failed ({}): {} {} [request {}]",
                status,
                error.code,
                error.message,
                error.request_id
            ),
            Err(_) => bail!("index sync failed with HTTP {}", status),
        }
    }

    let result: SyncResponse = response
        .json()
        .await
        .context("Failed to parse sync response")?;
    println!(
        "Processed {} change events, {} remaining",
        result.processed, result.remaining
    );
    Ok(())
}
