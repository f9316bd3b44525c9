//! Status command implementation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Health response from the server.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    uptime_seconds: u64,
    sync_loop_running: bool,
    components: Vec<ComponentReport>,
    index: IndexSizes,
    backlog: Backlog,
    hot_zones: usize,
    #[serde(default)]
    hot_zone_refresh_failures: u64,
}

#[derive(Debug, Deserialize)]
struct ComponentReport {
    component: String,
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexSizes {
    hot: usize,
    standard: usize,
}

#[derive(Debug, Deserialize)]
struct Backlog {
    unprocessed: u64,
    oldest_age_seconds: u64,
}

/// Show status and health.
pub async fn run(url: &str, metrics_port: u16) -> Result<()> {
    let base = url.trim_end_matches('/');
    println!("Checking health at {}...\n", base);

    let health_url = format!("{}/health", base);
    let client = reqwest::Client::new();

    match client.get(&health_url).send().await {
        Ok(response) => {
            let status_code = response.status();
            match response.json::<HealthResponse>().await {
                Ok(health) => print_health_status(&health, status_code.as_u16()),
                Err(e) => {
                    println!("Failed to parse health response: {}", e);
                    println!("HTTP Status: {}", status_code);
                }
            }
        }
        Err(e) => {
            println!("Failed to connect to health endpoint: {}", e);
            println!("\nIs the nearby service running?");
            println!("Start it with: nearby serve --config <path-to-config>");
            return Ok(());
        }
    }

    let mut metrics_url = reqwest::Url::parse(base).context("Invalid server URL")?;
    if metrics_url.set_port(Some(metrics_port)).is_err() {
        anyhow::bail!("Cannot set metrics port on {}", base);
    }
    metrics_url.set_path("/metrics");

    println!("\n--- Metrics ---");
    println!("Fetching from {}...\n", metrics_url);

    match client.get(metrics_url).send().await {
        Ok(response) => {
            let text = response.text().await.context("Failed to read metrics")?;
            print_metrics(&text);
        }
        Err(e) => {
            println!("Failed to fetch metrics: {}", e);
        }
    }

    Ok(())
}

fn status_tag(status: &str) -> &'static str {
    match status {
        "healthy" => "[OK]",
        "degraded" => "[WARN]",
        "unhealthy" => "[FAIL]",
        _ => "[?]",
    }
}

fn print_health_status(health: &HealthResponse, status_code: u16) {
    println!(
        "{} Overall Status: {} (HTTP {})",
        status_tag(&health.status),
        health.status.to_uppercase(),
        status_code
    );
    println!("Uptime:            {}s", health.uptime_seconds);
    println!(
        "Sync loop:         {}",
        if health.sync_loop_running { "running" } else { "stopped" }
    );
    println!(
        "Index entries:     {} hot, {} standard",
        health.index.hot, health.index.standard
    );
    println!(
        "Backlog:           {} events (oldest {}s)",
        health.backlog.unprocessed, health.backlog.oldest_age_seconds
    );
    println!(
        "Hot zones:         {} ({} failed refreshes)",
        health.hot_zones, health.hot_zone_refresh_failures
    );
    println!();

    if !health.components.is_empty() {
        println!("Components:");
        for report in &health.components {
            let tag = status_tag(&report.status);
            if let Some(reason) = &report.reason {
                println!("  {} {}: {} ({})", tag, report.component, report.status, reason);
            } else {
                println!("  {} {}: {}", tag, report.component, report.status);
            }
        }
    }
}

/// Parse `name value` sample lines, skipping comments and labelled series.
fn parse_samples(metrics_text: &str) -> HashMap<&str, f64> {
    let mut values = HashMap::new();
    for line in metrics_text.lines() {
        if line.starts_with('#') || line.is_empty() {
            continue;
        }

        let mut parts = line.split_whitespace();
        if let (Some(name), Some(value)) = (parts.next(), parts.next()) {
            if let Ok(value) = value.parse::<f64>() {
                values.insert(name, value);
            }
        }
    }
    values
}

fn print_metrics(metrics_text: &str) {
    let values = parse_samples(metrics_text);

    let searches = values.get("nearby_search_latency_seconds_count");
    if let Some(v) = searches {
        println!("Searches:          {}", format_number(*v as u64));
    }
    if let (Some(count), Some(sum)) = (searches, values.get("nearby_search_latency_seconds_sum")) {
        if *count > 0.0 {
            println!("Mean latency:      {:.2}ms", sum / count * 1000.0);
        }
    }
    let hits = values.get("nearby_geo_cache_hits_total").copied().unwrap_or(0.0);
    let misses = values.get("nearby_geo_cache_misses_total").copied().unwrap_or(0.0);
    if hits + misses > 0.0 {
        println!("Geo cache hit rate: {:.1}%", hits / (hits + misses) * 100.0);
    }
    if let Some(v) = values.get("nearby_index_sync_processed_events_total") {
        println!("Events synced:     {}", format_number(*v as u64));
    }
    if let Some(v) = values.get("nearby_index_sync_failures_total") {
        println!("Sync failures:     {}", v);
    }

    if values.is_empty() {
        println!("No metrics available yet.");
    }
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}
