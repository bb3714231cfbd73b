//! Insight Probe
//!
//! Connects to the analysis backend, submits one request and prints the
//! response envelope.
//!
//! Usage:
//!   cargo run --bin insight-probe -- '{"message": "hello"}'
//!
//! The payload defaults to `{"message": "ping"}`. Settings come from
//! `INSIGHT_CONFIG_PATH` (default `config/client_config.yaml`); a missing
//! file falls back to built-in defaults.

use anyhow::{Context, Result};
use insight_client::bin_common::{load_config_from_env, parse_args, ConfigType};
use insight_client::config::ClientSettings;
use insight_client::insight_socket::StatusEvent;
use insight_client::logging::init_tracing;
use serde_json::{json, Value};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let config_path = load_config_from_env(ConfigType::Client);
    let settings = ClientSettings::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_tracing(&settings.log_level);
    settings.log();

    let payload: Value = match parse_args().first() {
        Some(raw) => serde_json::from_str(raw).context("payload must be valid JSON")?,
        None => json!({ "message": "ping" }),
    };

    let client = settings.builder().build()?;
    let _status = client.on_status_change(|event| match event {
        StatusEvent::Connected => info!("Status: connected"),
        StatusEvent::Disconnected(reason) => warn!("Status: disconnected ({})", reason),
        StatusEvent::ConnectError(e) => warn!("Status: connect error ({})", e),
    });

    let pending = client.submit(&payload)?;
    info!("Submitted request {}", pending.id());

    let outcome = pending.await;
    client.shutdown().await?;

    let envelope = outcome?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    let metrics = client.metrics();
    info!(
        "Sent {} frame(s), {} retries, {} reconnects",
        metrics.requests_sent, metrics.retries, metrics.reconnect_count
    );

    if envelope.is_error() {
        anyhow::bail!("backend reported an error for request {}", envelope.id);
    }
    Ok(())
}
