//! Container health probe: exits 0 only when `/health` answers `200`.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, ensure};
use reqwest::StatusCode;

const DEFAULT_PORT: &str = "3000";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match probe().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("health check failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn probe() -> anyhow::Result<()> {
    let port = std::env::var("SERVER_PORT")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PORT.to_string());
    let url = format!("http://localhost:{}/health", port.trim());

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build http client")?;
    let response = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;

    let status = response.status();
    ensure!(
        status == StatusCode::OK,
        "received status {} from {url}",
        status.as_u16()
    );
    Ok(())
}
