use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use spotify_ws::config::load_config;
use spotify_ws::server::Server;
use spotify_ws::upstream::{SpotifyClient, SpotifyCredentials};
use spotify_ws::utils::logging;
use spotify_ws::utils::signal::wait_for_shutdown_signal;

/// Relays Spotify "currently playing" updates to WebSocket clients.
#[derive(Debug, Parser)]
#[command(name = "spotify-ws", version)]
struct Cli {
    /// Configuration file; defaults to `config/default.*` when present.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init(&settings.log_level);
    if dotenv.is_err() {
        debug!("no .env file found, using environment variables");
    }

    let spotify = &settings.spotify;
    let client = SpotifyClient::with_endpoints(
        SpotifyCredentials {
            client_id: spotify.client_id.clone(),
            client_secret: spotify.client_secret.clone(),
            refresh_token: spotify.refresh_token.clone(),
        },
        settings.poller.fetch_timeout(),
        spotify.token_url.clone(),
        spotify.api_url.clone(),
    )
    .context("failed to build spotify client")?;

    let server = Server::bind(settings.clone()).await?;
    info!(
        port = settings.server.port,
        realtime = settings.poller.realtime,
        "starting spotify-ws"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => signal_token.cancel(),
            Err(e) => error!(error = %e, "failed to listen for shutdown signals"),
        }
    });

    server.run(Arc::new(client), shutdown).await?;
    info!("server shut down gracefully");
    Ok(())
}
