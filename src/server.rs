//! Process-level wiring: one listener, one hub, one poller.
//!
//! Shutdown runs in a fixed order:
//! 1. stop accepting connections
//! 2. stop the poller, so nothing new is broadcast
//! 3. stop the hub, which closes every subscriber queue
//! 4. wait for connections to drain, bounded by the grace period

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::hub::Hub;
use crate::poller::Poller;
use crate::transport::{ConnectionContext, start_websocket_server};
use crate::upstream::NowPlayingSource;
use crate::utils::error::ServerError;

#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    settings: Settings,
    tracker: TaskTracker,
}

impl Server {
    /// Binds the listen address. Nothing is served until [`Server::run`].
    pub async fn bind(settings: Settings) -> Result<Self, ServerError> {
        let addr = settings.server.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self {
            listener,
            settings,
            tracker: TaskTracker::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Tasks spawned on this tracker are drained, within the grace period,
    /// before [`Server::run`] returns. Every upgraded connection runs here.
    pub fn tracker(&self) -> TaskTracker {
        self.tracker.clone()
    }

    /// Serves until `shutdown` is cancelled, then drains.
    pub async fn run(
        self,
        source: Arc<dyn NowPlayingSource>,
        shutdown: CancellationToken,
    ) -> Result<(), ServerError> {
        let Server {
            listener,
            settings,
            tracker,
        } = self;
        let addr = listener.local_addr()?;

        let (hub, handle) = Hub::new();
        let hub_token = CancellationToken::new();
        let hub_task = tokio::spawn(hub.run(hub_token.clone()));

        let poller_token = CancellationToken::new();
        let poller = Poller::new(source, handle.clone(), settings.poller.clone());
        let poller_task = tokio::spawn(poller.run(poller_token.clone()));

        let ctx = ConnectionContext::new(
            handle.clone(),
            settings.server.allowed_origins.clone(),
            settings.connection.clone(),
            tracker.clone(),
        );

        info!(
            %addr,
            realtime = settings.poller.realtime,
            allowed_origins = settings.server.allowed_origins.len(),
            "server listening"
        );
        if let Err(e) = start_websocket_server(listener, ctx, shutdown).await {
            error!(error = %e, "listener failed");
        }

        info!("shutting down");
        poller_token.cancel();
        if let Err(e) = poller_task.await {
            warn!(error = %e, "poller task failed");
        }

        let open = handle.subscriber_count().await.unwrap_or(0);
        hub_token.cancel();
        if let Err(e) = hub_task.await {
            warn!(error = %e, "hub task failed");
        }

        tracker.close();
        let grace = settings.shutdown.grace();
        if time::timeout(grace, tracker.wait()).await.is_err() {
            warn!(
                remaining = tracker.len(),
                grace_secs = settings.shutdown.grace_secs,
                "grace period elapsed with connections still open"
            );
        } else {
            info!(closed = open, "all connections closed");
        }

        Ok(())
    }
}
