//! Per-connection lifecycle.
//!
//! A connection owns two pumps:
//! - the write pump drains the subscriber queue into the socket, bounded by
//!   the write timeout
//! - the read pump discards inbound content and only watches for liveness
//!
//! Whichever side notices the end first tears the connection down. Teardown
//! runs exactly once: it unregisters from the hub and cancels the other pump.
//! The write pump then closes the transport and marks the phase `Closed`.

use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use axum::extract::ws::Message as WsMessage;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc::Receiver;
use tokio::time;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, warn};

use crate::config::ConnectionSettings;
use crate::hub::{HubHandle, Subscriber, SubscriberId};

/// Everything a connection task needs. Shared as the router state.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub hub: HubHandle,
    pub allowed_origins: Arc<[String]>,
    pub settings: ConnectionSettings,
    /// Upgraded connections run on this tracker so shutdown can drain them.
    pub tracker: TaskTracker,
}

impl ConnectionContext {
    pub fn new(
        hub: HubHandle,
        allowed_origins: Vec<String>,
        settings: ConnectionSettings,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            hub,
            allowed_origins: allowed_origins.into(),
            settings,
            tracker,
        }
    }
}

/// An empty allow-list admits everything, including a missing `Origin`.
pub fn origin_allowed(allowed: &[String], origin: Option<&str>) -> bool {
    if allowed.is_empty() {
        return true;
    }
    origin.is_some_and(|o| allowed.iter().any(|a| a == o))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Connecting = 0,
    Registered = 1,
    Closing = 2,
    Closed = 3,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Phase::Connecting,
            1 => Phase::Registered,
            2 => Phase::Closing,
            _ => Phase::Closed,
        }
    }
}

/// Shared teardown state for the two pumps of one connection.
#[derive(Debug)]
pub struct Lifecycle {
    id: SubscriberId,
    hub: HubHandle,
    phase: AtomicU8,
    cancel: CancellationToken,
}

impl Lifecycle {
    pub fn new(id: SubscriberId, hub: HubHandle) -> Self {
        Self {
            id,
            hub,
            phase: AtomicU8::new(Phase::Connecting as u8),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Resolves once teardown has started.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Hands the subscriber to the hub. Only the first call registers.
    pub fn register(&self, subscriber: Subscriber) -> bool {
        if self
            .phase
            .compare_exchange(
                Phase::Connecting as u8,
                Phase::Registered as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }
        self.hub.register(subscriber);
        true
    }

    /// Unregisters and cancels both pumps, leaving the phase at `Closing`.
    /// Returns `true` only for the caller that actually performed the
    /// teardown.
    pub fn teardown(&self, reason: &'static str) -> bool {
        if self
            .phase
            .compare_exchange(
                Phase::Registered as u8,
                Phase::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        debug!(subscriber = %self.id, reason, "tearing down connection");
        self.hub.unregister(&self.id);
        self.cancel.cancel();
        true
    }

    /// Records that the transport has been closed. Only valid after teardown.
    pub fn mark_closed(&self) -> bool {
        self.phase
            .compare_exchange(
                Phase::Closing as u8,
                Phase::Closed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Runs an upgraded connection to completion.
///
/// Connections whose origin is not allowed are closed without ever touching
/// the hub.
pub async fn accept_subscriber<S, E>(mut socket: S, origin: Option<&str>, ctx: &ConnectionContext)
where
    S: Sink<WsMessage> + Stream<Item = Result<WsMessage, E>> + Unpin + Send + 'static,
    <S as Sink<WsMessage>>::Error: Display,
    E: Display + Send + 'static,
{
    if !origin_allowed(&ctx.allowed_origins, origin) {
        warn!(origin = origin.unwrap_or(""), "origin not allowed, rejecting connection");
        match time::timeout(ctx.settings.write_timeout(), socket.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "error closing rejected connection"),
            Err(_) => debug!("timed out closing rejected connection"),
        }
        return;
    }

    serve_subscriber(socket, ctx.hub.clone(), &ctx.settings).await;
}

/// Registers a subscriber for `socket` and pumps until either side ends.
pub async fn serve_subscriber<S, E>(socket: S, hub: HubHandle, settings: &ConnectionSettings)
where
    S: Sink<WsMessage> + Stream<Item = Result<WsMessage, E>> + Send + 'static,
    <S as Sink<WsMessage>>::Error: Display,
    E: Display + Send + 'static,
{
    let (subscriber, queue) = Subscriber::channel(settings.queue_capacity);
    let lifecycle = Arc::new(Lifecycle::new(subscriber.id.clone(), hub));
    lifecycle.register(subscriber);
    debug!(subscriber = %lifecycle.id(), "client connected");

    let (sink, stream) = socket.split();
    let writer = tokio::spawn(
        write_pump(sink, queue, lifecycle.clone(), settings.write_timeout()).in_current_span(),
    );

    read_pump(stream, lifecycle.clone(), settings.read_idle()).await;

    if let Err(e) = writer.await {
        warn!(subscriber = %lifecycle.id(), error = %e, "write pump failed");
    }
    debug!(subscriber = %lifecycle.id(), "client disconnected");
}

async fn write_pump<S>(
    mut sink: SplitSink<S, WsMessage>,
    mut queue: Receiver<WsMessage>,
    lifecycle: Arc<Lifecycle>,
    write_timeout: Duration,
) where
    S: Sink<WsMessage>,
    S::Error: Display,
{
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = lifecycle.cancelled() => break "closing",
            next = queue.recv() => next,
        };
        // the hub dropped us: evicted or shutting down
        let Some(payload) = next else {
            break "queue closed";
        };

        match time::timeout(write_timeout, sink.send(payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(subscriber = %lifecycle.id(), error = %e, "client write error");
                break "write error";
            }
            Err(_) => {
                warn!(subscriber = %lifecycle.id(), "client write timed out");
                break "write timeout";
            }
        }
    };

    lifecycle.teardown(reason);

    match time::timeout(write_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(subscriber = %lifecycle.id(), error = %e, "error closing client connection"),
        Err(_) => debug!(subscriber = %lifecycle.id(), "timed out closing client connection"),
    }
    lifecycle.mark_closed();
}

async fn read_pump<S, E>(mut stream: SplitStream<S>, lifecycle: Arc<Lifecycle>, read_idle: Duration)
where
    S: Stream<Item = Result<WsMessage, E>>,
    E: Display,
{
    let reason = loop {
        let next = tokio::select! {
            biased;
            _ = lifecycle.cancelled() => break "closing",
            next = time::timeout(read_idle, stream.next()) => next,
        };

        match next {
            Err(_) => {
                debug!(subscriber = %lifecycle.id(), "client idle, disconnecting");
                break "idle timeout";
            }
            Ok(None) | Ok(Some(Ok(WsMessage::Close(_)))) => break "peer closed",
            Ok(Some(Err(e))) => {
                debug!(subscriber = %lifecycle.id(), error = %e, "client read error");
                break "read error";
            }
            // inbound content is ignored, any frame counts as liveness
            Ok(Some(Ok(_))) => {}
        }
    };

    lifecycle.teardown(reason);
}
