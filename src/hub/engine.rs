//! Hub engine
//!
//! The hub is the single owner of:
//! - the set of registered subscribers
//! - the last broadcast payload, replayed to every late joiner
//!
//! Concurrency and usage notes:
//! - All mutation happens inside [`Hub::run`]. Other tasks talk to the hub
//!   through a cloneable [`HubHandle`] that only enqueues commands, so there is
//!   no lock around membership and no ordering between "register" and
//!   "broadcast in flight" to reason about.
//! - Fan-out never waits on a subscriber. A full queue marks the subscriber as
//!   unresponsive and it is evicted on the spot.

use std::collections::HashMap;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use axum::extract::ws::Message as WsMessage;

use crate::hub::subscriber::{Subscriber, SubscriberId};

#[derive(Debug)]
pub(crate) enum HubCommand {
    Register(Subscriber),
    Unregister(SubscriberId),
    Broadcast(WsMessage),
    Count(oneshot::Sender<usize>),
}

#[derive(Debug)]
pub struct Hub {
    subscribers: HashMap<SubscriberId, Subscriber>,
    last_payload: Option<WsMessage>,
    commands: UnboundedReceiver<HubCommand>,
}

impl Hub {
    /// Creates a hub and the handle used to drive it. The hub does nothing
    /// until [`Hub::run`] is polled.
    pub fn new() -> (Self, HubHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let hub = Self {
            subscribers: HashMap::new(),
            last_payload: None,
            commands: rx,
        };
        (hub, HubHandle { tx })
    }

    /// Runs the control loop until `shutdown` is cancelled.
    ///
    /// On shutdown every subscriber queue is closed and the hub is consumed;
    /// it cannot be restarted.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("hub started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    // every handle dropped, nothing can reach us anymore
                    None => break,
                },
            }
        }

        self.close_all();
        info!("hub stopped");
    }

    fn handle(&mut self, cmd: HubCommand) {
        match cmd {
            HubCommand::Register(subscriber) => self.register(subscriber),
            HubCommand::Unregister(id) => self.unregister(&id),
            HubCommand::Broadcast(payload) => self.broadcast(payload),
            HubCommand::Count(reply) => {
                let _ = reply.send(self.subscribers.len());
            }
        }
    }

    fn register(&mut self, subscriber: Subscriber) {
        if let Some(payload) = &self.last_payload {
            // a fresh queue can only refuse if the connection is already gone
            if let Err(e) = subscriber.try_send(payload.clone()) {
                debug!(subscriber = %subscriber.id, error = %e, "late joiner dropped before registration");
                return;
            }
        }

        debug!(subscriber = %subscriber.id, total = self.subscribers.len() + 1, "subscriber registered");
        self.subscribers.insert(subscriber.id.clone(), subscriber);
    }

    fn unregister(&mut self, id: &SubscriberId) {
        // dropping the subscriber closes its queue
        if self.subscribers.remove(id).is_some() {
            debug!(subscriber = %id, total = self.subscribers.len(), "subscriber unregistered");
        }
    }

    fn broadcast(&mut self, payload: WsMessage) {
        let mut evicted = Vec::new();

        for (id, subscriber) in &self.subscribers {
            match subscriber.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = %id, "subscriber queue full, evicting");
                    evicted.push(id.clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(subscriber = %id, "subscriber queue closed, evicting");
                    evicted.push(id.clone());
                }
            }
        }

        for id in evicted {
            self.unregister(&id);
        }

        self.last_payload = Some(payload);
    }

    fn close_all(&mut self) {
        self.commands.close();
        let open = self.subscribers.len();
        self.subscribers.clear();
        if open > 0 {
            info!(subscribers = open, "closed subscriber queues");
        }
    }
}

/// Cloneable front door to a running [`Hub`].
///
/// Every method only enqueues a command and returns immediately. Once the hub
/// has stopped, commands are dropped; a subscriber registered after that is
/// dropped with them, which closes its queue.
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub fn register(&self, subscriber: Subscriber) {
        if self.tx.send(HubCommand::Register(subscriber)).is_err() {
            debug!("hub stopped, registration dropped");
        }
    }

    /// Idempotent: unknown ids are ignored.
    pub fn unregister(&self, id: &SubscriberId) {
        let _ = self.tx.send(HubCommand::Unregister(id.clone()));
    }

    /// Caches `payload` as the last known state and fans it out.
    pub fn broadcast(&self, payload: WsMessage) {
        if self.tx.send(HubCommand::Broadcast(payload)).is_err() {
            debug!("hub stopped, broadcast dropped");
        }
    }

    /// Current number of registered subscribers, or `None` if the hub has
    /// stopped.
    pub async fn subscriber_count(&self) -> Option<usize> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(HubCommand::Count(reply)).ok()?;
        rx.await.ok()
    }

    /// A handle wired to a bare receiver instead of a running hub, so tests
    /// can observe exactly which commands were issued.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, UnboundedReceiver<HubCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}
