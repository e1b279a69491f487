use tokio::sync::mpsc::{self, Receiver, Sender};
use axum::extract::ws::Message as WsMessage;
use uuid::Uuid;

pub type SubscriberId = String;

/// Hub-side half of a live connection.
///
/// Holds the only sending side of the connection's bounded outbound queue.
/// Dropping a `Subscriber` closes that queue, which is how the hub tells a
/// write pump to stop.
#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    sender: Sender<WsMessage>,
}

impl Subscriber {
    /// Creates a subscriber with a fresh `subscriber-<uuid>` id and a queue
    /// of `capacity` payloads. The receiver belongs to the connection.
    pub fn channel(capacity: usize) -> (Self, Receiver<WsMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let subscriber = Self {
            id: format!("subscriber-{}", Uuid::new_v4()),
            sender,
        };
        (subscriber, receiver)
    }

    /// Non-blocking enqueue.
    pub(crate) fn try_send(
        &self,
        payload: WsMessage,
    ) -> Result<(), mpsc::error::TrySendError<WsMessage>> {
        self.sender.try_send(payload)
    }
}
