//! The `hub` module owns "who is connected" and "what was last sent".
//!
//! - `engine`: the [`Hub`] control loop and its [`HubHandle`].
//! - `subscriber`: the hub-side view of a connection and its bounded queue.

pub mod engine;
pub mod subscriber;

pub use engine::{Hub, HubHandle};
#[cfg(test)]
pub(crate) use engine::HubCommand;
pub use subscriber::{Subscriber, SubscriberId};
