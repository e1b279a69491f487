//! The `poller` module turns periodic upstream fetches into hub broadcasts,
//! suppressing the ones that carry no meaningful change.

pub mod change;
pub mod engine;

pub use change::has_changed;
pub use engine::{PollOutcome, Poller};
