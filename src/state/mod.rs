//! The `state` module holds the upstream playback record and the projection
//! that is sent to subscribers.

pub mod model;
pub mod projection;

pub use model::{Album, Artist, Image, Track, UpstreamState};
pub use projection::PlaybackState;
