//! The `upstream` module is where playback state comes from.
//!
//! The poller only knows about the [`NowPlayingSource`] capability. The
//! production implementation is [`SpotifyClient`], which renews its own
//! credentials, so callers never special-case expired tokens.

pub mod spotify;

use async_trait::async_trait;

use crate::state::UpstreamState;
use crate::utils::error::UpstreamError;

pub use spotify::{SpotifyClient, SpotifyCredentials};

#[async_trait]
pub trait NowPlayingSource: Send + Sync {
    /// Fetches the current playback record. Errors are opaque to the caller.
    async fn fetch(&self) -> Result<UpstreamState, UpstreamError>;
}

#[cfg(test)]
pub(crate) mod testing;
