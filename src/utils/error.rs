//! The `error` module defines the error types used within `spotify-ws`.
//!
//! Errors are split by the layer that produces them:
//!
//! - [`UpstreamError`] covers everything that can go wrong while fetching the
//!   currently playing record. These are always transient from the poller's
//!   point of view: they are logged and the next tick retries.
//! - [`ServerError`] covers startup and listener failures. Only these abort
//!   the process.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single upstream fetch.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure talking to the upstream API.
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream API answered with a non-success status.
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Credentials were rejected while renewing the access token.
    #[error("upstream authorization failed: {0}")]
    Auth(String),

    /// The fetch did not complete within the poller's deadline.
    #[error("upstream fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be decoded.
    #[error("failed to decode upstream response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Returns a short stable label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            UpstreamError::Http(_) => "upstream_http",
            UpstreamError::Status { .. } => "upstream_status",
            UpstreamError::Auth(_) => "upstream_auth",
            UpstreamError::Timeout(_) => "upstream_timeout",
            UpstreamError::Decode(_) => "upstream_decode",
        }
    }
}

/// Fatal errors raised while binding or serving the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
