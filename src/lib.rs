//! # spotify-ws
//!
//! `spotify-ws` relays a Spotify user's "currently playing" state to any
//! number of WebSocket subscribers. It polls the Spotify Web API on a fixed
//! cadence and only pushes an update when something meaningful changed; late
//! joiners immediately receive the last known state.
//!
//! ## Core Modules
//!
//! - `hub`: Owns the subscriber set and the cached last payload, and fans
//!   payloads out without ever waiting on a slow subscriber.
//! - `poller`: Fetches upstream state on an interval and decides what counts as a change.
//! - `state`: The upstream playback record and the projection sent to subscribers.
//! - `upstream`: The `NowPlayingSource` seam and the Spotify client behind it.
//! - `transport`: The listener, plain HTTP routes and the per-connection lifecycle.
//! - `server`: Wires everything together and runs the ordered shutdown.
//! - `config`: Layered configuration from files and environment.
//! - `utils`: Errors, logging and signal handling.

pub mod config;
pub mod hub;
pub mod poller;
pub mod server;
pub mod state;
pub mod transport;
pub mod upstream;
pub mod utils;
