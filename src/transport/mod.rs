//! The `transport` module is responsible for network communication with
//! clients.
//!
//! One listen port serves both the plain HTTP endpoints (`/health`, the
//! upgrade hint on `/`) and WebSocket subscribers. Each accepted WebSocket
//! becomes a hub subscriber for as long as the connection lives.

pub mod connection;
pub mod websocket;

pub use connection::{ConnectionContext, Lifecycle, Phase, origin_allowed};
pub use websocket::{router, start_websocket_server};


#[cfg(test)]
mod websocket_tests;
