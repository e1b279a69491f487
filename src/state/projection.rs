use serde::Serialize;
use axum::extract::ws::Message as WsMessage;

use super::model::{Track, UpstreamState};

/// Subscriber-facing view of an [`UpstreamState`].
///
/// `is_playing` and `item` are always present. `progress_ms` and `timestamp`
/// are only serialized in realtime mode.
///
/// # Example
///
/// ```rust
/// use spotify_ws::state::{PlaybackState, UpstreamState};
///
/// let upstream = UpstreamState { is_playing: true, progress_ms: 1200, ..Default::default() };
/// let json = PlaybackState::new(&upstream, false).to_json().unwrap();
/// assert_eq!(json, r#"{"is_playing":true,"item":null}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState<'a> {
    pub is_playing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub item: Option<&'a Track>,
}

impl<'a> PlaybackState<'a> {
    pub fn new(state: &'a UpstreamState, realtime: bool) -> Self {
        Self {
            is_playing: state.is_playing,
            progress_ms: realtime.then_some(state.progress_ms),
            timestamp: realtime.then_some(state.timestamp),
            item: state.item.as_ref(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the projection into the text frame handed to the hub.
    pub fn to_message(&self) -> Result<WsMessage, serde_json::Error> {
        self.to_json().map(WsMessage::text)
    }
}
