use crate::state::UpstreamState;

/// Decides whether `current` is worth broadcasting after `previous`.
///
/// - nothing recorded yet: always a change
/// - realtime mode: a playing track is always a change, so progress stays fresh
/// - otherwise only a play/pause flip, a track appearing or disappearing, or a
///   different track id counts; progress drift alone never does
pub fn has_changed(previous: Option<&UpstreamState>, current: &UpstreamState, realtime: bool) -> bool {
    let Some(previous) = previous else {
        return true;
    };

    if realtime && current.is_playing && current.item.is_some() {
        return true;
    }

    previous.is_playing != current.is_playing || previous.track_id() != current.track_id()
}
