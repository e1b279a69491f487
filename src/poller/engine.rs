//! Poller engine
//!
//! Bridges the upstream source into the hub:
//! - one fetch immediately, then one per interval
//! - a failed or timed-out fetch is logged and skipped; the last observed
//!   state is kept and the next tick simply tries again
//! - only declared changes reach the hub, so an idle upstream costs nothing
//!   downstream

use std::sync::Arc;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::PollerSettings;
use crate::hub::HubHandle;
use crate::poller::change::has_changed;
use crate::state::{PlaybackState, UpstreamState};
use crate::upstream::NowPlayingSource;
use crate::utils::error::UpstreamError;

/// What a single tick ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Broadcast,
    Unchanged,
    Failed,
}

pub struct Poller {
    source: Arc<dyn NowPlayingSource>,
    hub: HubHandle,
    settings: PollerSettings,
    last_state: Option<UpstreamState>,
}

impl Poller {
    pub fn new(source: Arc<dyn NowPlayingSource>, hub: HubHandle, settings: PollerSettings) -> Self {
        Self {
            source,
            hub,
            settings,
            last_state: None,
        }
    }

    /// The last state that was broadcast.
    pub fn last_state(&self) -> Option<&UpstreamState> {
        self.last_state.as_ref()
    }

    /// Ticks until `shutdown` is cancelled. The first tick fires immediately.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.settings.interval_ms,
            realtime = self.settings.realtime,
            "poller started"
        );

        let mut ticker = time::interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.poll_once() => {}
                    }
                }
            }
        }

        info!("poller stopped");
    }

    /// Fetches once and broadcasts if the state changed.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let timeout = self.settings.fetch_timeout();
        let current = match time::timeout(timeout, self.source.fetch()).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                error!(error = %e, kind = e.as_label(), "failed to get currently playing track");
                return PollOutcome::Failed;
            }
            Err(_) => {
                let e = UpstreamError::Timeout(timeout);
                error!(error = %e, kind = e.as_label(), "failed to get currently playing track");
                return PollOutcome::Failed;
            }
        };

        let realtime = self.settings.realtime;
        if !has_changed(self.last_state.as_ref(), &current, realtime) {
            return PollOutcome::Unchanged;
        }

        let payload = match PlaybackState::new(&current, realtime).to_message() {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "failed to serialize playback state");
                return PollOutcome::Failed;
            }
        };

        let track = current.item.as_ref().map_or("Nothing", |t| t.name.as_str());
        if realtime {
            debug!(is_playing = current.is_playing, track, "state changed, broadcasting update");
        } else {
            info!(is_playing = current.is_playing, track, "state changed, broadcasting update");
        }

        self.last_state = Some(current);
        self.hub.broadcast(payload);
        PollOutcome::Broadcast
    }
}
