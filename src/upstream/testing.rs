//! In-memory [`NowPlayingSource`] used by the poller and server tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::state::{Track, UpstreamState};
use crate::upstream::NowPlayingSource;
use crate::utils::error::UpstreamError;

/// Answers fetches from a script, then keeps repeating `fallback`.
#[derive(Debug)]
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Result<UpstreamState, UpstreamError>>>,
    fallback: Mutex<UpstreamState>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn new(script: Vec<Result<UpstreamState, UpstreamError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Mutex::new(UpstreamState::idle()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `state`.
    pub(crate) fn constant(state: UpstreamState) -> Self {
        let source = Self::new(Vec::new());
        source.set_fallback(state);
        source
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn set_fallback(&self, state: UpstreamState) {
        *self.fallback.lock().unwrap() = state;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NowPlayingSource for ScriptedSource {
    async fn fetch(&self) -> Result<UpstreamState, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }
}

pub(crate) fn playing(id: &str, progress_ms: i64) -> UpstreamState {
    UpstreamState {
        is_playing: true,
        progress_ms,
        timestamp: 1_725_000_000_000 + progress_ms,
        item: Some(Track {
            id: id.to_string(),
            name: format!("Track {id}"),
            duration_ms: 200_000,
            ..Default::default()
        }),
    }
}

pub(crate) fn paused(id: &str) -> UpstreamState {
    UpstreamState {
        is_playing: false,
        ..playing(id, 0)
    }
}
