use std::time::Duration;

use serde::Deserialize;

use crate::upstream::spotify::{DEFAULT_API_URL, DEFAULT_TOKEN_URL};

/// Top-level configuration settings for the application.
///
/// Loaded once at startup and never mutated afterwards.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub poller: PollerSettings,
    pub connection: ConnectionSettings,
    pub shutdown: ShutdownSettings,
    pub spotify: SpotifySettings,
    pub log_level: String,
}

/// Listen address and origin policy.
///
/// An empty `allowed_origins` list accepts every origin.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream polling cadence.
///
/// In `realtime` mode progress fields are published and every tick with a
/// playing track counts as a change.
#[derive(Debug, Deserialize, Clone)]
pub struct PollerSettings {
    pub interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub realtime: bool,
}

impl PollerSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Per-connection limits.
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionSettings {
    pub queue_capacity: usize,
    pub read_idle_ms: u64,
    pub write_timeout_ms: u64,
}

impl ConnectionSettings {
    pub fn read_idle(&self) -> Duration {
        Duration::from_millis(self.read_idle_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ShutdownSettings {
    pub grace_secs: u64,
}

impl ShutdownSettings {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpotifySettings {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub token_url: String,
    pub api_url: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub poller: Option<PartialPollerSettings>,
    pub connection: Option<PartialConnectionSettings>,
    pub shutdown: Option<PartialShutdownSettings>,
    pub spotify: Option<PartialSpotifySettings>,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPollerSettings {
    pub interval_ms: Option<u64>,
    pub fetch_timeout_ms: Option<u64>,
    pub realtime: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialConnectionSettings {
    pub queue_capacity: Option<usize>,
    pub read_idle_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialShutdownSettings {
    pub grace_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialSpotifySettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub token_url: Option<String>,
    pub api_url: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let poller = self.poller.unwrap_or_default();
        let connection = self.connection.unwrap_or_default();
        let shutdown = self.shutdown.unwrap_or_default();
        let spotify = self.spotify.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                allowed_origins: server
                    .allowed_origins
                    .unwrap_or(default.server.allowed_origins),
            },
            poller: PollerSettings {
                interval_ms: poller.interval_ms.unwrap_or(default.poller.interval_ms),
                fetch_timeout_ms: poller
                    .fetch_timeout_ms
                    .unwrap_or(default.poller.fetch_timeout_ms),
                realtime: poller.realtime.unwrap_or(default.poller.realtime),
            },
            connection: ConnectionSettings {
                queue_capacity: connection
                    .queue_capacity
                    .unwrap_or(default.connection.queue_capacity),
                read_idle_ms: connection
                    .read_idle_ms
                    .unwrap_or(default.connection.read_idle_ms),
                write_timeout_ms: connection
                    .write_timeout_ms
                    .unwrap_or(default.connection.write_timeout_ms),
            },
            shutdown: ShutdownSettings {
                grace_secs: shutdown.grace_secs.unwrap_or(default.shutdown.grace_secs),
            },
            spotify: SpotifySettings {
                client_id: spotify.client_id.unwrap_or(default.spotify.client_id),
                client_secret: spotify
                    .client_secret
                    .unwrap_or(default.spotify.client_secret),
                refresh_token: spotify
                    .refresh_token
                    .unwrap_or(default.spotify.refresh_token),
                token_url: spotify.token_url.unwrap_or(default.spotify.token_url),
                api_url: spotify.api_url.unwrap_or(default.spotify.api_url),
            },
            log_level: self.log_level.unwrap_or(default.log_level),
        }
    }
}

/// Provides default values for `Settings`.
///
/// Spotify credentials have no default; `load_config` rejects them when empty.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 3000,
                allowed_origins: Vec::new(),
            },
            poller: PollerSettings {
                interval_ms: 3000,
                fetch_timeout_ms: 10_000,
                realtime: false,
            },
            connection: ConnectionSettings {
                queue_capacity: 256,
                read_idle_ms: 60_000,
                write_timeout_ms: 10_000,
            },
            shutdown: ShutdownSettings { grace_secs: 10 },
            spotify: SpotifySettings {
                client_id: String::new(),
                client_secret: String::new(),
                refresh_token: String::new(),
                token_url: DEFAULT_TOKEN_URL.to_string(),
                api_url: DEFAULT_API_URL.to_string(),
            },
            log_level: "info".to_string(),
        }
    }
}
