mod settings;

use std::env;
use std::path::Path;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    ConnectionSettings, PollerSettings, ServerSettings, Settings, ShutdownSettings,
    SpotifySettings,
};

/// Prefix for nested overrides, e.g. `SPOTIFY_WS__POLLER__INTERVAL_MS=1000`.
pub const ENV_PREFIX: &str = "SPOTIFY_WS";

/// Loads the configuration and merges it with default values.
///
/// Sources, later ones winning:
/// 1. `config/default.*` relative to the working directory (optional), or the
///    file at `path` (required) when one is given
/// 2. nested `SPOTIFY_WS__SECTION__KEY` environment variables
/// 3. the flat variables `SPOTIFY_CLIENT_ID`, `SPOTIFY_CLIENT_SECRET`,
///    `SPOTIFY_REFRESH_TOKEN`, `SERVER_PORT`, `ALLOWED_ORIGINS`, `RT` and
///    `LOG_LEVEL`
///
/// Fails when the Spotify credentials are missing or a limit is zero.
pub fn load_config(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("config/default").required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("server.allowed_origins"),
    );

    let config = flat_env_overrides(builder)?.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = partial.merge(Settings::default());

    validate(&settings)?;
    Ok(settings)
}

fn flat_env_overrides(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_override_option("spotify.client_id", env_var("SPOTIFY_CLIENT_ID"))?
        .set_override_option("spotify.client_secret", env_var("SPOTIFY_CLIENT_SECRET"))?
        .set_override_option("spotify.refresh_token", env_var("SPOTIFY_REFRESH_TOKEN"))?
        .set_override_option("server.port", env_var("SERVER_PORT"))?
        .set_override_option(
            "server.allowed_origins",
            env_var("ALLOWED_ORIGINS").map(|v| split_origins(&v)),
        )?
        .set_override_option("poller.realtime", env_var("RT").map(|v| parse_flag(&v)))?
        .set_override_option("log_level", env_var("LOG_LEVEL"))
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Splits a comma-separated origin list, dropping blanks.
pub fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lenient boolean: anything unrecognized is `false`.
pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "yes" | "on"
    )
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    let spotify = &settings.spotify;
    if spotify.client_id.is_empty()
        || spotify.client_secret.is_empty()
        || spotify.refresh_token.is_empty()
    {
        return Err(ConfigError::Message(
            "spotify credentials are not set".to_string(),
        ));
    }
    if settings.connection.queue_capacity == 0 {
        return Err(ConfigError::Message(
            "connection.queue_capacity must be greater than zero".to_string(),
        ));
    }
    if settings.poller.interval_ms == 0 {
        return Err(ConfigError::Message(
            "poller.interval_ms must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
