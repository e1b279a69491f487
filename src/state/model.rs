use serde::{Deserialize, Deserializer, Serialize};

/// Snapshot of the upstream "currently playing" record.
///
/// Produced by an upstream source and owned by the poller until it is
/// published. The shape mirrors the Spotify Web API object so a response body
/// deserializes straight into it. `progress_ms` and `item.id` may be `null`
/// upstream, those decode to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpstreamState {
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress_ms: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(default)]
    pub item: Option<Track>,
}

impl UpstreamState {
    /// The state reported when nothing is playing at all.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Identity key used for change detection.
    pub fn track_id(&self) -> Option<&str> {
        self.item.as_ref().map(|t| t.id.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album: Album,
}

impl Track {
    pub fn artist_names(&self) -> Vec<&str> {
        self.artists.iter().map(|a| a.name.as_str()).collect()
    }

    /// First (largest) album image, if any.
    pub fn artwork_url(&self) -> Option<&str> {
        self.album.images.first().map(|i| i.url.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub url: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
