use serde::{Deserialize, Serialize};

pub const DEFAULT_VOLUME: u8 = 70;

/// A playable catalog item. Field names follow the catalog's JSON so that
/// persisted favorites/history round-trip with search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    #[serde(rename = "trackId")]
    pub id: u64,
    #[serde(rename = "trackName", default)]
    pub title: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(rename = "artworkUrl100", default)]
    pub artwork_url: String,
    #[serde(default)]
    pub preview_url: String,
    #[serde(rename = "trackTimeMillis", default)]
    pub duration_ms: u64,
    #[serde(rename = "collectionName", default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(rename = "primaryGenreName", default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
}

impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Track {}

impl Track {
    pub fn artwork_url_large(&self) -> String {
        self.artwork_url.replace("100x100", "300x300")
    }

    pub fn label(&self) -> String {
        if self.artist_name.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artist_name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewTab {
    #[default]
    Home,
    Favorites,
    History,
}

impl ViewTab {
    pub fn next(self) -> Self {
        match self {
            Self::Home => Self::Favorites,
            Self::Favorites => Self::History,
            Self::History => Self::Home,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Home => "Home",
            Self::Favorites => "Favorites",
            Self::History => "History",
        }
    }
}

/// Snapshot of everything the player shows. Controller operations never
/// mutate a snapshot in place; they produce the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub current: Option<Track>,
    pub playing: bool,
    pub position: f64,
    /// Seconds; 0.0 until the media backend reports metadata.
    pub duration: f64,
    pub volume: u8,
    pub shuffle: bool,
    pub repeat: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::with_volume(DEFAULT_VOLUME)
    }
}

impl PlaybackState {
    pub fn with_volume(volume: u8) -> Self {
        Self {
            current: None,
            playing: false,
            position: 0.0,
            duration: 0.0,
            volume: volume.min(100),
            shuffle: false,
            repeat: false,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_current(&self, track: &Track) -> bool {
        self.current.as_ref().is_some_and(|current| current == track)
    }

    pub fn duration_known(&self) -> bool {
        self.duration > 0.0
    }

    pub fn progress_ratio(&self) -> Option<f64> {
        self.duration_known()
            .then(|| (self.position / self.duration).clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_catalog_record_and_ignores_unknown_fields() {
        let raw = r#"{
            "wrapperType": "track",
            "trackId": 42,
            "trackName": "Song",
            "artistName": "Band",
            "artworkUrl100": "https://img.example/100x100bb.jpg",
            "previewUrl": "https://audio.example/p.m4a",
            "trackTimeMillis": 215000,
            "collectionName": "Album"
        }"#;
        let track: Track = serde_json::from_str(raw).expect("parse");
        assert_eq!(track.id, 42);
        assert_eq!(track.duration_ms, 215_000);
        assert_eq!(track.album.as_deref(), Some("Album"));
        assert_eq!(track.genre, None);
        assert_eq!(
            track.artwork_url_large(),
            "https://img.example/300x300bb.jpg"
        );
    }

    #[test]
    fn equality_is_by_identifier() {
        let a: Track = serde_json::from_str(r#"{"trackId": 1, "trackName": "a"}"#).expect("a");
        let b: Track = serde_json::from_str(r#"{"trackId": 1, "trackName": "b"}"#).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn persisted_form_uses_catalog_field_names() {
        let track: Track = serde_json::from_str(r#"{"trackId": 7}"#).expect("parse");
        let json = serde_json::to_string(&track).expect("serialize");
        assert!(json.contains("\"trackId\":7"));
        assert!(json.contains("\"previewUrl\""));
        assert!(!json.contains("collectionName"));
    }
}
