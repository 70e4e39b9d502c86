use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub album: String,
    pub artist: String, // first credited artist
    pub track_number: u32,
    pub duration_ms: u64,
    pub image_url: Option<String>, // largest album image
    pub external_url: Option<String>,
    pub preview_url: Option<String>, // 30s mp3, often missing
}

impl Track {
    pub fn duration(&self) -> String {
        millis_to_minutes_and_seconds(self.duration_ms)
    }

    pub fn has_preview(&self) -> bool {
        self.preview_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// Which list of tracks to fetch once we hold a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSelection {
    TopTracks { time_range: String, limit: u32 },
    Album { album_id: String },
}

impl fmt::Display for TrackSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSelection::TopTracks { time_range, .. } => write!(f, "Top tracks ({time_range})"),
            TrackSelection::Album { album_id } => write!(f, "Album {album_id}"),
        }
    }
}

/// Bearer credential from the implicit grant. Lives in memory only.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
}

impl AccessToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_in: None,
        }
    }

    pub fn secret(&self) -> &str {
        &self.access_token
    }

    /// Remaining lifetime as reported at sign-in, for the title bar.
    pub fn lifetime_label(&self) -> Option<String> {
        match self.expires_in? {
            secs if secs >= 60 => Some(format!("token valid for {} min", secs / 60)),
            secs => Some(format!("token valid for {secs}s")),
        }
    }
}

// Never print the credential itself.
impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Format a track length in milliseconds as `m:ss`.
///
/// Seconds are rounded to the nearest whole second, so a remainder of
/// 59.5s or more rolls over into the next minute.
pub fn millis_to_minutes_and_seconds(millis: u64) -> String {
    let minutes = millis / 60_000;
    let seconds = ((millis % 60_000) as f64 / 1000.0).round() as u64;

    if seconds == 60 {
        format!("{}:00", minutes + 1)
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

/// Format a total duration in seconds as MM:SS or H:MM:SS
pub fn format_total_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Summed play time of a list, in whole seconds.
pub fn total_seconds(tracks: &[Track]) -> u64 {
    tracks.iter().map(|t| t.duration_ms).sum::<u64>() / 1000
}

#[cfg(test)]
pub(crate) fn sample_track(n: u32, duration_ms: u64) -> Track {
    Track {
        id: format!("id{n}"),
        name: format!("Song {n}"),
        album: "Test Album".to_string(),
        artist: "Test Artist".to_string(),
        track_number: n,
        duration_ms,
        image_url: None,
        external_url: Some(format!("https://open.spotify.com/track/id{n}")),
        preview_url: None,
    }
}
