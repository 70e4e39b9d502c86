use crate::models::TrackSelection;

pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";
pub const DEFAULT_SCOPES: &[&str] = &[
    "user-read-email",
    "user-library-read",
    "user-read-recently-played",
    "user-top-read",
    "playlist-read-private",
    "playlist-read-collaborative",
    "playlist-modify-public",
];
pub const DEFAULT_ALBUM_ID: &str = "4aawyAB9vmqN3uQ7FjRGTy";
pub const DEFAULT_TIME_RANGE: &str = "short_term";
pub const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Source {
    Album,
    Top,
}

impl Source {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "album" => Some(Source::Album),
            "top" | "top-tracks" | "top_tracks" => Some(Source::Top),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub spotify_client_id: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub album_id: String,
    pub source: Source,
    pub time_range: String,
    pub limit: u32,
    /// Pre-acquired bearer token; skips the browser redirect when set.
    pub access_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spotify_client_id: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            album_id: DEFAULT_ALBUM_ID.to_string(),
            source: Source::Album,
            time_range: DEFAULT_TIME_RANGE.to_string(),
            limit: DEFAULT_LIMIT,
            access_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let spotify_client_id = non_empty_var("SPOTIFY_CLIENT_ID");
        let redirect_uri = non_empty_var("SPOTIFY_REDIRECT_URI").unwrap_or(defaults.redirect_uri);
        let scopes = non_empty_var("SPOTIFY_SCOPES")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or(defaults.scopes);
        let album_id = non_empty_var("SPOTIFY_ALBUM_ID").unwrap_or(defaults.album_id);
        let source = non_empty_var("TRACKLIST_SOURCE")
            .and_then(|s| Source::parse(&s))
            .unwrap_or(defaults.source);

        Self {
            spotify_client_id,
            redirect_uri,
            scopes,
            album_id,
            source,
            ..defaults
        }
    }

    pub fn has_spotify_credentials(&self) -> bool {
        self.spotify_client_id.is_some()
    }

    pub fn selection(&self) -> TrackSelection {
        match self.source {
            Source::Album => TrackSelection::Album {
                album_id: self.album_id.clone(),
            },
            Source::Top => TrackSelection::TopTracks {
                time_range: self.time_range.clone(),
                limit: self.limit,
            },
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
