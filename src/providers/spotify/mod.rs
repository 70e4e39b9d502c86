mod api;
pub mod auth;

pub use self::api::{parse_album, parse_top_tracks, SpotifyApi, API_BASE_URL};
pub use self::auth::{AuthResponse, CallbackListener, ImplicitGrant};

use crate::models::{AccessToken, Track, TrackSelection};
use crate::providers::MusicProvider;
use anyhow::Result;
use log::info;

pub struct SpotifyProvider {
    api: SpotifyApi,
}

impl Default for SpotifyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SpotifyProvider {
    pub fn new() -> Self {
        Self {
            api: SpotifyApi::default(),
        }
    }
}

impl MusicProvider for SpotifyProvider {
    fn fetch_tracks(&mut self, selection: &TrackSelection, token: &AccessToken) -> Result<Vec<Track>> {
        let tracks = match selection {
            TrackSelection::TopTracks { time_range, limit } => {
                self.api.my_top_tracks(token, time_range, *limit)?
            }
            TrackSelection::Album { album_id } => self.api.album_tracks(token, album_id)?,
        };
        info!("Fetched {} tracks for {selection}", tracks.len());
        Ok(tracks)
    }
}
