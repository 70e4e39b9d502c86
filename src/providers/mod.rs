use crate::models::{AccessToken, Track, TrackSelection};
use anyhow::Result;

pub mod spotify;

// A provider turns a held token into the list of tracks to display
pub trait MusicProvider {
    fn fetch_tracks(&mut self, selection: &TrackSelection, token: &AccessToken) -> Result<Vec<Track>>;
}
