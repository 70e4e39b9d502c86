use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{AccessToken, Track};

pub const API_BASE_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    items: Vec<FullTrack>,
}

#[derive(Debug, Deserialize)]
struct AlbumResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<Image>,
    tracks: Page<SimpleTrack>,
}

// Explicit bound, otherwise `default` would demand `T: Default`
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct Page<T> {
    #[serde(default)]
    items: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}

// Track objects from /me/top/tracks carry their album
#[derive(Debug, Deserialize)]
struct FullTrack {
    #[serde(flatten)]
    track: SimpleTrack,
    album: AlbumRef,
}

// Track objects nested in an album do not
#[derive(Debug, Deserialize)]
struct SimpleTrack {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    #[serde(default)]
    track_number: u32,
    #[serde(default)]
    duration_ms: u64,
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    preview_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    #[serde(default)]
    name: String,
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

impl SimpleTrack {
    fn into_track(self, album: &str, images: &[Image]) -> Track {
        Track {
            id: self.id.unwrap_or_default(),
            name: self.name,
            album: album.to_string(),
            artist: self
                .artists
                .into_iter()
                .next()
                .map(|a| a.name)
                .unwrap_or_default(),
            track_number: self.track_number,
            duration_ms: self.duration_ms,
            // Spotify lists images widest first
            image_url: images.first().map(|i| i.url.clone()),
            external_url: self.external_urls.spotify,
            preview_url: self.preview_url,
        }
    }
}

pub fn parse_top_tracks(body: &str) -> Result<Vec<Track>> {
    let response: TopTracksResponse =
        serde_json::from_str(body).context("Unexpected top tracks response")?;

    Ok(response
        .items
        .into_iter()
        .map(|item| item.track.into_track(&item.album.name, &item.album.images))
        .collect())
}

pub fn parse_album(body: &str) -> Result<Vec<Track>> {
    Ok(parse_album_first_page(body)?.0)
}

/// First page of an album's tracks plus the URL of the next page.
fn parse_album_first_page(body: &str) -> Result<(Vec<Track>, Option<String>, AlbumRef)> {
    let AlbumResponse {
        name,
        images,
        tracks,
    } = serde_json::from_str(body).context("Unexpected album response")?;
    let album = AlbumRef { name, images };

    let items = tracks
        .items
        .into_iter()
        .map(|track| track.into_track(&album.name, &album.images))
        .collect();

    Ok((items, tracks.next, album))
}

pub struct SpotifyApi {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl Default for SpotifyApi {
    fn default() -> Self {
        Self::new(API_BASE_URL)
    }
}

impl SpotifyApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .user_agent("tracklist/0.1.0")
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn my_top_tracks(&self, token: &AccessToken, time_range: &str, limit: u32) -> Result<Vec<Track>> {
        let limit = limit.to_string();
        let body = self.get(
            token,
            "/me/top/tracks",
            &[("time_range", time_range), ("limit", limit.as_str())],
        )?;
        parse_top_tracks(&body)
    }

    /// All tracks of an album, following `tracks.next` past the first page.
    pub fn album_tracks(&self, token: &AccessToken, album_id: &str) -> Result<Vec<Track>> {
        let path = format!("/albums/{}", urlencoding::encode(album_id));
        let body = self.get(token, &path, &[])?;
        let (mut tracks, mut next, album) = parse_album_first_page(&body)?;

        while let Some(url) = next.take() {
            let body = self.send(token, &url, &url, &[])?;
            let page: Page<SimpleTrack> =
                serde_json::from_str(&body).context("Unexpected album tracks page")?;

            tracks.extend(
                page.items
                    .into_iter()
                    .map(|track| track.into_track(&album.name, &album.images)),
            );
            next = page.next;
        }

        Ok(tracks)
    }

    fn get(&self, token: &AccessToken, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        self.send(token, &url, path, query)
    }

    // `label` names the request in errors
    fn send(&self, token: &AccessToken, url: &str, label: &str, query: &[(&str, &str)]) -> Result<String> {
        debug!("GET {url}");

        let response = self
            .client
            .get(url)
            .bearer_auth(token.secret())
            .query(query)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("Request to {} failed: {} - {}", label, status, error_text));
        }

        Ok(response.text()?)
    }
}
