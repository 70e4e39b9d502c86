use anyhow::Result;
use log::{error, info, warn};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::browser;
use crate::display::CoverArtClient;
use crate::models::{AccessToken, TrackSelection};
use crate::providers::spotify::auth::CALLBACK_TIMEOUT;
use crate::providers::spotify::ImplicitGrant;
use crate::providers::MusicProvider;
use crate::ui::App;

/// Requests from the UI thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Authorize,
    Reload,
    Open(String),
    FetchCover(String),
    Shutdown,
}

/// Owns everything that touches the network, so the draw loop never blocks.
pub struct Worker<P: MusicProvider> {
    provider: P,
    grant: Option<ImplicitGrant>,
    selection: TrackSelection,
    token: Option<AccessToken>,
    app: Arc<Mutex<App>>,
    runtime: tokio::runtime::Runtime,
    covers: CoverArtClient,
    callback_timeout: Duration,
    opener: fn(&str) -> Result<()>,
}

impl<P: MusicProvider> Worker<P> {
    pub fn new(
        provider: P,
        grant: Option<ImplicitGrant>,
        selection: TrackSelection,
        app: Arc<Mutex<App>>,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            grant,
            selection,
            token: None,
            app,
            runtime: tokio::runtime::Runtime::new()?,
            covers: CoverArtClient::default(),
            callback_timeout: CALLBACK_TIMEOUT,
            opener: browser::open_url,
        })
    }

    /// Start with a token obtained elsewhere; the redirect is skipped.
    pub fn with_token(mut self, token: Option<AccessToken>) -> Self {
        self.token = token;
        self
    }

    pub fn run(mut self, commands: Receiver<Command>) {
        if let Some(token) = self.token.take() {
            self.connected(token);
        }

        for command in commands {
            if !self.handle(command) {
                break;
            }
        }
        info!("Worker stopped");
    }

    /// Returns false once the worker should stop.
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Authorize => self.authorize(),
            Command::Reload => self.load_tracks(),
            Command::Open(url) => {
                if let Err(e) = (self.opener)(&url) {
                    warn!("{e}");
                    self.update(|app| app.set_status(e.to_string()));
                }
            }
            Command::FetchCover(url) => self.fetch_cover(url),
            Command::Shutdown => return false,
        }
        true
    }

    fn update(&self, f: impl FnOnce(&mut App)) {
        if let Ok(mut app) = self.app.lock() {
            f(&mut app);
        }
    }

    fn authorize(&mut self) {
        let Some(grant) = self.grant.as_ref() else {
            self.update(|app| {
                app.auth_failed("Set SPOTIFY_CLIENT_ID to connect with Spotify".to_string())
            });
            return;
        };

        let app = Arc::clone(&self.app);
        let opener = self.opener;
        let result = grant.authorize(
            |url| {
                let opened = opener(url);
                if let Err(ref e) = opened {
                    warn!("{e}");
                }
                if let Ok(mut app) = app.lock() {
                    // Only show the link when we could not open it ourselves
                    app.set_authorizing(opened.err().map(|_| url.to_string()));
                }
            },
            self.callback_timeout,
        );

        match result {
            Ok(token) => self.connected(token),
            Err(e) => {
                error!("Authorization failed: {e:#}");
                self.update(|app| app.auth_failed(format!("{e:#}")));
            }
        }
    }

    fn connected(&mut self, token: AccessToken) {
        let note = token.lifetime_label();
        self.token = Some(token);
        self.update(|app| {
            app.set_authorized();
            app.set_token_note(note);
        });
        self.load_tracks();
    }

    fn load_tracks(&mut self) {
        let Some(token) = self.token.clone() else {
            self.update(|app| app.auth_failed("Not connected".to_string()));
            return;
        };

        self.update(|app| app.set_loading());

        match self.provider.fetch_tracks(&self.selection, &token) {
            Ok(tracks) => {
                let first_cover = tracks.first().and_then(|t| t.image_url.clone());
                let mut claimed = None;
                self.update(|app| {
                    app.set_tracks(tracks);
                    // Recorded on the App so key presses do not fetch it again
                    claimed = first_cover.filter(|url| app.request_cover(url));
                });
                if let Some(url) = claimed {
                    self.fetch_cover(url);
                }
            }
            Err(e) => {
                error!("Failed to fetch tracks: {e:#}");
                self.update(|app| app.fetch_failed(format!("Failed to fetch tracks: {e}")));
            }
        }
    }

    fn fetch_cover(&self, url: String) {
        let client = self.covers.clone();
        let app = Arc::clone(&self.app);

        self.runtime.spawn(async move {
            match client.fetch(&url).await {
                Ok(cover) => {
                    if let Ok(mut app) = app.lock() {
                        app.set_cover(url, cover);
                    }
                }
                Err(e) => warn!("Failed to fetch cover art {url}: {e}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_track, Track};
    use crate::ui::Screen;
    use anyhow::anyhow;

    #[derive(Default)]
    struct RecordingProvider {
        calls: Arc<Mutex<Vec<(TrackSelection, String)>>>,
        fail: bool,
        cover: Option<String>,
    }

    impl MusicProvider for RecordingProvider {
        fn fetch_tracks(&mut self, selection: &TrackSelection, token: &AccessToken) -> Result<Vec<Track>> {
            self.calls
                .lock()
                .unwrap()
                .push((selection.clone(), token.secret().to_string()));
            if self.fail {
                return Err(anyhow!("401 Unauthorized"));
            }
            let mut tracks = vec![sample_track(1, 225_000), sample_track(2, 59_999)];
            for track in &mut tracks {
                track.image_url = self.cover.clone();
            }
            Ok(tracks)
        }
    }

    fn album() -> TrackSelection {
        TrackSelection::Album {
            album_id: "4aawyAB9vmqN3uQ7FjRGTy".to_string(),
        }
    }

    #[test]
    fn test_fetch_uses_held_token() {
        let provider = RecordingProvider::default();
        let calls = Arc::clone(&provider.calls);
        let app = Arc::new(Mutex::new(App::new(album().to_string())));

        let mut worker = Worker::new(provider, None, album(), Arc::clone(&app))
            .unwrap()
            .with_token(Some(AccessToken::bearer("token-123")));

        assert!(worker.handle(Command::Reload));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (album(), "token-123".to_string()));

        let app = app.lock().unwrap();
        assert_eq!(app.tracks.len(), 2);
        assert!(!app.loading);
        assert!(app.status.is_none());
    }

    #[test]
    fn test_first_cover_not_requested_twice() {
        let provider = RecordingProvider {
            // Nothing listens here; the download just fails in the background
            cover: Some("http://127.0.0.1:1/cover.jpg".to_string()),
            ..Default::default()
        };
        let app = Arc::new(Mutex::new(App::new(album().to_string())));
        let mut worker = Worker::new(provider, None, album(), Arc::clone(&app)).unwrap();

        worker.connected(AccessToken::bearer("t"));

        // Every album track shares the cover the worker already fetched
        let mut app = app.lock().unwrap();
        assert_eq!(app.handle_key(crossterm::event::KeyCode::Down), None);
        assert_eq!(app.handle_key(crossterm::event::KeyCode::Up), None);
    }

    #[test]
    fn test_connected_shows_token_lifetime() {
        let provider = RecordingProvider::default();
        let calls = Arc::clone(&provider.calls);
        let app = Arc::new(Mutex::new(App::new(String::new())));
        let mut worker = Worker::new(provider, None, album(), Arc::clone(&app)).unwrap();

        let mut token = AccessToken::bearer("fresh");
        token.expires_in = Some(3600);
        worker.connected(token);

        assert_eq!(calls.lock().unwrap()[0].1, "fresh");
        let app = app.lock().unwrap();
        assert_eq!(app.screen, Screen::Tracks);
        assert_eq!(app.token_note.as_deref(), Some("token valid for 60 min"));
    }

    #[test]
    fn test_failed_fetch_leaves_list_empty() {
        let provider = RecordingProvider {
            fail: true,
            ..Default::default()
        };
        let app = Arc::new(Mutex::new(App::new(String::new())));
        app.lock().unwrap().set_tracks(vec![sample_track(1, 1_000)]);

        let mut worker = Worker::new(provider, None, album(), Arc::clone(&app))
            .unwrap()
            .with_token(Some(AccessToken::bearer("expired")));
        worker.handle(Command::Reload);

        let app = app.lock().unwrap();
        assert!(app.tracks.is_empty());
        assert!(app.status.as_deref().unwrap().contains("401"));
    }

    #[test]
    fn test_no_fetch_without_token() {
        let provider = RecordingProvider::default();
        let calls = Arc::clone(&provider.calls);
        let app = Arc::new(Mutex::new(App::new(String::new())));

        let mut worker = Worker::new(provider, None, album(), Arc::clone(&app)).unwrap();
        worker.handle(Command::Reload);

        assert!(calls.lock().unwrap().is_empty());
        assert_eq!(app.lock().unwrap().screen, Screen::Connect);
    }

    #[test]
    fn test_authorize_without_client_id() {
        let app = Arc::new(Mutex::new(App::new(String::new())));
        let mut worker =
            Worker::new(RecordingProvider::default(), None, album(), Arc::clone(&app)).unwrap();

        assert!(worker.handle(Command::Authorize));

        let app = app.lock().unwrap();
        assert_eq!(app.screen, Screen::Connect);
        assert!(!app.authorizing);
        assert!(app.status.as_deref().unwrap().contains("SPOTIFY_CLIENT_ID"));
    }

    #[test]
    fn test_authorize_times_out_back_to_connect() {
        let app = Arc::new(Mutex::new(App::new(String::new())));
        let grant = ImplicitGrant::new(
            "client".to_string(),
            "http://127.0.0.1:0/callback".to_string(),
            vec!["user-top-read".to_string()],
        );
        let mut worker =
            Worker::new(RecordingProvider::default(), Some(grant), album(), Arc::clone(&app))
                .unwrap();
        worker.callback_timeout = Duration::from_millis(200);
        worker.opener = |_| Err(anyhow!("no browser in tests"));

        worker.handle(Command::Authorize);

        let app = app.lock().unwrap();
        assert_eq!(app.screen, Screen::Connect);
        assert!(!app.authorizing);
        assert!(app.status.as_deref().unwrap().contains("Timed out"));
    }

    #[test]
    fn test_open_failure_reported() {
        let app = Arc::new(Mutex::new(App::new(String::new())));
        let mut worker =
            Worker::new(RecordingProvider::default(), None, album(), Arc::clone(&app)).unwrap();
        worker.opener = |url| Err(anyhow!("Failed to launch browser for {url}"));

        assert!(worker.handle(Command::Open("https://open.spotify.com/track/x".to_string())));
        assert!(app
            .lock()
            .unwrap()
            .status
            .as_deref()
            .unwrap()
            .contains("Failed to launch browser"));
    }

    #[test]
    fn test_shutdown_stops() {
        let app = Arc::new(Mutex::new(App::new(String::new())));
        let mut worker =
            Worker::new(RecordingProvider::default(), None, album(), app).unwrap();
        assert!(!worker.handle(Command::Shutdown));
    }

    #[test]
    fn test_run_loads_immediately_with_token() {
        let provider = RecordingProvider::default();
        let calls = Arc::clone(&provider.calls);
        let app = Arc::new(Mutex::new(App::new(String::new())));
        let worker = Worker::new(provider, None, album(), Arc::clone(&app))
            .unwrap()
            .with_token(Some(AccessToken::bearer("t")));

        let (tx, rx) = std::sync::mpsc::channel();
        tx.send(Command::Shutdown).unwrap();
        worker.run(rx);

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(app.lock().unwrap().screen, Screen::Tracks);
    }
}
