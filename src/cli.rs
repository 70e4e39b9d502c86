use clap::Parser;

use crate::config::{Config, Source};

#[derive(Debug, Parser)]
#[command(name = "tracklist")]
#[command(version, about = "Browse your Spotify top tracks or an album's tracks", long_about = None)]
pub struct Cli {
    /// Which tracks to list (defaults to TRACKLIST_SOURCE, then album)
    #[arg(long, value_enum)]
    pub source: Option<Source>,

    /// Album to list when --source album
    #[arg(long)]
    pub album_id: Option<String>,

    /// short_term, medium_term or long_term
    #[arg(long, value_parser = ["short_term", "medium_term", "long_term"])]
    pub time_range: Option<String>,

    /// Number of top tracks to fetch
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=50))]
    pub limit: Option<u32>,

    /// Use an existing access token instead of signing in
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Log filter written to the log file (e.g. debug, tracklist=trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Flags win over the environment.
    pub fn apply(&self, config: &mut Config) {
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(ref album_id) = self.album_id {
            config.album_id = album_id.clone();
        }
        if let Some(ref time_range) = self.time_range {
            config.time_range = time_range.clone();
        }
        if let Some(limit) = self.limit {
            config.limit = limit;
        }
        if let Some(ref token) = self.token {
            config.access_token = Some(token.clone());
        }
    }
}
