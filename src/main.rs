use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::fs::OpenOptions;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracklist::{
    cache,
    cli::Cli,
    config::Config,
    models::AccessToken,
    providers::spotify::{ImplicitGrant, SpotifyProvider},
    ui::{self, App},
    worker::Worker,
};

const LOG_FILE: &str = "tracklist.log";

// The terminal belongs to the TUI, so logs go to a file.
fn init_logging(filter: &str) {
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(filter);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }

    let log_file = cache::cache_dir().and_then(|dir| {
        Ok(OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))?)
    });

    match log_file {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        // Nowhere safe to write; stay quiet rather than draw over the UI
        Err(_) => {
            builder.filter_level(log::LevelFilter::Off);
        }
    }

    builder.init();
}

fn main() -> Result<()> {
    // Load .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = Config::from_env();
    cli.apply(&mut config);

    let selection = config.selection();
    info!("Starting with {selection}");

    let grant = config.spotify_client_id.clone().map(|client_id| {
        ImplicitGrant::new(client_id, config.redirect_uri.clone(), config.scopes.clone())
    });

    let app = Arc::new(Mutex::new(App::new(selection.to_string())));
    let worker = Worker::new(SpotifyProvider::new(), grant, selection, Arc::clone(&app))?
        .with_token(config.access_token.clone().map(AccessToken::bearer));

    let (commands, receiver) = mpsc::channel();
    thread::spawn(move || worker.run(receiver));

    let mut terminal = ui::setup_terminal()?;

    // Run the UI
    let res = ui::run_app(&mut terminal, app, commands);

    // Restore terminal
    ui::restore_terminal(&mut terminal)?;

    if let Err(err) = res {
        error!("UI loop failed: {err:?}");
        eprintln!("Error: {err:?}");
    }

    Ok(())
}
