use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::warn;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table, TableState, Wrap},
    Frame, Terminal,
};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::display::RatatuiImage;
use crate::models::{format_total_duration, total_seconds, Track};
use crate::worker::Command;

const SPOTIFY_GREEN: Color = Color::Rgb(30, 215, 96);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Connect,
    Tracks,
    /// External Spotify link of the selected track
    Details,
    /// 30 second preview of the selected track
    Preview,
}

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,
    pub selection_label: String,
    pub authorizing: bool,
    pub auth_url: Option<String>,
    pub loading: bool,
    pub tracks: Vec<Track>,
    pub selected: usize,
    pub status: Option<String>,
    pub covers: HashMap<String, RatatuiImage>,
    /// Token lifetime reported at sign-in
    pub token_note: Option<String>,
    cover_requests: HashSet<String>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl App {
    pub fn new(selection_label: String) -> Self {
        Self {
            should_quit: false,
            screen: Screen::Connect,
            selection_label,
            authorizing: false,
            auth_url: None,
            loading: false,
            tracks: Vec::new(),
            selected: 0,
            status: None,
            covers: HashMap::new(),
            token_note: None,
            cover_requests: HashSet::new(),
        }
    }

    pub fn set_authorizing(&mut self, auth_url: Option<String>) {
        self.authorizing = true;
        self.auth_url = auth_url;
        self.status = Some("Waiting for Spotify authorization...".to_string());
    }

    pub fn auth_failed(&mut self, reason: String) {
        self.authorizing = false;
        self.auth_url = None;
        self.screen = Screen::Connect;
        self.status = Some(reason);
    }

    pub fn set_authorized(&mut self) {
        self.authorizing = false;
        self.auth_url = None;
        self.screen = Screen::Tracks;
        self.status = None;
    }

    pub fn set_loading(&mut self) {
        self.loading = true;
        self.status = Some("Loading tracks...".to_string());
    }

    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.loading = false;
        self.tracks = tracks;
        self.selected = 0;
        self.status = None;
    }

    /// A failed fetch leaves the list empty.
    pub fn fetch_failed(&mut self, reason: String) {
        self.loading = false;
        self.tracks.clear();
        self.selected = 0;
        self.status = Some(reason);
    }

    pub fn set_cover(&mut self, url: String, cover: RatatuiImage) {
        self.covers.insert(url, cover);
    }

    pub fn set_token_note(&mut self, note: Option<String>) {
        self.token_note = note;
    }

    /// Claim a cover download. False when it is cached or already under way.
    pub fn request_cover(&mut self, url: &str) -> bool {
        !self.covers.contains_key(url) && self.cover_requests.insert(url.to_string())
    }

    pub fn set_status(&mut self, status: String) {
        self.status = Some(status);
    }

    pub fn selected_track(&self) -> Option<&Track> {
        self.tracks.get(self.selected)
    }

    pub fn next(&mut self) {
        if !self.tracks.is_empty() {
            self.selected = (self.selected + 1).min(self.tracks.len() - 1);
        }
    }

    pub fn previous(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// URL shown by the current detail screen.
    pub fn detail_url(&self) -> Option<&str> {
        let track = self.selected_track()?;
        match self.screen {
            Screen::Details => track.external_url.as_deref(),
            Screen::Preview => track.preview_url.as_deref(),
            Screen::Connect | Screen::Tracks => None,
        }
    }

    /// Cover download for the selected track, once per URL.
    fn cover_request(&mut self) -> Option<Command> {
        let url = self.selected_track()?.image_url.clone()?;
        self.request_cover(&url).then_some(Command::FetchCover(url))
    }

    /// Apply a key press, returning work for the background worker.
    pub fn handle_key(&mut self, code: KeyCode) -> Option<Command> {
        match self.screen {
            Screen::Connect => match code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.should_quit = true;
                    None
                }
                KeyCode::Enter if !self.authorizing => {
                    self.set_authorizing(None);
                    Some(Command::Authorize)
                }
                _ => None,
            },
            Screen::Tracks => match code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.should_quit = true;
                    None
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    self.next();
                    self.cover_request()
                }
                KeyCode::Up | KeyCode::Char('k') => {
                    self.previous();
                    self.cover_request()
                }
                KeyCode::Enter => {
                    match self.selected_track().map(|t| t.external_url.is_some()) {
                        Some(true) => self.screen = Screen::Details,
                        Some(false) => self.set_status("This track has no Spotify link".to_string()),
                        None => {}
                    }
                    None
                }
                KeyCode::Char('p') => {
                    match self.selected_track().map(Track::has_preview) {
                        Some(true) => self.screen = Screen::Preview,
                        Some(false) => self.set_status("No preview available for this track".to_string()),
                        None => {}
                    }
                    None
                }
                KeyCode::Char('r') if !self.loading => {
                    self.set_loading();
                    Some(Command::Reload)
                }
                _ => None,
            },
            Screen::Details | Screen::Preview => match code {
                KeyCode::Char('q') => {
                    self.should_quit = true;
                    None
                }
                KeyCode::Esc | KeyCode::Backspace | KeyCode::Left | KeyCode::Char('h') => {
                    self.screen = Screen::Tracks;
                    None
                }
                KeyCode::Char('o') | KeyCode::Enter => self.detail_url().map(|u| Command::Open(u.to_string())),
                _ => None,
            },
        }
    }
}

pub fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: Arc<Mutex<App>>,
    commands: Sender<Command>,
) -> Result<()> {
    terminal.clear()?;

    loop {
        terminal.draw(|f| {
            if let Ok(app) = app.lock() {
                ui(f, &app)
            }
        })?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                let (command, quit) = match app.lock() {
                    Ok(mut app) => (app.handle_key(key.code), app.should_quit),
                    Err(_) => (None, true),
                };

                if let Some(command) = command {
                    if commands.send(command).is_err() {
                        warn!("Worker is gone, dropping command");
                    }
                }
                if quit {
                    let _ = commands.send(Command::Shutdown);
                    return Ok(());
                }
            }
        }
    }
}

pub fn ui(f: &mut Frame, app: &App) {
    f.render_widget(Clear, f.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(2), // Title
            Constraint::Min(0),    // Main content
            Constraint::Length(1), // Status / key help
        ])
        .split(f.area());

    render_title(f, app, chunks[0]);

    match app.screen {
        Screen::Connect => render_connect(f, app, chunks[1]),
        Screen::Tracks => render_tracks(f, app, chunks[1]),
        Screen::Details | Screen::Preview => render_detail(f, app, chunks[1]),
    }

    render_footer(f, app, chunks[2]);
}

fn render_title(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![
        Span::styled("🎵 ", Style::default()),
        Span::styled(
            "tracklist",
            Style::default().fg(SPOTIFY_GREEN).add_modifier(Modifier::BOLD),
        ),
    ];

    if app.screen != Screen::Connect && !app.selection_label.is_empty() {
        spans.push(Span::styled(
            format!("  {}", app.selection_label),
            Style::default().fg(Color::White),
        ));
    }

    if !app.tracks.is_empty() {
        spans.push(Span::styled(
            format!(
                "  ·  {} tracks, {}",
                app.tracks.len(),
                format_total_duration(total_seconds(&app.tracks))
            ),
            Style::default().fg(Color::DarkGray),
        ));
    }

    if let Some(note) = &app.token_note {
        spans.push(Span::styled(
            format!("  ·  {note}"),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let title = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    f.render_widget(title, area);
}

fn render_connect(f: &mut Frame, app: &App, area: Rect) {
    let mut lines = vec![
        Line::from(""),
        Line::from(""),
        Line::from(Span::styled(
            "  CONNECT WITH SPOTIFY  ",
            Style::default()
                .fg(Color::White)
                .bg(SPOTIFY_GREEN)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    if app.authorizing {
        lines.push(Line::from("Finish signing in from your browser."));
        if let Some(ref url) = app.auth_url {
            lines.push(Line::from(""));
            lines.push(Line::from("If no browser opened, visit:"));
            lines.push(Line::from(Span::styled(
                url.clone(),
                Style::default().fg(Color::Cyan),
            )));
        }
    } else {
        lines.push(Line::from("Press Enter to connect"));
    }

    let prompt = Paragraph::new(lines)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::NONE));
    f.render_widget(prompt, area);
}

pub fn track_rows(tracks: &[Track]) -> Vec<Row<'static>> {
    tracks
        .iter()
        .map(|track| {
            Row::new(vec![
                track.track_number.to_string(),
                track.name.clone(),
                track.artist.clone(),
                track.album.clone(),
                track.duration(),
                if track.has_preview() { "▶" } else { "" }.to_string(),
            ])
        })
        .collect()
}

fn render_tracks(f: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Min(40),    // Track list
            Constraint::Length(34), // Cover + selected track
        ])
        .split(area);

    if app.tracks.is_empty() {
        let message = if app.loading {
            "Loading tracks..."
        } else {
            "No tracks to show. Press 'r' to reload."
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center);
        f.render_widget(empty, columns[0]);
        return;
    }

    let header = Row::new(vec!["#", "Title", "Artist", "Album", "Time", ""])
        .style(Style::default().fg(Color::DarkGray));

    let table = Table::new(
        track_rows(&app.tracks),
        [
            Constraint::Length(3),
            Constraint::Percentage(35),
            Constraint::Percentage(25),
            Constraint::Percentage(30),
            Constraint::Length(6),
            Constraint::Length(1),
        ],
    )
    .header(header)
    .style(Style::default().fg(Color::White))
    .row_highlight_style(
        Style::default()
            .fg(Color::Black)
            .bg(SPOTIFY_GREEN)
            .add_modifier(Modifier::BOLD),
    );

    let mut state = TableState::default().with_selected(Some(app.selected));
    f.render_stateful_widget(table, columns[0], &mut state);

    if let Some(track) = app.selected_track() {
        render_selected(f, app, track, columns[1]);
    }
}

fn render_selected(f: &mut Frame, app: &App, track: &Track, area: Rect) {
    let cover_height = crate::display::COVER_SIZE as u16;
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(cover_height), Constraint::Min(0)])
        .split(area);

    let cover = track.image_url.as_ref().and_then(|url| app.covers.get(url));
    match cover {
        Some(cover) => render_cover(f, cover, parts[0]),
        None => {
            let placeholder = Paragraph::new("No cover art")
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center);
            f.render_widget(placeholder, parts[0]);
        }
    }

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            track.name.clone(),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(track.artist.clone(), Style::default().fg(Color::Gray))),
        Line::from(Span::styled(track.album.clone(), Style::default().fg(Color::DarkGray))),
    ];
    let info = Paragraph::new(lines).wrap(Wrap { trim: true });
    f.render_widget(info, parts[1]);
}

fn render_cover(f: &mut Frame, cover: &RatatuiImage, area: Rect) {
    for (y, row) in cover.pixels.iter().enumerate() {
        if y >= area.height as usize {
            break;
        }

        let spans: Vec<Span> = row
            .iter()
            .take(area.width as usize / 2)
            // Two spaces make a square pixel
            .map(|&(r, g, b)| Span::styled("  ", Style::default().bg(Color::Rgb(r, g, b))))
            .collect();

        let line_area = Rect {
            x: area.x,
            y: area.y + y as u16,
            width: area.width,
            height: 1,
        };
        f.render_widget(Paragraph::new(Line::from(spans)), line_area);
    }
}

fn render_detail(f: &mut Frame, app: &App, area: Rect) {
    let title = match app.screen {
        Screen::Preview => " Preview ",
        _ => " Details ",
    };

    let mut lines = vec![Line::from("")];
    if let Some(track) = app.selected_track() {
        lines.push(Line::from(vec![
            Span::styled(
                track.name.clone(),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  {}", track.artist), Style::default().fg(Color::Gray)),
        ]));
        lines.push(Line::from(""));
    }

    match app.detail_url() {
        Some(url) => {
            lines.push(Line::from(Span::styled(
                url.to_string(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::UNDERLINED),
            )));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Press 'o' to open in your browser",
                Style::default().fg(Color::DarkGray),
            )));
        }
        None => lines.push(Line::from(Span::styled(
            "Nothing to show",
            Style::default().fg(Color::DarkGray),
        ))),
    }

    let detail = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(SPOTIFY_GREEN)),
        );
    f.render_widget(detail, area);
}

fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let help = match app.screen {
        Screen::Connect => "Enter connect  q quit",
        Screen::Tracks => "↑/↓ move  Enter details  p preview  r reload  q quit",
        Screen::Details | Screen::Preview => "o open  Esc back  q quit",
    };

    let line = match app.status {
        Some(ref status) => Line::from(vec![
            Span::styled(status.clone(), Style::default().fg(Color::Yellow)),
            Span::styled(format!("   {help}"), Style::default().fg(Color::DarkGray)),
        ]),
        None => Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))),
    };

    f.render_widget(Paragraph::new(line), area);
}

pub fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, crossterm::cursor::Hide)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

pub fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        crossterm::cursor::Show
    )?;
    terminal.show_cursor()?;
    Ok(())
}
