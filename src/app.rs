use crate::audio::{MediaBackend, NullBackend, RodioBackend};
use crate::catalog::{CatalogClient, SearchOutcome, SearchTracker, SearchWorker, Ticket};
use crate::config::{self, Settings};
use crate::core::{Action, PlaybackController, SKIP_SECONDS};
use crate::logging;
use crate::model::{Track, ViewTab};
use crate::store::{FavoritesStore, FileStorage, HistoryStore};
use crate::suggest;
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::cell::Cell;
use std::io::stdout;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

const VOLUME_STEP: i32 = 5;

#[derive(Debug, Default)]
pub struct AppStartupOptions {
    pub config_root: Option<PathBuf>,
    pub no_audio: bool,
    pub initial_search: Option<String>,
}

/// View state around the playback controller.
pub struct App<B: MediaBackend> {
    pub player: PlaybackController<B>,
    pub favorites: FavoritesStore,
    pub results: Vec<Track>,
    pub tab: ViewTab,
    pub selected: usize,
    pub search_input: String,
    pub search_mode: bool,
    pub suggestions: Vec<&'static str>,
    pub status: String,
    dirty: Rc<Cell<bool>>,
    tracker: SearchTracker,
    pending_search_at: Option<Instant>,
    debounce: Duration,
}

impl<B: MediaBackend> App<B> {
    pub fn new(mut player: PlaybackController<B>, favorites: FavoritesStore, settings: &Settings) -> Self {
        let dirty = Rc::new(Cell::new(true));
        let redraw = Rc::clone(&dirty);
        player.subscribe(move |_| redraw.set(true));

        Self {
            player,
            favorites,
            results: Vec::new(),
            tab: ViewTab::Home,
            selected: 0,
            search_input: String::new(),
            search_mode: false,
            suggestions: Vec::new(),
            status: String::from("Press / to search"),
            dirty,
            tracker: SearchTracker::default(),
            pending_search_at: None,
            debounce: Duration::from_millis(settings.search_debounce_ms),
        }
    }

    /// True while the latest submitted search has not answered yet.
    pub fn is_loading(&self) -> bool {
        self.tracker.is_waiting()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    pub fn mark_drawn(&self) {
        self.dirty.set(false);
    }

    fn touch(&self) {
        self.dirty.set(true);
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
        self.touch();
    }

    /// Tracks shown on the current tab.
    pub fn visible_tracks(&self) -> &[Track] {
        match self.tab {
            ViewTab::Home => &self.results,
            ViewTab::Favorites => self.favorites.tracks(),
            ViewTab::History => self.player.history().tracks(),
        }
    }

    /// Next/previous walk favorites on the Favorites tab and search results
    /// everywhere else. History reorders as tracks play, so it is never a queue.
    fn active_queue(&self) -> Vec<Track> {
        match self.tab {
            ViewTab::Favorites => self.favorites.tracks().to_vec(),
            ViewTab::Home | ViewTab::History => self.results.clone(),
        }
    }

    pub fn selected_track(&self) -> Option<&Track> {
        self.visible_tracks().get(self.selected)
    }

    /// An empty Home tab lists the genre shortcuts instead of tracks.
    pub fn showing_quick_searches(&self) -> bool {
        self.tab == ViewTab::Home && self.results.is_empty() && !self.is_loading()
    }

    fn clamp_selection(&mut self) {
        let len = if self.showing_quick_searches() {
            suggest::QUICK_SEARCHES.len()
        } else {
            self.visible_tracks().len()
        };
        self.selected = if len == 0 { 0 } else { self.selected.min(len - 1) };
    }

    pub fn dispatch(&mut self, action: Action) {
        let queue = self.active_queue();
        self.player.dispatch(action, &queue);
        // History tab lists change as tracks are played.
        self.clamp_selection();
    }

    pub fn poll_media(&mut self) {
        let queue = self.active_queue();
        self.player.poll_media(&queue);
    }

    pub fn set_search_input(&mut self, input: String, now: Instant) {
        self.search_input = input;
        self.suggestions = suggest::suggestions(&self.search_input);
        if self.search_input.trim().is_empty() {
            self.pending_search_at = None;
            self.tracker.cancel();
            self.results.clear();
            self.clamp_selection();
        } else {
            self.pending_search_at = Some(now + self.debounce);
        }
        self.touch();
    }

    /// Returns the query to send once the debounce window has passed.
    pub fn due_search(&mut self, now: Instant) -> Option<String> {
        let due = self.pending_search_at?;
        if now < due {
            return None;
        }
        self.pending_search_at = None;
        Some(self.search_input.trim().to_string())
    }

    fn search_now(&mut self, now: Instant) {
        if !self.search_input.trim().is_empty() {
            self.pending_search_at = Some(now);
        }
    }

    pub fn search_started(&mut self, ticket: Ticket) {
        self.tracker.expect(ticket);
        self.set_status("Searching...");
    }

    pub fn apply_search_outcome(&mut self, outcome: SearchOutcome) {
        let Some(outcome) = self.tracker.accept(outcome) else {
            return;
        };

        match outcome.result {
            Ok(tracks) => {
                let count = tracks.len();
                self.results = tracks;
                self.tab = ViewTab::Home;
                self.selected = 0;
                self.set_status(format!("{count} results for \"{}\"", outcome.query));
            }
            Err(err) => {
                self.results.clear();
                self.selected = 0;
                self.set_status(format!("search failed: {err}"));
            }
        }
    }

    pub fn start_quick_search(&mut self, now: Instant) {
        let Some((_, query)) = suggest::QUICK_SEARCHES.get(self.selected).copied() else {
            return;
        };
        self.set_search_input(query.to_string(), now);
        self.search_now(now);
    }

    pub fn play_selected(&mut self) {
        let Some(track) = self.selected_track().cloned() else {
            self.set_status("Nothing selected");
            return;
        };
        self.dispatch(Action::Play(track));
    }

    pub fn toggle_favorite(&mut self, track: &Track) {
        let now_favorite = self.favorites.toggle(track);
        self.clamp_selection();
        if now_favorite {
            self.set_status(format!("Added {} to favorites", track.title));
        } else {
            self.set_status(format!("Removed {} from favorites", track.title));
        }
    }

    pub fn clear_history(&mut self) {
        self.player.clear_history();
        self.clamp_selection();
        self.set_status("History cleared");
    }

    fn switch_tab(&mut self, tab: ViewTab) {
        self.tab = tab;
        self.selected = 0;
        self.touch();
    }

    /// Returns `true` when the user asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent, now: Instant) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        if self.search_mode {
            self.handle_search_key(key, now);
            return false;
        }

        match key.code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('/') => {
                self.search_mode = true;
                self.touch();
            }
            KeyCode::Tab => self.switch_tab(self.tab.next()),
            KeyCode::Down => {
                self.selected = self.selected.saturating_add(1);
                self.clamp_selection();
                self.touch();
            }
            KeyCode::Up => {
                self.selected = self.selected.saturating_sub(1);
                self.touch();
            }
            KeyCode::Enter if self.showing_quick_searches() => self.start_quick_search(now),
            KeyCode::Enter => self.play_selected(),
            KeyCode::Char(' ') => self.dispatch(Action::TogglePlay),
            KeyCode::Char('n') => self.dispatch(Action::Next),
            KeyCode::Char('p') => self.dispatch(Action::Previous),
            KeyCode::Right => {
                self.dispatch(Action::SkipForward);
                self.set_status(format!("+{SKIP_SECONDS}s"));
            }
            KeyCode::Left => {
                self.dispatch(Action::SkipBackward);
                self.set_status(format!("-{SKIP_SECONDS}s"));
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                let volume = i32::from(self.player.state().volume) + VOLUME_STEP;
                self.dispatch(Action::SetVolume(volume));
            }
            KeyCode::Char('-') => {
                let volume = i32::from(self.player.state().volume) - VOLUME_STEP;
                self.dispatch(Action::SetVolume(volume));
            }
            KeyCode::Char(digit @ '0'..='9') => {
                let percent = f64::from(digit.to_digit(10).unwrap_or(0)) * 10.0;
                self.dispatch(Action::SeekPercent(percent));
            }
            KeyCode::Char('f') => {
                if let Some(track) = self.selected_track().cloned() {
                    self.toggle_favorite(&track);
                }
            }
            KeyCode::Char('F') => {
                if let Some(track) = self.player.state().current.clone() {
                    self.toggle_favorite(&track);
                }
            }
            KeyCode::Char('s') => {
                self.dispatch(Action::ToggleShuffle);
                let shuffle = self.player.state().shuffle;
                self.set_status(if shuffle { "Shuffle on" } else { "Shuffle off" });
            }
            KeyCode::Char('r') => {
                self.dispatch(Action::ToggleRepeat);
                let repeat = self.player.state().repeat;
                self.set_status(if repeat { "Repeat on" } else { "Repeat off" });
            }
            KeyCode::Char('c') => self.clear_history(),
            KeyCode::Char('x') => self.dispatch(Action::Close),
            _ => {}
        }
        false
    }

    fn handle_search_key(&mut self, key: KeyEvent, now: Instant) {
        match key.code {
            KeyCode::Esc => {
                self.search_mode = false;
                self.touch();
            }
            KeyCode::Enter => {
                self.search_mode = false;
                self.search_now(now);
                self.touch();
            }
            KeyCode::Tab => {
                if let Some(first) = self.suggestions.first().copied() {
                    self.set_search_input(first.to_string(), now);
                    self.search_now(now);
                }
            }
            KeyCode::Backspace => {
                let mut input = self.search_input.clone();
                input.pop();
                self.set_search_input(input, now);
            }
            KeyCode::Char(ch) => {
                let mut input = self.search_input.clone();
                input.push(ch);
                self.set_search_input(input, now);
            }
            _ => {}
        }
    }
}

pub fn run_with_startup(options: AppStartupOptions) -> Result<()> {
    let root = match options.config_root {
        Some(root) => root,
        None => config::config_root()?,
    };
    config::ensure_dir(&root)?;
    let _log_guard = logging::init_logging(&config::log_dir(&root))?;
    let settings = config::load_settings(&root)?;

    let backend: Box<dyn MediaBackend> = if options.no_audio {
        Box::new(NullBackend::new())
    } else {
        match RodioBackend::new() {
            Ok(backend) => Box::new(backend),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "audio output unavailable, using null backend");
                Box::new(NullBackend::new())
            }
        }
    };

    let storage = FileStorage::new(&root);
    let history = HistoryStore::load(Box::new(storage.clone()));
    let favorites = FavoritesStore::load(Box::new(storage));
    let player = PlaybackController::new(backend, history, settings.default_volume);
    let mut app = App::new(player, favorites, &settings);
    let mut worker = SearchWorker::spawn(CatalogClient::from_settings(&settings)?)?;

    if let Some(term) = options.initial_search {
        let now = Instant::now();
        app.set_search_input(term, now);
        app.search_now(now);
    }

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut last_draw = Instant::now();
    let result: Result<()> = loop {
        app.poll_media();
        while let Some(outcome) = worker.try_recv() {
            app.apply_search_outcome(outcome);
        }
        if let Some(query) = app.due_search(Instant::now()) {
            let ticket = worker.submit(&query);
            app.search_started(ticket);
        }

        if app.is_dirty() || last_draw.elapsed() > Duration::from_millis(250) {
            terminal.draw(|frame| crate::ui::draw(frame, &app))?;
            app.mark_drawn();
            last_draw = Instant::now();
        }

        if !event::poll(Duration::from_millis(33))? {
            continue;
        }

        if let Event::Key(key) = event::read()?
            && app.handle_key(key, Instant::now())
        {
            break Ok(());
        }
    };

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    app.dispatch(Action::Close);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;
    use crate::store::MemoryStorage;

    fn track(id: u64) -> Track {
        Track {
            id,
            title: format!("song {id}"),
            artist_name: String::from("artist"),
            artwork_url: String::new(),
            preview_url: format!("https://audio.example/{id}.m4a"),
            duration_ms: 30_000,
            album: None,
            genre: None,
        }
    }

    fn test_app() -> App<NullBackend> {
        let history = HistoryStore::load(Box::new(MemoryStorage::new()));
        let favorites = FavoritesStore::load(Box::new(MemoryStorage::new()));
        let player = PlaybackController::new(NullBackend::new(), history, 70);
        App::new(player, favorites, &Settings::default())
    }

    fn press(app: &mut App<NullBackend>, code: KeyCode) -> bool {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE), Instant::now())
    }

    fn outcome(ticket: Ticket, result: Result<Vec<Track>, CatalogError>) -> SearchOutcome {
        SearchOutcome {
            ticket,
            query: String::from("q"),
            result,
        }
    }

    #[test]
    fn typing_debounces_search() {
        let mut app = test_app();
        let start = Instant::now();
        app.set_search_input(String::from("jazz"), start);

        assert_eq!(app.due_search(start + Duration::from_millis(100)), None);
        assert_eq!(
            app.due_search(start + Duration::from_millis(500)),
            Some(String::from("jazz"))
        );
        assert_eq!(app.due_search(start + Duration::from_secs(2)), None);
    }

    #[test]
    fn clearing_input_clears_results_and_ignores_late_response() {
        let mut app = test_app();
        app.search_started(1);
        app.set_search_input(String::new(), Instant::now());

        app.apply_search_outcome(outcome(1, Ok(vec![track(1)])));

        assert!(app.results.is_empty());
        assert!(!app.is_loading());
    }

    #[test]
    fn only_latest_search_is_applied() {
        let mut app = test_app();
        app.search_started(1);
        app.search_started(2);

        app.apply_search_outcome(outcome(2, Ok(vec![track(2)])));
        app.apply_search_outcome(outcome(1, Ok(vec![track(1)])));

        assert_eq!(app.results, vec![track(2)]);
    }

    #[test]
    fn failed_search_clears_results() {
        let mut app = test_app();
        app.search_started(1);
        app.apply_search_outcome(outcome(1, Ok(vec![track(1)])));
        app.search_started(2);

        app.apply_search_outcome(outcome(2, Err(CatalogError::Status(503))));

        assert!(app.results.is_empty());
        assert!(app.status.contains("503"));
    }

    #[test]
    fn enter_plays_selected_result_and_records_history() {
        let mut app = test_app();
        app.search_started(1);
        app.apply_search_outcome(outcome(1, Ok(vec![track(1), track(2)])));

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.player.state().current, Some(track(2)));
        assert!(app.player.state().playing);
        assert_eq!(app.player.history().tracks(), &[track(2)]);
        assert_eq!(app.player.backend().current(), Some("https://audio.example/2.m4a"));
    }

    #[test]
    fn next_uses_favorites_when_that_tab_is_shown() {
        let mut app = test_app();
        app.toggle_favorite(&track(5));
        app.toggle_favorite(&track(6));
        app.search_started(1);
        app.apply_search_outcome(outcome(1, Ok(vec![track(1), track(2)])));

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.tab, ViewTab::Favorites);
        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Char('n'));

        assert_eq!(app.player.state().current, Some(track(6)));
    }

    #[test]
    fn search_mode_captures_keys_until_escape() {
        let mut app = test_app();
        press(&mut app, KeyCode::Char('/'));
        assert!(!press(&mut app, KeyCode::Char('q')));
        assert_eq!(app.search_input, "q");
        press(&mut app, KeyCode::Esc);
        assert!(press(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn volume_keys_step_and_clamp() {
        let mut app = test_app();
        for _ in 0..10 {
            press(&mut app, KeyCode::Char('+'));
        }
        assert_eq!(app.player.state().volume, 100);
        assert_eq!(app.player.backend().volume(), 1.0);
        press(&mut app, KeyCode::Char('-'));
        assert_eq!(app.player.state().volume, 95);
    }

    #[test]
    fn clear_history_key_empties_history_tab() {
        let mut app = test_app();
        app.dispatch(Action::Play(track(1)));
        app.switch_tab(ViewTab::History);
        assert_eq!(app.visible_tracks().len(), 1);

        press(&mut app, KeyCode::Char('c'));

        assert!(app.visible_tracks().is_empty());
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn empty_home_offers_quick_searches() {
        let mut app = test_app();
        assert!(app.showing_quick_searches());

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.search_input, "piano music");
        assert_eq!(app.due_search(Instant::now()), Some(String::from("piano music")));
        assert!(app.player.state().is_idle());

        app.search_started(1);
        assert!(!app.showing_quick_searches());
    }

    #[test]
    fn quick_search_selection_is_clamped() {
        let mut app = test_app();
        for _ in 0..20 {
            press(&mut app, KeyCode::Down);
        }
        assert_eq!(app.selected, suggest::QUICK_SEARCHES.len() - 1);
    }

    #[test]
    fn history_tab_navigates_search_results() {
        let mut app = test_app();
        app.search_started(1);
        app.apply_search_outcome(outcome(1, Ok(vec![track(1), track(2), track(3)])));
        for id in 1..=3 {
            app.dispatch(Action::Play(track(id)));
        }

        app.switch_tab(ViewTab::History);
        assert_eq!(app.visible_tracks()[0], track(3));
        press(&mut app, KeyCode::Char('n'));

        assert_eq!(app.player.state().current, Some(track(1)));
    }

    #[test]
    fn loading_lasts_until_the_latest_search_answers() {
        let mut app = test_app();
        app.search_started(1);
        app.search_started(2);
        app.apply_search_outcome(outcome(1, Ok(vec![track(1)])));
        assert!(app.is_loading());

        app.apply_search_outcome(outcome(2, Ok(vec![track(2)])));
        assert!(!app.is_loading());
    }

    #[test]
    fn skip_status_reports_the_real_step() {
        let mut app = test_app();
        press(&mut app, KeyCode::Right);
        assert_eq!(app.status, "+10s");
    }

    #[test]
    fn media_end_without_repeat_advances_through_results() {
        let mut app = test_app();
        app.search_started(1);
        app.apply_search_outcome(outcome(1, Ok(vec![track(1), track(2)])));
        app.play_selected();

        app.player.backend_mut().advance(Duration::from_secs(31));
        app.poll_media();

        assert_eq!(app.player.state().current, Some(track(2)));
    }
}
