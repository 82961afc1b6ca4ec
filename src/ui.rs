use crate::app::App;
use crate::audio::MediaBackend;
use crate::model::{PlaybackState, ViewTab};
use crate::suggest::QUICK_SEARCHES;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use std::time::Duration;

const APP_TITLE_WITH_VERSION: &str = concat!("Chime v", env!("CARGO_PKG_VERSION"), "  ");

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    panel_alt_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    favorite: Color,
    selected_bg: Color,
}

const COLORS: Palette = Palette {
    bg: Color::Rgb(34, 21, 44),
    panel_bg: Color::Rgb(51, 29, 68),
    panel_alt_bg: Color::Rgb(66, 38, 86),
    border: Color::Rgb(245, 146, 208),
    text: Color::Rgb(255, 233, 250),
    muted: Color::Rgb(224, 173, 219),
    accent: Color::Rgb(124, 225, 255),
    alert: Color::Rgb(255, 199, 150),
    favorite: Color::Rgb(255, 105, 180),
    selected_bg: Color::Rgb(90, 49, 114),
};

pub fn draw<B: MediaBackend>(frame: &mut Frame, app: &App<B>) {
    let colors = COLORS;
    let state = app.player.state();
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    draw_header(frame, app, vertical[0], &colors);
    draw_search(frame, app, vertical[1], &colors);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(66), Constraint::Percentage(34)])
        .split(vertical[2]);
    draw_track_list(frame, app, body[0], &colors);
    draw_track_info(frame, app, body[1], &colors);

    let timeline = Paragraph::new(Span::styled(
        timeline_line(state, 26, 14),
        Style::default().fg(colors.text),
    ))
    .block(panel_block(
        "Now Playing",
        colors.panel_bg,
        colors.text,
        colors.border,
    ))
    .wrap(Wrap { trim: true });
    frame.render_widget(timeline, vertical[3]);

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(
            "/ search  Tab view  Enter play  Space pause  n/p next/prev  <-/-> skip  f fav  s shuffle  r repeat  x close  q quit",
            Style::default().fg(colors.muted),
        ),
        Span::styled("  |  ", Style::default().fg(colors.muted)),
        Span::styled(app.status.as_str(), Style::default().fg(colors.text)),
    ]))
    .block(panel_block(
        "Message",
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(footer, vertical[4]);
}

fn draw_header<B: MediaBackend>(frame: &mut Frame, app: &App<B>, area: Rect, colors: &Palette) {
    frame.render_widget(
        panel_block("Chime", colors.panel_bg, colors.text, colors.border),
        area,
    );
    let inner = area.inner(Margin {
        vertical: 1,
        horizontal: 1,
    });
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let state = app.player.state();
    let flag = |on: bool, label: &'static str| {
        let style = if on {
            Style::default().fg(colors.alert).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(colors.muted)
        };
        Span::styled(label, style)
    };
    let left = Paragraph::new(Line::from(vec![
        Span::styled(
            APP_TITLE_WITH_VERSION,
            Style::default()
                .fg(colors.accent)
                .add_modifier(Modifier::BOLD),
        ),
        flag(state.shuffle, "Shuffle"),
        Span::styled("  ", Style::default()),
        flag(state.repeat, "Repeat"),
        Span::styled(
            format!("  |  {}", app.player.backend().name()),
            Style::default().fg(colors.muted),
        ),
    ]));
    frame.render_widget(left, chunks[0]);

    let right = Paragraph::new(tab_line(app, colors)).alignment(Alignment::Right);
    frame.render_widget(right, chunks[1]);
}

fn tab_line<B: MediaBackend>(app: &App<B>, colors: &Palette) -> Line<'static> {
    let mut spans = Vec::new();
    for (idx, tab) in [ViewTab::Home, ViewTab::Favorites, ViewTab::History]
        .into_iter()
        .enumerate()
    {
        if idx > 0 {
            spans.push(Span::styled(" -- ", Style::default().fg(colors.muted)));
        }
        let label = match tab {
            ViewTab::Favorites if !app.favorites.is_empty() => {
                format!("{} ({})", tab.title(), app.favorites.len())
            }
            _ => tab.title().to_string(),
        };
        let mut style = Style::default().fg(colors.accent);
        if tab == app.tab {
            style = style.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
        }
        spans.push(Span::styled(label, style));
    }
    Line::from(spans)
}

fn draw_search<B: MediaBackend>(frame: &mut Frame, app: &App<B>, area: Rect, colors: &Palette) {
    let mut spans = vec![Span::styled(
        if app.search_mode { "> " } else { "  " },
        Style::default().fg(colors.accent),
    )];
    if app.search_input.is_empty() && !app.search_mode {
        spans.push(Span::styled(
            "Search songs or artists...",
            Style::default().fg(colors.muted),
        ));
    } else {
        spans.push(Span::styled(
            app.search_input.as_str(),
            Style::default().fg(colors.text),
        ));
    }
    if app.search_mode && !app.suggestions.is_empty() {
        spans.push(Span::styled(
            format!("   Tab: {}", app.suggestions.join(" | ")),
            Style::default().fg(colors.muted),
        ));
    }
    let title = if app.is_loading() { "Search (loading)" } else { "Search" };
    let search = Paragraph::new(Line::from(spans)).block(panel_block(
        title,
        colors.panel_bg,
        colors.text,
        colors.border,
    ));
    frame.render_widget(search, area);
}

fn draw_quick_searches<B: MediaBackend>(
    frame: &mut Frame,
    app: &App<B>,
    area: Rect,
    colors: &Palette,
) {
    let items: Vec<ListItem> = QUICK_SEARCHES
        .iter()
        .map(|(label, query)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!("  {label:<12}"), Style::default().fg(colors.text)),
                Span::styled(*query, Style::default().fg(colors.muted)),
            ]))
        })
        .collect();

    let mut list_state = ListState::default();
    list_state.select(Some(app.selected));
    let list = List::new(items)
        .block(panel_block(
            "Popular Searches (Enter to search)",
            colors.panel_bg,
            colors.text,
            colors.border,
        ))
        .highlight_style(
            Style::default()
                .bg(colors.selected_bg)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_track_list<B: MediaBackend>(frame: &mut Frame, app: &App<B>, area: Rect, colors: &Palette) {
    if app.showing_quick_searches() {
        draw_quick_searches(frame, app, area, colors);
        return;
    }

    let state = app.player.state();
    let tracks = app.visible_tracks();
    let items: Vec<ListItem> = tracks
        .iter()
        .map(|track| {
            let marker = if state.is_current(track) {
                if state.playing { "  > " } else { "  = " }
            } else {
                "    "
            };
            let heart = if app.favorites.is_favorite(track.id) {
                "<3 "
            } else {
                "   "
            };
            ListItem::new(Line::from(vec![
                Span::styled(marker, Style::default().fg(colors.muted)),
                Span::styled(heart, Style::default().fg(colors.favorite)),
                Span::styled(track.label(), Style::default().fg(colors.text)),
            ]))
        })
        .collect();

    let empty_hint = match app.tab {
        ViewTab::Home => "Searching...",
        ViewTab::Favorites => "No favorites yet. Press f on a song to add it",
        ViewTab::History => "Your listening history will appear here",
    };
    let title = match app.tab {
        ViewTab::History if !tracks.is_empty() => String::from("Recently Played (c to clear)"),
        tab => tab.title().to_string(),
    };
    let block = panel_block(&title, colors.panel_bg, colors.text, colors.border);

    if items.is_empty() {
        let hint = Paragraph::new(Span::styled(empty_hint, Style::default().fg(colors.muted)))
            .block(block);
        frame.render_widget(hint, area);
        return;
    }

    let mut list_state = ListState::default();
    list_state.select(Some(app.selected));
    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(colors.selected_bg)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("-> ");
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn draw_track_info<B: MediaBackend>(frame: &mut Frame, app: &App<B>, area: Rect, colors: &Palette) {
    let dash = String::from("-");
    let mut lines = Vec::new();
    for (heading, track) in [
        ("Now", app.player.state().current.as_ref()),
        ("Selected", app.selected_track()),
    ] {
        if !lines.is_empty() {
            lines.push(Line::from(""));
        }
        lines.push(Line::from(vec![
            Span::styled(
                heading,
                Style::default()
                    .fg(colors.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("  {}", track.map_or(dash.as_str(), |t| t.title.as_str())),
                Style::default().fg(colors.text),
            ),
        ]));
        lines.push(Line::from(Span::styled(
            format!(
                "Artist  {}",
                track.map_or(dash.as_str(), |t| t.artist_name.as_str())
            ),
            Style::default().fg(colors.muted),
        )));
        lines.push(Line::from(Span::styled(
            format!(
                "Album   {}",
                track
                    .and_then(|t| t.album.as_deref())
                    .unwrap_or(dash.as_str())
            ),
            Style::default().fg(colors.muted),
        )));
        if let Some(track) = track {
            lines.push(Line::from(Span::styled(
                format!(
                    "Length  {}",
                    format_duration(Duration::from_millis(track.duration_ms))
                ),
                Style::default().fg(colors.alert),
            )));
            if !track.artwork_url.is_empty() {
                lines.push(Line::from(Span::styled(
                    format!("Cover   {}", track.artwork_url_large()),
                    Style::default().fg(colors.muted),
                )));
            }
        }
    }

    let info = Paragraph::new(lines)
        .block(panel_block(
            "Song Info",
            colors.panel_alt_bg,
            colors.text,
            colors.border,
        ))
        .wrap(Wrap { trim: true });
    frame.render_widget(info, area);
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}

fn timeline_line(state: &PlaybackState, timeline_bar_width: usize, volume_bar_width: usize) -> String {
    let title = state
        .current
        .as_ref()
        .map(|track| track.label())
        .unwrap_or_else(|| String::from("Nothing playing"));
    let marker = match (&state.current, state.playing) {
        (None, _) => "  ",
        (Some(_), true) => "> ",
        (Some(_), false) => "= ",
    };
    let elapsed = Duration::from_secs_f64(state.position.max(0.0));
    let total = state
        .duration_known()
        .then(|| Duration::from_secs_f64(state.duration));

    format!(
        "{marker}{title}  {} / {} {}  |  Vol {} {:>3}%",
        format_duration(elapsed),
        total
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(state.progress_ratio(), timeline_bar_width),
        progress_bar(Some(f64::from(state.volume) / 100.0), volume_bar_width),
        state.volume
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(Some(0.5), 4), "[##--]");
        assert_eq!(progress_bar(None, 3), "[---]");
        assert_eq!(progress_bar(Some(3.0), 2), "[##]");
    }

    #[test]
    fn idle_timeline_shows_unknown_duration() {
        let line = timeline_line(&PlaybackState::default(), 4, 2);
        assert!(line.contains("Nothing playing"));
        assert!(line.contains("00:00 / --:--"));
        assert!(line.ends_with(" 70%"));
    }
}
