use chrono::Local;
use color_eyre::Result;
use crossterm::{
    event::{DisableFocusChange, EnableFocusChange},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{BarChart, Block, Borders, Clear, List, ListItem, ListState, Paragraph, Sparkline, Wrap},
    Frame, Terminal,
};
use std::io::{stdout, Stdout};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::app::{App, Focus, Modal, Screen};
use crate::insights::{Insights, WEEKDAYS};
use crate::journal_entry::MOOD_LABELS;
use crate::playback::PlaybackState;
use crate::text_input::TextInput;

/// Owns the terminal for the lifetime of the app and restores it on drop.
pub struct Tui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Tui {
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        stdout()
            .execute(EnterAlternateScreen)?
            .execute(EnableFocusChange)?;

        let backend = CrosstermBackend::new(stdout());
        let terminal = Terminal::new(backend)?;

        Ok(Tui { terminal })
    }

    pub fn draw(&mut self, render: impl FnOnce(&mut Frame)) -> Result<()> {
        self.terminal.draw(render)?;
        Ok(())
    }
}

impl Drop for Tui {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = stdout().execute(DisableFocusChange);
        let _ = stdout().execute(LeaveAlternateScreen);
    }
}

/// Cuts `text` to at most `width` columns, marking the cut with an ellipsis.
pub fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

fn title_style() -> Style {
    Style::default()
        .fg(Color::Cyan)
        .add_modifier(Modifier::BOLD)
}

fn help_line(keys: &[(&str, &str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, (key, action)) in keys.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw(", "));
        }
        spans.push(Span::styled(
            key.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!(" {action}")));
    }
    Line::from(spans)
}

fn render_help(f: &mut Frame, area: Rect, keys: &[(&str, &str)]) {
    let help = Paragraph::new(help_line(keys))
        .style(Style::default().fg(Color::Yellow))
        .alignment(Alignment::Center);
    f.render_widget(help, area);
}

fn render_header(f: &mut Frame, area: Rect, title: &str) {
    let header = Paragraph::new(title)
        .style(title_style())
        .alignment(Alignment::Center);
    f.render_widget(header, area);
}

fn screen_chunks(area: Rect) -> (Rect, Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(5),
            Constraint::Length(2),
        ])
        .split(area);
    (chunks[0], chunks[1], chunks[2])
}

pub fn draw(f: &mut Frame, app: &App) {
    match app.screen {
        Screen::Journal => draw_journal(f, app),
        Screen::Insights => draw_insights(f, app),
        Screen::Community => draw_community(f, app),
        Screen::Resources => draw_resources(f, app),
    }
    if let Some(modal) = &app.modal {
        draw_modal(f, app, modal);
    }
}

fn draw_journal(f: &mut Frame, app: &App) {
    let (header, body, footer) = screen_chunks(f.area());
    render_header(f, header, "Voice Journal");

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(32), Constraint::Percentage(68)])
        .split(body);
    draw_entry_list(f, app, columns[0]);
    draw_editor(f, app, columns[1]);

    let keys: &[(&str, &str)] = match app.focus {
        Focus::Entries => &[
            ("n", "new"),
            ("Enter", "open"),
            ("d", "delete"),
            ("m", "mood"),
            ("p", "play"),
            ("/", "search"),
            ("r", "voice note"),
            ("v", "calibrate voice"),
            ("i", "insights"),
            ("c", "community"),
            ("h", "help nearby"),
            ("l", "login"),
            ("q", "quit"),
        ],
        Focus::Title => &[("Enter", "to content"), ("Ctrl+P", "play"), ("Esc", "to list")],
        Focus::Content => &[("Tab/Esc", "to list"), ("Ctrl+P", "play")],
    };
    render_help(f, footer, keys);
}

fn draw_entry_list(f: &mut Frame, app: &App, area: Rect) {
    let width = area.width.saturating_sub(4) as usize;
    let current_id = app.store.current().map(|entry| &entry.id);
    let items: Vec<ListItem> = app
        .visible_entries()
        .iter()
        .map(|entry| {
            let marker = if Some(&entry.id) == current_id { "● " } else { "" };
            let mood = entry
                .mood
                .as_ref()
                .map(|mood| format!(" · {}", mood.label))
                .unwrap_or_default();
            ListItem::new(vec![
                Line::from(Span::styled(
                    truncate(&format!("{marker}{}", entry.title), width),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    truncate(&format!("{}{mood}", entry.date.format("%b %-d, %H:%M")), width),
                    Style::default().fg(Color::DarkGray),
                )),
                Line::from(truncate(&entry.preview().replace('\n', " "), width)),
            ])
        })
        .collect();

    let title = if app.store.is_loading() { "Entries (loading…)" } else { "Entries" };
    let border = if app.focus == Focus::Entries { Color::Cyan } else { Color::Reset };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(app.highlighted));
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_editor(f: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3), Constraint::Length(3)])
        .split(area);

    let focused = |focus| {
        if app.focus == focus {
            Style::default().fg(Color::Cyan)
        } else {
            Style::default()
        }
    };

    let title = Paragraph::new(app.title.text()).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(focused(Focus::Title))
            .title("Title"),
    );
    f.render_widget(title, rows[0]);

    let inner_height = rows[1].height.saturating_sub(2);
    let (line, _) = app.content.line_col();
    let scroll = (line as u16).saturating_sub(inner_height.saturating_sub(1));
    let content = Paragraph::new(app.content.text())
        .scroll((scroll, 0))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(focused(Focus::Content))
                .title("Entry"),
        );
    f.render_widget(content, rows[1]);

    match app.focus {
        Focus::Title => place_cursor(f, &app.title, rows[0], 0),
        Focus::Content => place_cursor(f, &app.content, rows[1], scroll),
        Focus::Entries => {}
    }

    f.render_widget(status_bar(app), rows[2]);
}

fn place_cursor(f: &mut Frame, input: &TextInput, area: Rect, scroll: u16) {
    let (line, column) = input.line_col();
    let prefix: String = input
        .text()
        .split('\n')
        .nth(line)
        .unwrap_or("")
        .chars()
        .take(column)
        .collect();
    let x = area.x + 1 + prefix.width() as u16;
    let y = area.y + 1 + (line as u16).saturating_sub(scroll);
    if x < area.right().saturating_sub(1) && y < area.bottom().saturating_sub(1) {
        f.set_cursor_position(Position::new(x, y));
    }
}

fn status_bar(app: &App) -> Paragraph<'static> {
    let saved = if app.store.is_saved() {
        Span::styled("Saved", Style::default().fg(Color::Green))
    } else {
        Span::styled("Saving…", Style::default().fg(Color::Yellow))
    };
    let playback = match app.player.state() {
        PlaybackState::Idle if app.store.is_playback_ready() => {
            Span::styled("▶ ready", Style::default().fg(Color::Green))
        }
        PlaybackState::Idle => Span::styled("▶ preparing", Style::default().fg(Color::DarkGray)),
        PlaybackState::Loading => Span::styled("loading audio…", Style::default().fg(Color::Yellow)),
        PlaybackState::Playing => Span::styled(
            format!("■ playing {}", app.player.elapsed_label()),
            Style::default().fg(Color::Cyan),
        ),
        PlaybackState::Paused(_) => Span::styled(
            format!("‖ paused {}", app.player.elapsed_label()),
            Style::default().fg(Color::DarkGray),
        ),
    };
    let mood = app
        .store
        .current()
        .and_then(|entry| entry.mood.as_ref())
        .map(|mood| format!("Mood: {}", mood.label))
        .unwrap_or_else(|| "Mood: not set".to_string());

    let mut spans = vec![saved, Span::raw("  |  "), playback, Span::raw("  |  "), Span::raw(mood)];
    if let Some(status) = &app.status {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Magenta)));
    }
    Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL))
}

fn draw_insights(f: &mut Frame, app: &App) {
    let (header, body, footer) = screen_chunks(f.area());
    render_header(f, header, "Insights");
    let insights = Insights::compute(app.store.get_entries(), Local::now().date_naive());

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(9),
            Constraint::Min(4),
        ])
        .split(body);

    let words: Vec<u64> = insights
        .writing_activity
        .iter()
        .map(|day| day.value as u64)
        .collect();
    let range = match (insights.writing_activity.first(), insights.writing_activity.last()) {
        (Some(first), Some(last)) => format!("Words written, {} to {}", first.label, last.label),
        _ => "Words written".to_string(),
    };
    let activity = Sparkline::default()
        .block(Block::default().borders(Borders::ALL).title(range))
        .data(&words)
        .style(Style::default().fg(Color::Cyan));
    f.render_widget(activity, rows[0]);

    let middle = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(rows[1]);

    let weekly: Vec<(&str, u64)> = WEEKDAYS
        .iter()
        .zip(insights.weekly_activity.iter())
        .map(|(day, count)| (*day, *count as u64))
        .collect();
    let weekly_title = match insights.most_active_day {
        Some(day) => format!("Entries by weekday, most on {day}"),
        None => "Entries by weekday".to_string(),
    };
    let chart = BarChart::default()
        .block(Block::default().borders(Borders::ALL).title(weekly_title))
        .data(weekly.as_slice())
        .bar_width(4)
        .bar_gap(1)
        .bar_style(Style::default().fg(Color::Yellow));
    f.render_widget(chart, middle[0]);

    let mood_lines: Vec<Line> = if insights.mood_trend.is_empty() {
        vec![Line::from("No moods recorded in the last two weeks")]
    } else {
        insights
            .mood_trend
            .iter()
            .map(|day| {
                let label = MOOD_LABELS[(day.value.round() as usize).clamp(1, 5) - 1];
                Line::from(format!(
                    "{:<7} {:<5} {:.1} {label}",
                    day.label,
                    "★".repeat(day.value.round() as usize),
                    day.value
                ))
            })
            .collect()
    };
    let mood = Paragraph::new(mood_lines)
        .block(Block::default().borders(Borders::ALL).title("Mood trend"));
    f.render_widget(mood, middle[1]);

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[2]);

    let stats = &insights.consistency;
    let streaks = Paragraph::new(vec![
        Line::from(format!("Current streak: {} days", stats.current_streak)),
        Line::from(format!("Longest streak: {} days", stats.longest_streak)),
        Line::from(format!("Days written:   {}", stats.writing_days)),
    ])
    .block(Block::default().borders(Borders::ALL).title("Consistency"));
    f.render_widget(streaks, bottom[0]);

    let themes: Vec<ListItem> = insights
        .themes
        .iter()
        .map(|theme| ListItem::new(format!("{} ({})", theme.word, theme.count)))
        .collect();
    let themes = List::new(themes).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Recurring themes"),
    );
    f.render_widget(themes, bottom[1]);

    render_help(f, footer, &[("Esc", "back")]);
}

fn draw_community(f: &mut Frame, app: &App) {
    let (header, body, footer) = screen_chunks(f.area());
    render_header(f, header, "Community");

    let stories = app.community.stories();
    let block_title = if app.community_loading {
        "Loading stories…".to_string()
    } else if stories.is_empty() {
        "No stories yet".to_string()
    } else {
        format!("Story {} of {}", app.community.index() + 1, stories.len())
    };

    let mut lines = Vec::new();
    if let Some(story) = app.community.current() {
        if !story.title.is_empty() {
            lines.push(Line::from(Span::styled(story.title.clone(), title_style())));
        }
        lines.push(Line::from(Span::styled(
            story.time_ago.clone(),
            Style::default().fg(Color::DarkGray),
        )));
        lines.push(Line::from(""));
        lines.extend(story.content.lines().map(|line| Line::from(line.to_string())));
        lines.push(Line::from(""));
        let playing = match app.player.state() {
            PlaybackState::Idle => "▶ press p to listen".to_string(),
            PlaybackState::Loading => "loading audio…".to_string(),
            PlaybackState::Playing => format!("■ playing {}", app.player.elapsed_label()),
            PlaybackState::Paused(_) => format!("‖ paused {}", app.player.elapsed_label()),
        };
        lines.push(Line::from(Span::styled(playing, Style::default().fg(Color::Cyan))));
    } else {
        lines.push(Line::from(
            "Stories others have shared anonymously will show up here.",
        ));
    }

    let story = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(block_title));
    f.render_widget(story, body);

    render_help(
        f,
        footer,
        &[("Up/Down", "browse"), ("p", "listen"), ("r", "reload"), ("Esc", "back")],
    );
}

fn draw_resources(f: &mut Frame, app: &App) {
    let (header, body, footer) = screen_chunks(f.area());
    render_header(f, header, "Support near you");

    let items: Vec<ListItem> = app
        .resources
        .iter()
        .map(|resource| {
            let mut lines = vec![Line::from(Span::styled(
                resource.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ))];
            if !resource.description.is_empty() {
                lines.push(Line::from(resource.description.clone()));
            }
            let contact: Vec<&str> = [
                Some(resource.address.as_str()).filter(|a| !a.is_empty()),
                resource.phone.as_deref(),
                resource.website.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect();
            if !contact.is_empty() {
                lines.push(Line::from(Span::styled(
                    contact.join(" · "),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            ListItem::new(lines)
        })
        .collect();

    let title = if app.resources_loading {
        "Looking for resources…"
    } else if app.resources.is_empty() {
        "Nothing found for this entry"
    } else {
        "Resources"
    };
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(list, body);

    render_help(f, footer, &[("Esc", "back")]);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_path_prompt(f: &mut Frame, area: Rect, path: &TextInput, title: &str, action: &str) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(1)])
        .split(area);
    let input = Paragraph::new(path.text()).block(Block::default().borders(Borders::ALL).title(title.to_string()));
    f.render_widget(input, rows[0]);
    place_cursor(f, path, rows[0], 0);
    render_help(f, rows[1], &[("Enter", action), ("Esc", "cancel")]);
}

fn draw_modal(f: &mut Frame, app: &App, modal: &Modal) {
    let area = match modal {
        Modal::Search { .. } => centered(f.area(), 60, 16),
        _ => centered(f.area(), 56, 8),
    };
    f.render_widget(Clear, area);

    match modal {
        Modal::Mood { selected } => {
            let spans: Vec<Span> = MOOD_LABELS
                .iter()
                .enumerate()
                .flat_map(|(i, label)| {
                    let style = if i + 1 == usize::from(*selected) {
                        Style::default().fg(Color::Black).bg(Color::Cyan)
                    } else {
                        Style::default()
                    };
                    [Span::styled(format!(" {} {label} ", i + 1), style), Span::raw(" ")]
                })
                .collect();
            let body = Paragraph::new(vec![
                Line::from(spans),
                Line::from(""),
                help_line(&[("Left/Right", "choose"), ("Enter", "save"), ("Esc", "cancel")]),
            ])
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("How are you feeling?"));
            f.render_widget(body, area);
        }
        Modal::ConfirmDelete { title, .. } => {
            let body = Paragraph::new(vec![
                Line::from(format!("Delete \"{title}\"?")),
                Line::from("This cannot be undone."),
                Line::from(""),
                help_line(&[("y", "delete"), ("n", "keep")]),
            ])
            .block(Block::default().borders(Borders::ALL).title("Delete entry"));
            f.render_widget(body, area);
        }
        Modal::Search { query, selected } => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(3)])
                .split(area);
            let input = Paragraph::new(query.text())
                .block(Block::default().borders(Borders::ALL).title("Search"));
            f.render_widget(input, rows[0]);
            place_cursor(f, query, rows[0], 0);

            let width = rows[1].width.saturating_sub(4) as usize;
            let results: Vec<ListItem> = app
                .search_results()
                .iter()
                .map(|entry| {
                    ListItem::new(truncate(
                        &format!("{}: {}", entry.title, entry.preview().replace('\n', " ")),
                        width,
                    ))
                })
                .collect();
            let list = List::new(results)
                .block(Block::default().borders(Borders::ALL).title("Matches"))
                .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
            let mut state = ListState::default().with_selected(Some(*selected));
            f.render_stateful_widget(list, rows[1], &mut state);
        }
        Modal::Record { path } => {
            draw_path_prompt(f, area, path, "Recording to transcribe", "transcribe");
        }
        Modal::Calibrate { path } => {
            draw_path_prompt(f, area, path, "Voice sample for narration", "upload");
        }
        Modal::Login {
            username,
            password,
            on_password,
        } => {
            let rows = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Length(3), Constraint::Min(1)])
                .split(area);
            let user = Paragraph::new(username.text())
                .block(Block::default().borders(Borders::ALL).title("Username"));
            f.render_widget(user, rows[0]);
            let masked = "*".repeat(password.text().chars().count());
            let pass = Paragraph::new(masked)
                .block(Block::default().borders(Borders::ALL).title("Password"));
            f.render_widget(pass, rows[1]);
            if *on_password {
                let masked_input = TextInput::new(&"*".repeat(password.text().chars().count()));
                place_cursor(f, &masked_input, rows[1], 0);
            } else {
                place_cursor(f, username, rows[0], 0);
            }
            render_help(f, rows[2], &[("Tab", "switch"), ("Enter", "log in"), ("Esc", "cancel")]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_counts_display_columns() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a longer title", 8), "a longe…");
        // wide characters take two columns each
        assert_eq!(truncate("日記を書く", 6), "日記…");
        assert!(truncate("日記を書く", 6).width() <= 6);
    }

    #[test]
    fn help_line_bolds_keys() {
        let line = help_line(&[("q", "quit"), ("n", "new")]);
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "q quit, n new");
        assert!(line.spans[0].style.add_modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn centered_fits_inside() {
        let outer = Rect::new(0, 0, 40, 10);
        let inner = centered(outer, 60, 8);
        assert_eq!(inner, Rect::new(0, 1, 40, 8));
    }
}
