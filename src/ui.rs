use crossterm::event::KeyCode;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use std::time::Duration;

use crate::chains::ALL_CHAINS;
use crate::config::{ERROR_SENTINEL, GAS_UNITS, PROJECT_DESCRIPTION, PROJECT_TITLE};
use crate::data::{GasRow, Snapshot};

/// What the dashboard needs to draw one frame.
pub struct View<'a> {
    pub rows: &'a [GasRow],
    pub selection: &'a [u64],
    pub snapshot: Option<&'a Snapshot>,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Tracked,
    Catalog,
}

/// Requests the dashboard makes of the main loop in response to keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Refresh,
    Toggle(u64),
    Remove(u64),
    Add(String),
}

pub struct Dashboard {
    pub should_quit: bool,
    focus: Focus,
    tracked_cursor: usize,
    catalog_cursor: usize,
    /// Text typed into the "chain ID or RPC URL" box while it is open.
    input: Option<String>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self {
            should_quit: false,
            focus: Focus::Tracked,
            tracked_cursor: 0,
            catalog_cursor: 0,
            input: None,
        }
    }

    pub fn quit(&mut self) {
        self.should_quit = true;
    }

    pub fn handle_key(&mut self, code: KeyCode, view: &View) -> Option<Action> {
        if let Some(input) = self.input.as_mut() {
            match code {
                KeyCode::Enter => {
                    let text = self.input.take().unwrap_or_default();
                    return (!text.trim().is_empty()).then_some(Action::Add(text));
                }
                KeyCode::Esc => self.input = None,
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            }
            return None;
        }

        match code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.quit();
                None
            }
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Tracked => Focus::Catalog,
                    Focus::Catalog => Focus::Tracked,
                };
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                let cursor = self.cursor_mut();
                *cursor = cursor.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let len = self.focused_len(view);
                let cursor = self.cursor_mut();
                if *cursor + 1 < len {
                    *cursor += 1;
                }
                None
            }
            KeyCode::Char('a') => {
                self.input = Some(String::new());
                None
            }
            KeyCode::Char('r') => Some(Action::Refresh),
            KeyCode::Char(' ') | KeyCode::Enter => match self.focus {
                Focus::Catalog => ALL_CHAINS.get(self.catalog_cursor).map(|c| Action::Toggle(c.id)),
                Focus::Tracked => self.highlighted_row(view).map(Action::Toggle),
            },
            KeyCode::Char('d') | KeyCode::Delete => match self.focus {
                Focus::Tracked => self.highlighted_row(view).map(Action::Remove),
                Focus::Catalog => None,
            },
            _ => None,
        }
    }

    fn cursor_mut(&mut self) -> &mut usize {
        match self.focus {
            Focus::Tracked => &mut self.tracked_cursor,
            Focus::Catalog => &mut self.catalog_cursor,
        }
    }

    fn focused_len(&self, view: &View) -> usize {
        match self.focus {
            Focus::Tracked => view.rows.len(),
            Focus::Catalog => ALL_CHAINS.len(),
        }
    }

    fn highlighted_row(&self, view: &View) -> Option<u64> {
        let last = view.rows.len().checked_sub(1)?;
        view.rows.get(self.tracked_cursor.min(last)).map(|r| r.chain_id)
    }

    pub fn render(&self, frame: &mut Frame, view: &View) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(4), // header
                Constraint::Min(8),    // gas + catalog
                Constraint::Length(3), // input
                Constraint::Length(4), // help
            ])
            .split(frame.area());

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[1]);

        self.render_header(frame, chunks[0], view);
        self.render_gas_prices(frame, body[0], view);
        self.render_catalog(frame, body[1], view);
        self.render_input(frame, chunks[2]);
        self.render_help(frame, chunks[3], view);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect, view: &View) {
        let updated = match view.snapshot {
            Some(s) => {
                let elapsed = s.fetched_at.elapsed();
                if elapsed < Duration::from_secs(1) {
                    "< 1s ago".to_string()
                } else {
                    format!("{}s ago", elapsed.as_secs())
                }
            }
            None => "loading...".to_string(),
        };
        let (usd_text, usd_style) = match view.snapshot.and_then(|s| s.usd_price) {
            Some(price) => (format!("${:.2}", price), Style::default().fg(Color::Green)),
            None => ("unavailable".to_string(), Style::default().fg(Color::DarkGray)),
        };

        let content = vec![
            Line::from(Span::styled(PROJECT_DESCRIPTION, Style::default().fg(Color::Gray))),
            Line::from(vec![
                Span::styled("Updated: ", Style::default()),
                Span::styled(updated, Style::default().fg(Color::Yellow)),
                Span::raw(" | ETH/USD: "),
                Span::styled(usd_text, usd_style),
            ]),
        ];

        let paragraph =
            Paragraph::new(content).block(Block::default().title(PROJECT_TITLE).borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }

    fn render_gas_prices(&self, frame: &mut Frame, area: Rect, view: &View) {
        let focused = self.focus == Focus::Tracked;
        let cursor = self.tracked_cursor.min(view.rows.len().saturating_sub(1));
        let mut lines: Vec<Line> = Vec::new();

        for (idx, row) in view.rows.iter().enumerate() {
            let (price, price_style) = match (&row.gwei, row.error) {
                (Some(gwei), _) if idx == 0 => (format!("{} Gwei", gwei), Style::default().fg(Color::Green)),
                (Some(gwei), _) => (format!("{} Gwei", gwei), Style::default().fg(Color::Cyan)),
                (None, true) => (ERROR_SENTINEL.to_string(), Style::default().fg(Color::Red)),
                (None, false) => ("N/A".to_string(), Style::default().fg(Color::DarkGray)),
            };
            let usd = row
                .usd_estimate
                .map(|u| format!("~${:.2}", u))
                .unwrap_or_default();

            let name_style = if focused && idx == cursor {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };

            lines.push(Line::from(vec![
                Span::styled(format!("{:<14}", row.name), name_style),
                Span::styled(format!("{:>16}", price), price_style),
                Span::styled(format!("  {}", usd), Style::default().fg(Color::Magenta)),
            ]));
        }

        if lines.is_empty() {
            lines.push(Line::from(Span::styled(
                "(no chains tracked, press 'a' to add one)",
                Style::default().fg(Color::DarkGray),
            )));
        }

        let title = format!("Gas Prices (Gwei, ~USD for {} gas)", GAS_UNITS);
        let paragraph = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().title(title).borders(Borders::ALL).border_style(border(focused)));
        frame.render_widget(paragraph, area);
    }

    fn render_catalog(&self, frame: &mut Frame, area: Rect, view: &View) {
        let focused = self.focus == Focus::Catalog;
        let lines: Vec<Line> = ALL_CHAINS
            .iter()
            .enumerate()
            .map(|(idx, chain)| {
                let tracked = view.selection.contains(&chain.id);
                let marker = if tracked { "[x] " } else { "[ ] " };
                let style = match (focused && idx == self.catalog_cursor, tracked) {
                    (true, _) => Style::default().add_modifier(Modifier::REVERSED),
                    (false, true) => Style::default().fg(Color::Green),
                    (false, false) => Style::default().fg(Color::Gray),
                };
                Line::from(Span::styled(format!("{}{}", marker, chain.name), style))
            })
            .collect();

        let paragraph = Paragraph::new(lines)
            .block(Block::default().title("Chains").borders(Borders::ALL).border_style(border(focused)));
        frame.render_widget(paragraph, area);
    }

    fn render_input(&self, frame: &mut Frame, area: Rect) {
        let content = match &self.input {
            Some(text) => Line::from(vec![
                Span::styled(text.as_str(), Style::default().fg(Color::Yellow)),
                Span::styled("_", Style::default().add_modifier(Modifier::SLOW_BLINK)),
            ]),
            None => Line::from(Span::styled(
                "press 'a' to add a chain ID or RPC URL",
                Style::default().fg(Color::DarkGray),
            )),
        };
        let paragraph = Paragraph::new(content)
            .block(Block::default().title("Add Chain").borders(Borders::ALL).border_style(border(self.input.is_some())));
        frame.render_widget(paragraph, area);
    }

    fn render_help(&self, frame: &mut Frame, area: Rect, view: &View) {
        let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));
        let help_text = vec![
            Line::from(vec![
                key("'q'"),
                Span::raw(" quit  "),
                key("Tab"),
                Span::raw(" switch panel  "),
                key("Space"),
                Span::raw(" toggle  "),
                key("'d'"),
                Span::raw(" remove  "),
                key("'a'"),
                Span::raw(" add  "),
                key("'r'"),
                Span::raw(" refresh"),
            ]),
            Line::from(vec![
                Span::styled("Updates every ", Style::default()),
                Span::styled(
                    format!("{} seconds", view.interval.as_secs()),
                    Style::default().fg(Color::Cyan),
                ),
            ]),
        ];

        let paragraph =
            Paragraph::new(help_text).block(Block::default().title("Help").borders(Borders::ALL));
        frame.render_widget(paragraph, area);
    }
}

fn border(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{GasReading, rows};
    use ratatui::{Terminal, backend::TestBackend};
    use std::collections::HashMap;
    use std::time::Instant;

    fn snapshot() -> Snapshot {
        let readings: HashMap<u64, GasReading> = [
            (1, GasReading::Gwei("12".into())),
            (10, GasReading::Gwei("0.001".into())),
            (8453, GasReading::Error),
        ]
        .into_iter()
        .collect();
        Snapshot {
            readings,
            usd_price: Some(3000.0),
            fetched_at: Instant::now(),
        }
    }

    fn press(dashboard: &mut Dashboard, codes: &[KeyCode], snapshot: &Snapshot, selection: &[u64]) -> Vec<Action> {
        let rows = rows(Some(snapshot), selection);
        let view = View {
            rows: &rows,
            selection,
            snapshot: Some(snapshot),
            interval: Duration::from_secs(30),
        };
        codes.iter().filter_map(|&c| dashboard.handle_key(c, &view)).collect()
    }

    #[test]
    fn remove_targets_sorted_row() {
        let snap = snapshot();
        let mut dashboard = Dashboard::new();
        // sorted order is [10, 1, 8453]
        let actions = press(&mut dashboard, &[KeyCode::Down, KeyCode::Char('d')], &snap, &[1, 10, 8453]);
        assert_eq!(actions, vec![Action::Remove(1)]);
    }

    #[test]
    fn catalog_toggle_uses_catalog_order() {
        let snap = snapshot();
        let mut dashboard = Dashboard::new();
        let actions = press(
            &mut dashboard,
            &[KeyCode::Tab, KeyCode::Down, KeyCode::Down, KeyCode::Down, KeyCode::Down, KeyCode::Char(' ')],
            &snap,
            &[1],
        );
        assert_eq!(actions, vec![Action::Toggle(137)]);
    }

    #[test]
    fn cursor_stops_at_ends() {
        let snap = snapshot();
        let mut dashboard = Dashboard::new();
        let actions = press(
            &mut dashboard,
            &[KeyCode::Up, KeyCode::Down, KeyCode::Down, KeyCode::Down, KeyCode::Down, KeyCode::Enter],
            &snap,
            &[1, 10, 8453],
        );
        assert_eq!(actions, vec![Action::Toggle(8453)]);
    }

    #[test]
    fn input_box_collects_text() {
        let snap = snapshot();
        let mut dashboard = Dashboard::new();
        let keys = [
            KeyCode::Char('a'),
            KeyCode::Char('1'),
            KeyCode::Char('3'),
            KeyCode::Char('8'),
            KeyCode::Backspace,
            KeyCode::Char('7'),
            // 'q' is text while the box is open
            KeyCode::Char('q'),
            KeyCode::Backspace,
            KeyCode::Enter,
        ];
        let actions = press(&mut dashboard, &keys, &snap, &[1]);
        assert_eq!(actions, vec![Action::Add("137".into())]);
        assert!(!dashboard.should_quit);
    }

    #[test]
    fn escape_closes_input_without_adding() {
        let snap = snapshot();
        let mut dashboard = Dashboard::new();
        let actions = press(
            &mut dashboard,
            &[KeyCode::Char('a'), KeyCode::Char('5'), KeyCode::Esc, KeyCode::Char('r')],
            &snap,
            &[1],
        );
        assert_eq!(actions, vec![Action::Refresh]);
        assert!(!dashboard.should_quit);

        press(&mut dashboard, &[KeyCode::Esc], &snap, &[1]);
        assert!(dashboard.should_quit);
    }

    #[test]
    fn renders_sorted_prices() {
        let snap = snapshot();
        let selection = [1, 10, 8453, 999999];
        let rows = rows(Some(&snap), &selection);
        let view = View {
            rows: &rows,
            selection: &selection,
            snapshot: Some(&snap),
            interval: Duration::from_secs(30),
        };
        let dashboard = Dashboard::new();
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| dashboard.render(frame, &view)).unwrap();

        let buffer = terminal.backend().buffer();
        let width = buffer.area.width as usize;
        let lines: Vec<String> = buffer
            .content
            .chunks(width)
            .map(|row| row.iter().map(|c| c.symbol()).collect())
            .collect();
        // left panel only, so catalog entries do not interfere
        let gas_panel: Vec<String> = buffer
            .content
            .chunks(width)
            .map(|row| row[..60].iter().map(|c| c.symbol()).collect())
            .collect();
        let line_of = |needle: &str| gas_panel.iter().position(|l| l.contains(needle)).unwrap();

        assert!(line_of("Optimism") < line_of("Ethereum"));
        assert!(line_of("Ethereum") < line_of("Base"));
        assert!(line_of("Base") < line_of("Chain 999999"));
        assert!(gas_panel[line_of("Optimism")].contains("0.001 Gwei"));
        assert!(gas_panel[line_of("Base")].contains("Error"));
        let text = lines.concat();
        assert!(text.contains("$3000.00"));
    }
}
