//! Interactive terminal view of the gamma table.
//!
//! Key handling is kept in [`TableApp`] and is pure: it returns an [`Action`]
//! for the event loop to carry out. Drawing reads the orchestrator's current
//! [`LoadState`] and never changes it.

use std::io::{self, Stdout};

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use futures::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction as LayoutDirection, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Cell, Paragraph, Row, Table, Tabs, Wrap};
use ratatui::{Frame, Terminal};
use tracing::{debug, info};

use crate::engine::orchestrator::{Command, FetchOrchestrator};
use crate::engine::types::{LoadState, Symbol};
use crate::view::columns::{CellClass, ColumnSpec};
use crate::view::table::{cell_grid, display_order, toggle_sort, Direction, SortState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Quit,
    Dispatch(Command),
}

pub struct TableApp {
    symbols: Vec<Symbol>,
    selected: usize,
    columns: ColumnSpec,
    sort: Option<SortState>,
}

impl TableApp {
    pub fn new(symbols: Vec<Symbol>, current: &Symbol, columns: ColumnSpec) -> Self {
        let mut symbols = symbols;
        let selected = match symbols.iter().position(|s| s == current) {
            Some(i) => i,
            None => {
                symbols.insert(0, current.clone());
                0
            }
        };
        Self { symbols, selected, columns, sort: None }
    }

    pub fn selected_symbol(&self) -> &Symbol {
        &self.symbols[self.selected]
    }

    pub fn sort(&self) -> Option<SortState> {
        self.sort
    }

    fn cycle(&mut self, forward: bool) -> Action {
        if self.symbols.len() < 2 {
            return Action::None;
        }
        let n = self.symbols.len();
        self.selected = if forward { (self.selected + 1) % n } else { (self.selected + n - 1) % n };
        Action::Dispatch(Command::ChangeSymbol(self.selected_symbol().to_string()))
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Action {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            KeyCode::Char('r') => Action::Dispatch(Command::Refresh),
            KeyCode::Tab => self.cycle(true),
            KeyCode::BackTab => self.cycle(false),
            KeyCode::Char(c @ '1'..='9') => {
                let column = c as usize - '1' as usize;
                self.sort = toggle_sort(self.sort, &self.columns, column);
                Action::None
            }
            _ => Action::None,
        }
    }

    fn draw(&self, f: &mut Frame, state: &LoadState) {
        let chunks = Layout::default()
            .direction(LayoutDirection::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(3), Constraint::Length(1)])
            .split(f.size());

        self.draw_controls(f, chunks[0], state);
        match state {
            LoadState::Idle | LoadState::Loading { .. } => {
                let p = Paragraph::new("Loading Gamma Data...")
                    .alignment(Alignment::Center)
                    .block(Block::default().borders(Borders::ALL));
                f.render_widget(p, chunks[1]);
            }
            LoadState::Failed { message } => {
                let p = Paragraph::new(message.as_str())
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: true })
                    .block(Block::default().borders(Borders::ALL).title("Error"));
                f.render_widget(p, chunks[1]);
            }
            LoadState::Ready { rows, .. } => {
                let order = display_order(rows, &self.columns, self.sort);
                self.draw_table(f, chunks[1], &cell_grid(rows, &self.columns, &order));
            }
        }

        let hint = Paragraph::new("r refresh · tab symbol · 1-9 sort · q quit")
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(hint, chunks[2]);
    }

    fn draw_controls(&self, f: &mut Frame, area: Rect, state: &LoadState) {
        let titles: Vec<Line> = self.symbols.iter().map(|s| Line::from(s.to_string())).collect();
        let title = if state.is_loading() { "Symbol (refreshing...)" } else { "Symbol" };
        let tabs = Tabs::new(titles)
            .select(self.selected)
            .block(Block::default().borders(Borders::ALL).title(title))
            .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Yellow));
        f.render_widget(tabs, area);
    }

    fn draw_table(&self, f: &mut Frame, area: Rect, grid: &[Vec<String>]) {
        let cols = self.columns.columns();
        let header = Row::new(cols.iter().enumerate().map(|(i, c)| {
            let marker = match self.sort {
                Some(s) if s.column == i && s.direction == Direction::Ascending => " ▲",
                Some(s) if s.column == i => " ▼",
                _ => "",
            };
            Cell::from(format!("{}{}", c.header, marker))
        }))
        .style(Style::default().add_modifier(Modifier::BOLD));

        let rows = grid.iter().enumerate().map(|(n, cells)| {
            let row = Row::new(cells.iter().zip(cols).map(|(text, col)| {
                let align = match col.class {
                    CellClass::Numeric => Alignment::Right,
                    CellClass::Symbol => Alignment::Left,
                };
                Cell::from(Line::from(text.clone()).alignment(align))
            }));
            // striped
            if n % 2 == 1 {
                row.style(Style::default().bg(Color::Rgb(30, 30, 40)))
            } else {
                row
            }
        });

        let widths = vec![Constraint::Ratio(1, cols.len().max(1) as u32); cols.len()];
        let table = Table::new(rows, widths)
            .header(header)
            .block(Block::default().borders(Borders::ALL).title(format!("Dealer Gamma ({} rows)", grid.len())));
        f.render_widget(table, area);
    }
}

// Restores the terminal even if the loop bails out with an error.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Mounts the table (first fetch) and runs until the user quits.
pub async fn run(orchestrator: FetchOrchestrator, mut app: TableApp) -> anyhow::Result<()> {
    let mut guard = TerminalGuard::enter()?;
    let mut events = EventStream::new();
    let mut state_rx = orchestrator.subscribe();

    orchestrator.mount();
    info!(symbol = %orchestrator.symbol(), "table mounted");

    loop {
        let state = orchestrator.state();
        guard.terminal.draw(|f| app.draw(f, &state))?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    match app.handle_key(key) {
                        Action::Quit => break,
                        Action::Dispatch(cmd) => {
                            debug!(?cmd, "dispatching");
                            orchestrator.dispatch(cmd);
                        }
                        Action::None => {}
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
