use crate::core::export::ExportPipeline;
use crate::core::preview::{Preview, PreviewCache, PreviewRow};
use crate::core::selection::{Command, Direction as Move, Session, Snapshot};
use crate::core::tree::Tree;
use crate::domain::models::{Classification, TriState};
use crate::infra::output::{format_count, format_size};
use chrono::{DateTime, Local};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{info, warn};
use ratatui::{
    Frame, Terminal,
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};
use std::{io, time::Duration};

const HELP: &str = "↑/↓: Move | ←/→: Collapse/Expand | Space: Toggle | a: All visible | n: None | f: Files | /: Search | e: Export | q: Quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Browse,
    Search,
}

/// What the event loop should do after a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Export,
    Quit,
}

struct App {
    session: Session,
    mode: Mode,
    search: String,
    status: Option<String>,
    title: String,
    list_state: ListState,
    preview: Preview,
}

impl App {
    fn new(session: Session) -> App {
        let title = format!(
            "Select files to include in the context of {}",
            session.tree().root_name()
        );
        App {
            session,
            mode: Mode::Browse,
            search: String::new(),
            status: None,
            title,
            list_state: ListState::default(),
            preview: Preview::default(),
        }
    }

    fn refresh_preview(&mut self, cache: &mut PreviewCache, pipeline: &ExportPipeline<'_>) {
        self.preview = cache.preview(self.session.tree(), pipeline);
    }

    fn browse_command(&self, key: KeyEvent) -> Option<Command> {
        let focus = self.session.focus();
        let focused = focus.map(|id| self.session.tree().node(id));
        let focused_dir = focused.filter(|n| n.is_dir());

        match key.code {
            KeyCode::Up | KeyCode::Char('k') => Some(Command::MoveFocus(Move::Up)),
            KeyCode::Down | KeyCode::Char('j') => Some(Command::MoveFocus(Move::Down)),
            KeyCode::Home => Some(Command::MoveFocus(Move::First)),
            KeyCode::End => Some(Command::MoveFocus(Move::Last)),
            KeyCode::Left => match (focus, focused_dir) {
                (Some(id), Some(dir)) if dir.expanded && dir.parent.is_some() => {
                    Some(Command::ToggleExpand(id))
                }
                _ => Some(Command::MoveFocus(Move::Parent)),
            },
            KeyCode::Right => match (focus, focused_dir) {
                (Some(id), Some(dir)) if !dir.expanded => Some(Command::ToggleExpand(id)),
                _ => None,
            },
            KeyCode::Enter => focused_dir.and(focus).map(Command::ToggleExpand),
            KeyCode::Char(' ') => focus.map(Command::ToggleSelect),
            KeyCode::Char('a') => Some(Command::SelectAllVisible),
            KeyCode::Char('n') => Some(Command::ClearAllSelection),
            KeyCode::Char('f') => Some(Command::ToggleShowFiles),
            _ => None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Flow::Quit;
        }

        match self.mode {
            Mode::Search => {
                match key.code {
                    KeyCode::Enter => self.mode = Mode::Browse,
                    KeyCode::Esc => {
                        self.mode = Mode::Browse;
                        self.search.clear();
                        self.session.apply(Command::SetFilter(String::new()));
                    }
                    KeyCode::Backspace => {
                        self.search.pop();
                        self.session.apply(Command::SetFilter(self.search.clone()));
                    }
                    KeyCode::Char(c) => {
                        self.search.push(c);
                        self.session.apply(Command::SetFilter(self.search.clone()));
                    }
                    _ => {}
                }
                Flow::Continue
            }
            Mode::Browse => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => Flow::Quit,
                KeyCode::Char('e') => Flow::Export,
                KeyCode::Char('/') => {
                    self.mode = Mode::Search;
                    Flow::Continue
                }
                _ => {
                    if let Some(command) = self.browse_command(key) {
                        self.session.apply(command);
                    }
                    Flow::Continue
                }
            },
        }
    }

    fn footer(&self, snapshot: &Snapshot) -> String {
        if self.mode == Mode::Search {
            return format!("/{}", self.search);
        }
        if !snapshot.filter.is_empty() {
            return format!("Filter: {} (/ to edit, Esc in search to clear)", snapshot.filter);
        }
        HELP.to_string()
    }
}

fn row_marker(state: TriState, classification: Option<Classification>) -> &'static str {
    if classification == Some(Classification::Skipped) {
        return "[-] ";
    }
    match state {
        TriState::All => "[✓] ",
        TriState::Partial => "[~] ",
        TriState::None => "[ ] ",
    }
}

fn preview_row(row: &PreviewRow) -> ListItem<'static> {
    let dim = Style::default().fg(Color::DarkGray);
    let mut spans = vec![
        Span::styled("• ", dim),
        Span::styled(row.display_path.clone(), Style::default().fg(Color::Cyan)),
    ];
    if row.stats.failed {
        spans.push(Span::styled("  unreadable", Style::default().fg(Color::Yellow)));
    } else {
        spans.push(Span::styled(
            format!(
                "  {} lines  {} chars",
                format_count(row.stats.lines),
                format_count(row.stats.chars)
            ),
            dim,
        ));
    }
    spans.push(Span::styled(format!("  {}", format_size(row.stats.size)), dim));
    if let Some(modified) = row.modified {
        let modified: DateTime<Local> = modified.into();
        spans.push(Span::styled(
            format!("  {}", modified.format("%Y-%m-%d %H:%M")),
            dim,
        ));
    }
    ListItem::new(Line::from(spans))
}

fn render_preview(f: &mut Frame, preview: &Preview, area: ratatui::layout::Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(4), Constraint::Min(1)].as_ref())
        .split(area);

    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let stats = if preview.rows.is_empty() {
        vec![Line::from(Span::styled("No files selected", label))]
    } else {
        vec![
            Line::from(vec![
                Span::styled("Total Files: ", label),
                Span::styled(format_count(preview.file_count()), value),
                Span::styled("  Total Lines: ", label),
                Span::styled(format_count(preview.total_lines), value),
            ]),
            Line::from(vec![
                Span::styled("Total Characters: ", label),
                Span::styled(format_count(preview.total_chars), value),
                Span::styled("  Total Size: ", label),
                Span::styled(format_size(preview.total_size), value),
            ]),
        ]
    };
    let stats = Paragraph::new(stats)
        .block(Block::default().borders(Borders::ALL).title("File Statistics"));
    f.render_widget(stats, chunks[0]);

    let files = List::new(preview.rows.iter().map(preview_row).collect::<Vec<_>>())
        .block(Block::default().borders(Borders::ALL).title("Selected Files"));
    f.render_widget(files, chunks[1]);
}

fn ui(f: &mut Frame, app: &mut App) {
    let snapshot = app.session.snapshot();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(
            [
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(f.area());

    let title = Paragraph::new(Span::styled(
        app.title.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    ));
    f.render_widget(title, chunks[0]);

    let selected_style = Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD);

    let items: Vec<ListItem> = snapshot
        .rows
        .iter()
        .map(|row| {
            let indent = "  ".repeat(row.depth);
            let arrow = match (row.is_dir, row.expanded) {
                (true, true) => "▼ ",
                (true, false) => "► ",
                (false, _) => "",
            };
            let content = format!(
                "{}{}{}{}",
                indent,
                row_marker(row.state, row.classification),
                arrow,
                row.name
            );
            let style = if row.classification == Some(Classification::Skipped) {
                Style::default().fg(Color::DarkGray)
            } else if row.state == TriState::All {
                Style::default().fg(Color::Green)
            } else if row.is_dir {
                Style::default().fg(Color::Blue)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(content, style))
        })
        .collect();

    let focused_index = snapshot
        .focus
        .and_then(|id| snapshot.rows.iter().position(|r| r.id == id));
    app.list_state.select(focused_index);

    let stats = snapshot.stats;
    let file_list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(format!(
            "Files ({} of {} selected, {})",
            stats.selected_files,
            stats.processable_files,
            format_size(stats.selected_bytes)
        )))
        .highlight_style(selected_style);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(chunks[1]);
    f.render_stateful_widget(file_list, panes[0], &mut app.list_state);
    render_preview(f, &app.preview, panes[1]);

    if let Some(status) = &app.status {
        let line = Paragraph::new(Span::styled(
            status.clone(),
            Style::default().fg(Color::Yellow),
        ));
        f.render_widget(line, chunks[2]);
    }

    let controls = Paragraph::new(Span::styled(
        app.footer(&snapshot),
        Style::default().fg(Color::DarkGray),
    ));
    f.render_widget(controls, chunks[3]);
}

/// Runs the interactive selector until the user quits. `pipeline` fills the
/// selected-files preview. `on_export` is called with the current tree on
/// `e`; its message (or error) is shown in the status line.
pub fn run_tui(
    session: Session,
    pipeline: &ExportPipeline<'_>,
    on_export: impl FnMut(&Tree) -> anyhow::Result<String>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session);
    let result = run_app(&mut terminal, &mut app, pipeline, on_export);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    match result {
        Ok(()) => {
            info!(
                "Selector closed with {} files selected",
                app.session.tree().selection_stats().selected_files
            );
            Ok(())
        }
        Err(err) => {
            warn!("Error during file selection: {}", err);
            Err(err)
        }
    }
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    pipeline: &ExportPipeline<'_>,
    mut on_export: impl FnMut(&Tree) -> anyhow::Result<String>,
) -> anyhow::Result<()> {
    let mut cache = PreviewCache::new();
    app.refresh_preview(&mut cache, pipeline);
    loop {
        terminal.draw(|f| ui(f, app))?;

        if crossterm::event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match app.handle_key(key) {
                    Flow::Continue => app.refresh_preview(&mut cache, pipeline),
                    Flow::Quit => return Ok(()),
                    Flow::Export => {
                        app.status = Some(match on_export(app.session.tree()) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("Export failed: {}", e);
                                format!("Export failed: {}", e)
                            }
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extract::ExtractorRegistry;
    use crate::core::tree::fixtures::{id, project_tree};
    use ratatui::backend::TestBackend;
    use std::path::Path;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        App::new(Session::new(project_tree()))
    }

    fn read_project(path: &Path) -> io::Result<Vec<u8>> {
        match path.file_name().and_then(|n| n.to_str()) {
            Some("a.txt") => Ok(b"hello\n".to_vec()),
            _ => Err(io::Error::new(io::ErrorKind::NotFound, "gone")),
        }
    }

    fn render(app: &mut App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| ui(f, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    fn focused(app: &App) -> String {
        let tree = app.session.tree();
        app.session
            .focus()
            .map(|f| tree.node(f).display_path())
            .unwrap_or_default()
    }

    #[test]
    fn test_navigation_keys() {
        let mut app = app();
        assert_eq!(focused(&app), "");

        app.handle_key(key(KeyCode::Down));
        assert_eq!(focused(&app), "a.txt");
        app.handle_key(key(KeyCode::Char('j')));
        assert_eq!(focused(&app), "b.bin");
        app.handle_key(key(KeyCode::Char('k')));
        assert_eq!(focused(&app), "a.txt");
        app.handle_key(key(KeyCode::End));
        assert_eq!(focused(&app), "sub");

        app.handle_key(key(KeyCode::Right));
        app.handle_key(key(KeyCode::End));
        assert_eq!(focused(&app), "sub/c.docx");

        app.handle_key(key(KeyCode::Left));
        assert_eq!(focused(&app), "sub");
        app.handle_key(key(KeyCode::Left));
        assert!(!app.session.tree().node(id(app.session.tree(), "sub")).expanded);
        app.handle_key(key(KeyCode::Home));
        assert_eq!(focused(&app), "");
    }

    #[test]
    fn test_space_selects_and_n_clears() {
        let mut app = app();
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.session.tree().selection_stats().selected_files, 2);

        app.handle_key(key(KeyCode::Char('n')));
        assert_eq!(app.session.tree().selection_stats().selected_files, 0);

        app.handle_key(key(KeyCode::Char('a')));
        assert_eq!(app.session.tree().selection_stats().selected_files, 2);
    }

    #[test]
    fn test_search_mode_edits_filter() {
        let mut app = app();
        assert_eq!(app.handle_key(key(KeyCode::Char('/'))), Flow::Continue);
        assert_eq!(app.mode, Mode::Search);

        for c in "docz".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Char('x')));
        assert_eq!(app.session.tree().query(), "docx");

        // 'q' is text while searching
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), Flow::Continue);
        app.handle_key(key(KeyCode::Backspace));

        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.session.tree().query(), "docx");

        app.handle_key(key(KeyCode::Char('/')));
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.mode, Mode::Browse);
        assert_eq!(app.session.tree().query(), "");
    }

    #[test]
    fn test_flow_keys() {
        let mut app = app();
        assert_eq!(app.handle_key(key(KeyCode::Char('e'))), Flow::Export);
        assert_eq!(app.handle_key(key(KeyCode::Char('f'))), Flow::Continue);
        assert!(!app.session.show_files());
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), Flow::Quit);

        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(app.handle_key(ctrl_c), Flow::Quit);
    }

    #[test]
    fn test_ui_renders_rows_and_stats() {
        let mut app = app();
        app.handle_key(key(KeyCode::Char(' ')));
        app.status = Some("Exported 2 files".to_string());

        let screen = render(&mut app, 120, 14);
        assert!(screen.contains("[✓] ▼ project"));
        assert!(screen.contains("[✓] a.txt"));
        assert!(screen.contains("[-] b.bin"));
        assert!(screen.contains("[✓] ► sub"));
        assert!(screen.contains("Files (2 of 2 selected, 126 B)"));
        assert!(screen.contains("Exported 2 files"));
        assert_eq!(app.list_state.selected(), Some(0));
    }

    #[test]
    fn test_preview_pane_shows_selected_files() {
        let registry = ExtractorRegistry::with_defaults();
        let pipeline = ExportPipeline::new(&registry, &read_project);
        let mut cache = PreviewCache::new();
        let mut app = app();

        app.refresh_preview(&mut cache, &pipeline);
        assert!(render(&mut app, 120, 14).contains("No files selected"));

        app.handle_key(key(KeyCode::Char(' ')));
        app.refresh_preview(&mut cache, &pipeline);
        assert_eq!(app.preview.file_count(), 2);

        let screen = render(&mut app, 120, 14);
        assert!(screen.contains("File Statistics"));
        assert!(screen.contains("Total Files: 2  Total Lines: 1"));
        assert!(screen.contains("Total Characters: 6  Total Size: 126 B"));
        assert!(screen.contains("Selected Files"));
        assert!(screen.contains("• a.txt  1 lines  6 chars  6 B"));
        assert!(screen.contains("• sub/c.docx  unreadable  120 B"));
    }
}
