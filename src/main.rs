use tabsync::app;
use tabsync::cli;
use tabsync::config::Endpoints;
use tabsync::engine::SyncEngine;
use tabsync::events;
use tabsync::http::HttpJobsApi;
use tabsync::input;
use tabsync::notify;
use tabsync::tui;

use app::AppState;
use clap::Parser;
use cli::Cli;
use color_eyre::eyre::{eyre, Result};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, SetTitle};
use events::{AppEvent, EventHandler, SyncEvent};
use input::{Action, InputContext};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tabsync::coordinator::Mutation;
use tokio::sync::mpsc;

const LOG_PAGE_FALLBACK: usize = 20;

fn setup_verbose_logging() -> Result<()> {
    let state_dir = dirs_next_or_fallback();
    std::fs::create_dir_all(&state_dir)
        .map_err(|e| eyre!("Failed to create log directory {state_dir:?}: {e}"))?;
    let log_path = state_dir.join("debug.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| eyre!("Failed to open log file {log_path:?}: {e}"))?;
    tracing_subscriber::fmt()
        .with_writer(file)
        .with_ansi(false)
        .init();
    tracing::info!(
        "tabsync v{} starting with verbose logging",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

fn dirs_next_or_fallback() -> std::path::PathBuf {
    if let Some(state) = std::env::var_os("XDG_STATE_HOME") {
        std::path::PathBuf::from(state).join("tabsync")
    } else if let Some(home) = std::env::var_os("HOME") {
        std::path::PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("tabsync")
    } else {
        std::path::PathBuf::from("/tmp/tabsync")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    if args.verbose {
        setup_verbose_logging()?;
    }

    // Bad URLs fail before the terminal is taken over.
    let endpoints = Endpoints::from_base(&args.server)?;
    let config = args.sync_config();
    let api = Arc::new(HttpJobsApi::new(endpoints.rest.clone(), config.request_timeout)?);
    tracing::info!(rest = %endpoints.rest, ws = %endpoints.ws, "endpoints resolved");

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if let Err(e) = terminal::disable_raw_mode() {
            eprintln!("Failed to disable raw mode during panic: {e}");
        }
        if let Err(e) = execute!(io::stdout(), LeaveAlternateScreen, SetTitle("")) {
            eprintln!("Failed to leave alternate screen during panic: {e}");
        }
        original_hook(panic_info);
    }));

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, SetTitle(format!("tabsync {}", args.server)))?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut state = AppState::new(args.server.clone(), !args.no_notify);
    let (mut engine, sync_rx) = SyncEngine::new(api, config);
    engine.spawn_background(endpoints.ws);

    let events = EventHandler::new(Duration::from_millis(100));
    let result = run_app(&mut terminal, &mut state, &mut engine, events, sync_rx).await;

    engine.shutdown();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, SetTitle(""))?;
    terminal.show_cursor()?;

    result
}

/// Rows in the log pane, for page-sized scrolling.
/// Must stay in sync with `tui::layout`.
fn log_pane_height(terminal: &Terminal<CrosstermBackend<io::Stdout>>) -> usize {
    match terminal.size() {
        Ok(size) => {
            let panes = tui::layout(Rect::new(0, 0, size.width, size.height));
            tui::logs::body_height(panes.logs)
        }
        Err(e) => {
            tracing::warn!("terminal size query failed: {e}");
            LOG_PAGE_FALLBACK
        }
    }
}

fn submit(engine: &mut SyncEngine, mutation: Option<Mutation>) {
    if let Some(mutation) = mutation {
        if let Err(rejection) = engine.submit(mutation) {
            engine.push_error(rejection.to_string());
        }
    }
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    engine: &mut SyncEngine,
    mut events: EventHandler,
    mut sync_rx: mpsc::UnboundedReceiver<SyncEvent>,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        state.clamp_cursor(engine.store().len());
        terminal.draw(|f| tui::render(f, state, engine))?;

        engine.prune();

        tokio::select! {
            event = events.next() => {
                let Some(event) = event else { break };
                match event {
                    AppEvent::Key(key) => handle_key(key, terminal, state, engine),
                    AppEvent::Tick => {
                        if last_tick.elapsed() >= Duration::from_millis(100) {
                            state.advance_spinner();
                            last_tick = Instant::now();
                        }
                    }
                    AppEvent::Error(e) => engine.push_error(e),
                }
            }
            Some(event) = sync_rx.recv() => {
                let transitions = engine.handle(event);
                if state.desktop_notify {
                    for transition in &transitions {
                        notify::send_desktop(transition);
                    }
                }
            }
        }

        if state.should_quit {
            break;
        }
    }

    events.stop();
    Ok(())
}

fn handle_key(
    key: crossterm::event::KeyEvent,
    terminal: &Terminal<CrosstermBackend<io::Stdout>>,
    state: &mut AppState,
    engine: &mut SyncEngine,
) {
    let ctx = InputContext {
        has_error: engine.latest_error().is_some(),
        mode: state.input_mode(),
    };
    let len = engine.store().len();
    let log_total = state.selected(engine.store()).map_or(0, |j| j.logs.len());

    match input::map_key(key, &ctx) {
        Action::Quit => state.should_quit = true,
        Action::DismissError => engine.dismiss_error(),
        Action::MoveUp => state.move_cursor_up(),
        Action::MoveDown => state.move_cursor_down(len),
        Action::QuickSelect(n) => state.quick_select(n, len),
        Action::Create => state.open_create(),
        Action::Rename => state.open_rename(engine.store()),
        Action::Reassign => state.open_reassign(engine.store()),
        Action::StartWithProfile => state.open_start_with_profile(engine.store()),
        Action::Delete => state.open_confirm_delete(engine.store()),
        Action::Start => {
            let mutation = state.start_selected(engine.store());
            submit(engine, mutation);
        }
        Action::Stop => {
            let mutation = state.stop_selected(engine.store());
            submit(engine, mutation);
        }
        Action::Refresh => {
            engine.request_resync();
        }
        Action::ScrollLogUp => state.scroll_log_up(1, log_total, log_pane_height(terminal)),
        Action::ScrollLogDown => state.scroll_log_down(1),
        Action::PageLogUp => {
            let h = log_pane_height(terminal);
            state.scroll_log_up(h.max(1), log_total, h);
        }
        Action::PageLogDown => state.scroll_log_down(log_pane_height(terminal).max(1)),
        Action::ScrollLogTop => state.scroll_log_to_top(log_total, log_pane_height(terminal)),
        Action::FollowLog => state.follow_log(),
        Action::InputChar(c) => state.prompt_push(c),
        Action::InputBackspace => state.prompt_backspace(),
        Action::Submit => {
            let mutation = state.submit_prompt();
            submit(engine, mutation);
        }
        Action::Confirm => {
            let mutation = state.confirm();
            submit(engine, mutation);
        }
        Action::Cancel => state.cancel_overlay(),
        Action::None => {}
    }
}
