//! Terminal board
//!
//! Four columns (Ideas, Exploring, Discussing, Closed) of cards that can
//! be reordered with the keyboard or dragged with the mouse.
//!
//! ## Navigation
//!
//! - h/l or ←/→: Focus column
//! - j/k or ↑/↓: Select card
//! - Enter: Item details
//! - q: Quit
//!
//! ## Moving
//!
//! - H/L: Move card to the end of the previous/next column
//! - J/K: Move card down/up within its column
//! - Mouse drag: drop above or below the card under the pointer
//!
//! Every move shows immediately and is saved in the background. A spinner
//! in the top-right corner shows while a save is in flight. A failed save
//! puts the board back and says so in the status bar.
//!
//! ## Commands
//!
//! - a: Add item (title or owner/repo#N)
//! - d: Delete item
//! - o: Open linked issue
//! - r: Reload board

mod app;
mod layout;
mod ui;

use std::fs::File;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind,
    },
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::prelude::*;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use worklog_core::{BoardController, Config, IssueProvider};

use app::{item_from_input, Action, App, TaskResult};

use crate::metadata::WebIssueProvider;

/// Run the terminal board until the user quits
pub async fn run(controller: BoardController, config: &Config) -> Result<()> {
    // Initialize TUI logging (file-based, only if WORKLOG_LOG is set)
    init_tui_logging(config);

    let mut app = App::new(controller);
    let provider: Arc<dyn IssueProvider> =
        Arc::new(WebIssueProvider::new(config.issue_base_url.clone()));
    let (tx, mut rx) = mpsc::unbounded_channel();

    // Load before taking over the terminal so a bad server URL reads
    // like any other command error
    app.controller
        .load()
        .await
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    stdout().execute(EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_app(&mut terminal, &mut app, &provider, &tx, &mut rx).await;

    // Restore terminal
    stdout().execute(DisableMouseCapture)?;
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

async fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    provider: &Arc<dyn IssueProvider>,
    tx: &mpsc::UnboundedSender<TaskResult>,
    rx: &mut mpsc::UnboundedReceiver<TaskResult>,
) -> Result<()> {
    loop {
        app.check_status_timeout();
        app.tick = app.tick.wrapping_add(1);

        terminal.draw(|frame| {
            app.refresh_layout(frame.area());
            ui::draw(frame, app);
        })?;

        let action = tokio::select! {
            biased;

            // Background saves and loads finishing
            Some(result) = rx.recv() => app.handle_result(result),

            // Poll for terminal events
            _ = tokio::time::sleep(Duration::from_millis(50)) => {
                if event::poll(Duration::from_millis(0))? {
                    match event::read()? {
                        // Only handle key press events (not release)
                        Event::Key(key) if key.kind == KeyEventKind::Press => app.handle_key(key),
                        Event::Mouse(mouse) => app.handle_mouse(mouse),
                        _ => None,
                    }
                } else {
                    None
                }
            }
        };

        if let Some(action) = action {
            dispatch(action, app, provider, tx);
        }

        if app.should_quit {
            if app.is_busy() {
                info!("quitting with a save in flight");
            }
            break;
        }
    }

    Ok(())
}

/// Run an action in the background, reporting back on `tx`
fn dispatch(
    action: Action,
    app: &mut App,
    provider: &Arc<dyn IssueProvider>,
    tx: &mpsc::UnboundedSender<TaskResult>,
) {
    let controller = app.controller.clone();
    let tx = tx.clone();

    match action {
        Action::Persist(pending) => {
            tokio::spawn(async move {
                let result = match controller.finish(pending).await {
                    Ok(outcome) => TaskResult::Saved(outcome),
                    Err(err) => TaskResult::Failed(err),
                };
                let _ = tx.send(result);
            });
        }
        Action::Add { input, column } => {
            let provider = Arc::clone(provider);
            tokio::spawn(async move {
                let new = item_from_input(&input, column, provider.as_ref()).await;
                let result = match controller.add_item(new).await {
                    Ok(item) => TaskResult::Added(item),
                    Err(err) => TaskResult::Failed(err),
                };
                let _ = tx.send(result);
            });
        }
        Action::Delete(id) => {
            tokio::spawn(async move {
                let result = match controller.delete_item(id).await {
                    Ok(()) => TaskResult::Deleted(id),
                    Err(err) => TaskResult::Failed(err),
                };
                let _ = tx.send(result);
            });
        }
        Action::Reload => {
            tokio::spawn(async move {
                let result = match controller.load().await {
                    Ok(()) => TaskResult::Reloaded,
                    Err(err) => TaskResult::Failed(err),
                };
                let _ = tx.send(result);
            });
        }
        Action::Open(url) => {
            if let Err(err) = open::that_detached(&url) {
                let _ = tx.send(TaskResult::OpenFailed(format!("Failed to open {}: {}", url, err)));
            }
        }
    }
}

/// Initialize file-based logging for the TUI
///
/// Only logs if WORKLOG_LOG is set. Writes to config.log_file or
/// {data_dir}/debug.log.
fn init_tui_logging(config: &Config) {
    let Ok(log_level) = std::env::var("WORKLOG_LOG") else {
        return;
    };

    // Determine log file path
    let log_path = config
        .log_file
        .clone()
        .unwrap_or_else(|| config.data_dir.join("debug.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!("worklog_core={},worklog={}", log_level, log_level));

    // Ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("TUI logging initialized to {:?}", log_path);
}
