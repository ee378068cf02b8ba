//! worklog CLI
//!
//! Command-line interface, board server and terminal board for worklog.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use worklog_core::{
    AllowAll, BoardBackend, BoardController, Column, Config, IssueProvider, LocalBackend,
    OfflineIssueProvider, Store,
};

mod commands;
mod editor;
mod metadata;
mod output;
mod remote;
mod server;
mod tui;

use metadata::WebIssueProvider;
use output::{Output, OutputFormat};
use remote::RemoteBackend;

#[derive(Parser)]
#[command(name = "worklog")]
#[command(about = "worklog - research board for work pulled from your issue tracker")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this config file instead of the default
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the terminal board
    Tui,
    /// Serve the board over HTTP
    Serve {
        /// Address to listen on (defaults to bind_addr from config)
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },
    /// Show or repair the board
    Board {
        #[command(subcommand)]
        command: Option<BoardCommands>,
    },
    /// Manage board items
    Item {
        #[command(subcommand)]
        command: ItemCommands,
    },
    /// Manage notes on an item
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Manage documents attached to an item
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Show status (storage, counts, revisions)
    Status,
}

#[derive(Subcommand)]
enum BoardCommands {
    /// Print every column in order
    Show {
        /// Hide private items, as anonymous visitors see the board
        #[arg(long)]
        public: bool,
    },
    /// Renumber columns with gaps or duplicate positions
    Repair,
}

#[derive(Subcommand)]
enum ItemCommands {
    /// Add an item at the end of a column
    #[command(alias = "create")]
    Add {
        /// Item title (taken from the issue when omitted)
        title: Option<String>,
        /// Column to add to
        #[arg(short, long, default_value = "ideas")]
        column: Column,
        /// Issue reference, e.g. owner/repo#42 or an issue URL
        #[arg(short, long)]
        issue: Option<String>,
        /// Item description
        #[arg(short, long)]
        description: Option<String>,
        /// Don't fetch the issue title from the tracker
        #[arg(long)]
        no_fetch: bool,
    },
    /// Show item details (including notes and documents)
    Show {
        /// Item ID (full UUID or prefix)
        id: String,
    },
    /// Edit an item (opens the description in $EDITOR without flags)
    Edit {
        /// Item ID (full UUID or prefix)
        id: String,
        #[arg(short = 'T', long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        /// Move to the end of this column
        #[arg(short, long)]
        column: Option<Column>,
    },
    /// Move an item within or across columns
    #[command(alias = "mv")]
    Move {
        /// Item ID (full UUID or prefix)
        id: String,
        /// Target column
        column: Column,
        /// Zero-based index in the target column (end when omitted)
        #[arg(long)]
        index: Option<usize>,
    },
    /// Delete an item with its notes and documents
    #[command(alias = "rm")]
    Delete {
        /// Item ID (full UUID or prefix)
        id: String,
        /// Don't ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Add a note to an item
    Add {
        /// Item ID (full UUID or prefix)
        item_id: String,
        /// Note body (opens editor if not provided)
        body: Option<String>,
    },
    /// Delete a note from an item
    #[command(alias = "rm")]
    Delete {
        /// Item ID (full UUID or prefix)
        item_id: String,
        /// Note ID (full UUID or prefix)
        note_id: String,
    },
}

#[derive(Subcommand)]
enum DocCommands {
    /// Attach a document reference to an item
    Add {
        /// Item ID (full UUID or prefix)
        item_id: String,
        /// Document title
        title: String,
        /// URL or path of the document
        location: String,
    },
    /// Remove a document reference from an item
    #[command(alias = "rm")]
    Delete {
        /// Item ID (full UUID or prefix)
        item_id: String,
        /// Document ID (full UUID or prefix)
        doc_id: String,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (see `worklog config show`)
        key: String,
        /// Configuration value ("none" clears optional values)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));
    let config_path = cli.config.as_ref();

    // Commands that don't need the store
    if let Some(Commands::Config { command }) = &cli.command {
        return handle_config_command(command.clone(), config_path, &output);
    }

    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    let command = match cli.command {
        None | Some(Commands::Tui) => {
            let controller = board_controller(&config)?;
            return tui::run(controller, &config).await;
        }
        Some(command) => command,
    };

    let default_level = if matches!(command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_logging(default_level);

    match command {
        Commands::Serve { bind } => commands::serve::run(config, bind, &output).await,
        Commands::Item { command } => handle_item_command(command, &config, &output).await,
        Commands::Board { command } => {
            handle_board_command(command, &mut open_store(&config)?, &output)
        }
        Commands::Note { command } => {
            handle_note_command(command, &mut open_store(&config)?, &output)
        }
        Commands::Doc { command } => handle_doc_command(command, &mut open_store(&config)?, &output),
        Commands::Status => commands::status::show(&open_store(&config)?, &output),
        Commands::Tui | Commands::Config { .. } => Ok(()), // Handled above
    }
}

/// Log to stderr, filtered by WORKLOG_LOG, then RUST_LOG, then `default_level`
fn init_logging(default_level: &str) {
    let filter = std::env::var("WORKLOG_LOG")
        .ok()
        .filter(|value| !value.is_empty())
        .map(EnvFilter::new)
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open_with_config(config.clone()).with_context(|| {
        format!(
            "Failed to open item store at {}",
            config.sqlite_path().display()
        )
    })
}

/// Controller over the configured server, or the local database
fn board_controller(config: &Config) -> Result<BoardController> {
    let backend: Arc<dyn BoardBackend> = match config.server_url.as_deref() {
        Some(url) => Arc::new(RemoteBackend::new(url, config.admin_token.clone())?),
        None => Arc::new(LocalBackend::new(open_store(config)?)),
    };

    Ok(BoardController::new(backend, Arc::new(AllowAll)).with_timeout(config.persist_timeout()))
}

async fn handle_item_command(
    command: ItemCommands,
    config: &Config,
    output: &Output,
) -> Result<()> {
    match command {
        ItemCommands::Add {
            title,
            column,
            issue,
            description,
            no_fetch,
        } => {
            let mut store = open_store(config)?;
            let provider: Box<dyn IssueProvider> = if no_fetch {
                Box::new(OfflineIssueProvider::new(config.issue_base_url.clone()))
            } else {
                Box::new(WebIssueProvider::new(config.issue_base_url.clone()))
            };
            commands::item::add(
                &mut store,
                title,
                column,
                issue,
                description,
                provider.as_ref(),
                output,
            )
            .await
        }
        ItemCommands::Show { id } => commands::item::show(&open_store(config)?, id, output),
        ItemCommands::Edit {
            id,
            title,
            description,
            column,
        } => commands::item::edit(&mut open_store(config)?, id, title, description, column, output),
        ItemCommands::Move { id, column, index } => {
            let controller = board_controller(config)?;
            commands::item::move_item(&controller, id, column, index, output).await
        }
        ItemCommands::Delete { id, yes } => {
            let controller = board_controller(config)?;
            commands::item::delete(&controller, id, yes, output).await
        }
    }
}

fn handle_board_command(
    command: Option<BoardCommands>,
    store: &mut Store,
    output: &Output,
) -> Result<()> {
    match command {
        Some(BoardCommands::Show { public }) => commands::board::show(store, public, output),
        None => commands::board::show(store, false, output),
        Some(BoardCommands::Repair) => commands::board::repair(store, output),
    }
}

fn handle_note_command(command: NoteCommands, store: &mut Store, output: &Output) -> Result<()> {
    match command {
        NoteCommands::Add { item_id, body } => commands::note::add(store, item_id, body, output),
        NoteCommands::Delete { item_id, note_id } => {
            commands::note::delete(store, item_id, note_id, output)
        }
    }
}

fn handle_doc_command(command: DocCommands, store: &mut Store, output: &Output) -> Result<()> {
    match command {
        DocCommands::Add {
            item_id,
            title,
            location,
        } => commands::doc::add(store, item_id, title, location, output),
        DocCommands::Delete { item_id, doc_id } => {
            commands::doc::delete(store, item_id, doc_id, output)
        }
    }
}

fn handle_config_command(
    command: Option<ConfigCommands>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Show) | None => commands::config::show(config_path, output),
        Some(ConfigCommands::Set { key, value }) => {
            commands::config::set(key, value, config_path, output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_move_with_index() {
        let cli = Cli::parse_from(["worklog", "item", "move", "ab12", "exploring", "--index", "2"]);
        match cli.command {
            Some(Commands::Item {
                command: ItemCommands::Move { id, column, index },
            }) => {
                assert_eq!(id, "ab12");
                assert_eq!(column, Column::Exploring);
                assert_eq!(index, Some(2));
            }
            _ => panic!("expected item move"),
        }
    }

    #[test]
    fn test_unknown_column_rejected() {
        let result = Cli::try_parse_from(["worklog", "item", "add", "Title", "--column", "backlog"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_to_terminal_board() {
        let cli = Cli::parse_from(["worklog", "--json"]);
        assert!(cli.command.is_none());
        assert!(cli.json);
    }
}
