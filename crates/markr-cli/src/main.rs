//! Markr CLI
//!
//! Command-line interface for Markr - bookmarks for locations in text files.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use markr_core::{
    BookmarkStore, BookmarkStoreRoot, ChangeNotifier, Config, GroupView, SortOrder, Subscriber,
};

mod commands;
mod output;
mod prompt;
mod surface;

use commands::bookmark::{LocationArgs, ToggleArgs};
use output::{Output, OutputFormat};

/// Default filter when neither MARKR_LOG nor RUST_LOG is set
const DEFAULT_LOG_FILTER: &str = "markr_core=warn,markr_cli=warn";

#[derive(Parser)]
#[command(name = "markr")]
#[command(about = "Markr - bookmarks for locations in text files")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a bookmark at a line or selection, or remove the one there
    Toggle {
        #[command(flatten)]
        location: LocationArgs,
        #[command(flatten)]
        options: ToggleArgs,
    },
    /// List bookmarks
    #[command(alias = "ls")]
    List {
        /// Group by file, color or workspace
        #[arg(short, long)]
        group: Option<GroupView>,
        /// Sort by line or time
        #[arg(short, long)]
        sort: Option<SortOrder>,
    },
    /// Show bookmark details
    Show {
        /// Bookmark ID (full UUID or prefix)
        id: String,
    },
    /// Set a bookmark's label (prompts when omitted)
    Label {
        /// Bookmark ID (full UUID or prefix)
        id: String,
        label: Option<String>,
    },
    /// Set a bookmark's description (prompts when omitted)
    Describe {
        /// Bookmark ID (full UUID or prefix)
        id: String,
        description: Option<String>,
    },
    /// Change a bookmark's color (prompts when omitted)
    Color {
        /// Bookmark ID (full UUID or prefix)
        id: String,
        color: Option<String>,
    },
    /// Move a bookmark to another line
    Move {
        /// Bookmark ID (full UUID or prefix)
        id: String,
        /// New line number
        line: u32,
        /// Last line when the bookmark spans several lines
        #[arg(long)]
        end_line: Option<u32>,
    },
    /// Delete a bookmark
    #[command(alias = "rm")]
    Delete {
        /// Bookmark ID (full UUID or prefix)
        id: String,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every bookmark in a file, or in the workspace
    Clear {
        /// Only clear this file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the location of a bookmark as path:line:col
    Jump {
        /// Bookmark ID (full UUID or prefix)
        id: String,
    },
    /// Print the decoration calls for a file
    Decorations {
        /// File path
        file: PathBuf,
        /// Send empty range lists (hide all markers)
        #[arg(long)]
        clear: bool,
        /// Also print calls that carry no ranges
        #[arg(short, long)]
        all: bool,
    },
    /// Show workspace and storage status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, log_file, view.sort, colors.<name>, decoration.<option>)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands don't need the store
    if let Commands::Config { command } = &cli.command {
        return handle_config_command(command.clone(), cli.config.as_ref(), &output);
    }

    let config = Config::load_with_cli_override(cli.config.as_ref())
        .context("Failed to load configuration")?;
    init_logging(&config);

    let workspace_root = match cli.workspace {
        Some(ref path) => path.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let notifier = ChangeNotifier::with_subscribers([Box::new(|root: &BookmarkStoreRoot| {
        debug!(
            files = root.data.len(),
            bookmarks = root.total_count(),
            "Bookmarks changed"
        );
    }) as Subscriber]);
    let mut store = BookmarkStore::open_with_config(&config, &workspace_root, notifier)
        .context("Failed to open bookmark store")?;

    let result = run_command(cli.command, &mut store, &config, &workspace_root, &output);

    // Close the write-behind window before exiting
    if let Err(e) = store.flush().await {
        warn!("Failed to flush bookmarks: {}", e);
        eprintln!("Warning: bookmarks may not have been saved: {}", e);
    }

    result
}

fn run_command(
    command: Commands,
    store: &mut BookmarkStore,
    config: &Config,
    workspace_root: &std::path::Path,
    output: &Output,
) -> Result<()> {
    match command {
        Commands::Toggle { location, options } => {
            commands::bookmark::toggle(store, workspace_root, location, options, output)
        }
        Commands::List { group, sort } => commands::bookmark::list(
            store,
            group.unwrap_or(config.view.group_view),
            sort.unwrap_or(config.view.sort),
            output,
        ),
        Commands::Show { id } => commands::bookmark::show(store, id, output),
        Commands::Label { id, label } => commands::bookmark::label(store, id, label, output),
        Commands::Describe { id, description } => {
            commands::bookmark::describe(store, id, description, output)
        }
        Commands::Color { id, color } => {
            let palette: Vec<String> = config.colors.keys().cloned().collect();
            commands::bookmark::color(store, id, color, &palette, output)
        }
        Commands::Move { id, line, end_line } => {
            commands::bookmark::move_to(store, id, line, end_line, output)
        }
        Commands::Delete { id, yes } => commands::bookmark::delete(store, id, yes, output),
        Commands::Clear { file, yes } => commands::bookmark::clear(store, file, yes, output),
        Commands::Jump { id } => commands::bookmark::jump(store, id, output),
        Commands::Decorations { file, clear, all } => {
            commands::decorations::show(store, config, file, clear, all, output)
        }
        Commands::Status => commands::status::show(store, config, workspace_root, output),
        Commands::Config { .. } => unreachable!(), // Handled in main
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

/// Install the tracing subscriber
///
/// Filter comes from MARKR_LOG, then RUST_LOG. Events go to the configured
/// log file, or stderr.
fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_env("MARKR_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    if let Some(ref log_path) = config.log_file {
        match OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(file) => {
                // Ignore error if already initialized
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                return;
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file {:?}: {}", log_path, e);
            }
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_toggle_selection() {
        let cli = Cli::parse_from([
            "markr", "toggle", "src/main.rs", "3", "--col", "5", "--end-line", "4", "-l", "entry",
        ]);
        match cli.command {
            Commands::Toggle { location, options } => {
                assert!(location.is_selection());
                assert_eq!(location.line, 3);
                assert_eq!(options.label.as_deref(), Some("entry"));
            }
            _ => panic!("expected toggle"),
        }
    }

    #[test]
    fn test_parse_list_view() {
        let cli = Cli::parse_from(["markr", "--json", "ls", "--group", "color", "--sort", "time"]);
        assert!(cli.json);
        match cli.command {
            Commands::List { group, sort } => {
                assert_eq!(group, Some(GroupView::Color));
                assert_eq!(sort, Some(SortOrder::CreatedAt));
            }
            _ => panic!("expected list"),
        }
    }
}
