use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use nixnav::instance::{self, Acquired};
use nixnav::output;
use nixnav::query::parse_query;
use nixnav::scan::{EntryKind, ScanOrchestrator, SearchEngine, SearchMode, SearchRequest};
use nixnav::server::{get_instance_socket_path, get_socket_path, IndexClient};
use nixnav::utils::progress::Spinner;
use nixnav::utils::{self, AppConfig, LogTarget};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on one non-interactive search, covering service launch and fallback scans
const SEARCH_LIMIT: Duration = Duration::from_secs(120);

#[derive(Parser)]
#[command(name = "nixnav")]
#[command(about = "Find files under bookmarked directories as you type")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Toggle a running instance instead of starting a new one
    #[arg(long)]
    toggle: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive finder (default)
    Ui {
        /// Initial query
        query: Option<String>,
    },
    /// Run one search and print the results
    Search {
        /// Match file contents instead of names
        #[arg(short, long)]
        content: bool,

        /// Restrict name search to files or directories
        #[arg(short, long, value_enum, default_value_t = EntryKind::All)]
        kind: EntryKind,

        /// Never colorize output
        #[arg(long)]
        no_color: bool,

        /// Query, e.g. `proj: *.md readme`
        #[arg(trailing_var_arg = true, required = true)]
        query: Vec<String>,
    },
    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        action: BookmarkAction,
    },
    /// Re-walk one bookmark root in the index service
    Rescan {
        /// Bookmark name
        name: String,
    },
    /// Show index service statistics
    Stats,
    /// Check whether the index service answers
    Ping,
}

#[derive(Subcommand)]
enum BookmarkAction {
    /// Add a bookmark and register it with the index service
    Add { name: String, path: PathBuf },
    /// List bookmarks
    List,
    /// Rename a bookmark
    Rename { old: String, new: String },
    /// Remove a bookmark
    Remove { name: String },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    if cli.toggle {
        return run_ui(None);
    }

    match cli.command {
        None => run_ui(None),
        Some(Commands::Ui { query }) => run_ui(query),
        Some(command) => {
            utils::init_logging(LogTarget::Stderr);
            run_command(command)
        }
    }
}

/// Start the TUI, or hand off to the instance already running
fn run_ui(query: Option<String>) -> Result<ExitCode> {
    let listener = match instance::acquire(&get_instance_socket_path())? {
        Acquired::Forwarded => return Ok(ExitCode::SUCCESS),
        Acquired::Primary(listener) => listener,
    };

    if let Ok(dir) = utils::get_app_data_dir() {
        utils::init_logging(LogTarget::File(dir.join("nixnav.log")));
    }

    let config = AppConfig::load()?;
    run_tui(config, query, listener)?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "interactive")]
fn run_tui(config: AppConfig, query: Option<String>, listener: instance::InstanceListener) -> Result<()> {
    nixnav::tui::run(config, query, listener)
}

#[cfg(not(feature = "interactive"))]
fn run_tui(_config: AppConfig, _query: Option<String>, _listener: instance::InstanceListener) -> Result<()> {
    bail!("built without the `interactive` feature; use `nixnav search`")
}

fn run_command(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Ui { query } => return run_ui(query),
        Commands::Search {
            content,
            kind,
            no_color,
            query,
        } => {
            let config = AppConfig::load()?;
            let parsed = parse_query(&query.join(" "), &config.bookmarks);
            let mode = if content { SearchMode::Content } else { SearchMode::Name };
            let request = SearchRequest::build(&parsed, &config.bookmarks, None, kind, mode);

            let mut orchestrator = ScanOrchestrator::new(Arc::new(SearchEngine::from_config(&config)));
            let results = orchestrator
                .run_once(request, SEARCH_LIMIT)
                .context("Search did not finish in time")?;

            output::print_results(&results.entries, !no_color)?;
            eprintln!("{}", results.status_text());
        }
        Commands::Bookmark { action } => handle_bookmark_command(action)?,
        Commands::Rescan { name } => {
            let config = AppConfig::load()?;
            let Some(bookmark) = config.find_bookmark(&name) else {
                bail!("No bookmark named {:?}", name);
            };

            let client = service_client(&config);
            let result = Spinner::run(format!("Rescanning {}", bookmark.name), || client.rescan(&bookmark.path));

            let indexed = result.with_context(|| format!("Rescan of {} failed", bookmark.path.display()))?;
            println!("Indexed {} entries under {}", indexed, bookmark.path.display());
        }
        Commands::Stats => {
            let config = AppConfig::load()?;
            let stats = service_client(&config).stats();
            output::print_field("files", stats.file_count)?;
            output::print_field("trigrams", stats.term_count)?;
            output::print_field("bookmarks", stats.bookmark_count)?;
            output::print_field("connected", stats.connected)?;
        }
        Commands::Ping => {
            let config = AppConfig::load()?;
            if service_client(&config).ping() {
                println!("pong");
            } else {
                eprintln!("Index service is not responding");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn service_client(config: &AppConfig) -> IndexClient {
    IndexClient::new(get_socket_path()).with_service_command(config.daemon_command.clone())
}

fn handle_bookmark_command(action: BookmarkAction) -> Result<()> {
    let mut config = AppConfig::load()?;

    match action {
        BookmarkAction::Add { name, path } => {
            let bookmark = config.add_bookmark(&name, &path)?.clone();
            config.save()?;
            println!("Added {} -> {}", bookmark.name, bookmark.path.display());

            let client = service_client(&config);
            let accepted = Spinner::run(format!("Indexing {}", bookmark.name), || {
                client.register_bookmark(&bookmark.name, &bookmark.path, bookmark.is_network)
            });

            if accepted {
                println!("Registered with index service");
            } else {
                println!("Index service unavailable; searches will scan with fd");
            }
        }
        BookmarkAction::List => {
            for (i, b) in config.bookmarks.iter().enumerate() {
                let marker = if i == config.last_bookmark { "*" } else { " " };
                let network = if b.is_network { " (network)" } else { "" };
                println!("{} {:<16} {}{}", marker, b.name, b.path.display(), network);
            }
        }
        BookmarkAction::Rename { old, new } => {
            config.rename_bookmark(&old, &new)?;
            config.save()?;
            println!("Renamed {} -> {}", old, new);
        }
        BookmarkAction::Remove { name } => {
            let removed = config.remove_bookmark(&name)?;
            config.save()?;
            println!("Removed {} ({})", removed.name, removed.path.display());
        }
    }

    Ok(())
}
