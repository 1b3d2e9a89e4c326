//! Kintsugi CLI - encrypted, offline-first reader
//!
//! Usage:
//!   kintsugi read [--page N]     Show a page (resumes where you left off)
//!   kintsugi next | prev         Turn the page
//!   kintsugi bookmark            Add, remove or list bookmarks
//!   kintsugi history             List or clear recently viewed pages
//!   kintsugi passphrase set      Change the encryption passphrase
//!   kintsugi cache refresh       Refresh the offline snapshot
//!   kintsugi status              Session summary

use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kintsugi_agent::{AgentConfig, AgentHandle, CacheAgent, HttpNetwork, SnapshotStore};
use kintsugi_core::{Reader, ReaderConfig};
use kintsugi_store::{sqlite, SqliteStore};

/// How long `cache refresh` waits for the agent to report back
const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for the document and offline assets
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(name = "kintsugi")]
#[command(author, version, about = "Encrypted, offline-first document reader")]
#[command(
    long_about = "Kintsugi Reader - a paginated reader whose local state is encrypted \
    under a passphrase-derived key."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.kintsugi/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overrides the config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Offline snapshot database, overrides the config
    #[arg(long, global = true)]
    offline_database: Option<PathBuf>,

    /// Read the document from a local JSON file on a cold start
    #[arg(long, global = true)]
    document: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a page
    Read {
        /// Page number, starting at 1
        #[arg(long)]
        page: Option<usize>,
    },

    /// Go to the next page
    Next,

    /// Go to the previous page
    Prev,

    /// Manage bookmarks
    Bookmark {
        #[command(subcommand)]
        action: BookmarkAction,
    },

    /// Recently viewed pages
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Manage the encryption passphrase
    Passphrase {
        #[command(subcommand)]
        action: PassphraseAction,
    },

    /// Manage the offline cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Show the session summary
    Status,
}

#[derive(Subcommand)]
enum BookmarkAction {
    /// Bookmark the current page
    Add,
    /// Remove the bookmark on a page
    Remove {
        /// Page number, starting at 1
        page: usize,
    },
    /// List bookmarks, newest first
    List,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List recently viewed pages
    List,
    /// Forget every viewed page
    Clear,
}

#[derive(Subcommand)]
enum PassphraseAction {
    /// Set a new passphrase and re-encrypt stored data. Empty means default.
    Set {
        value: Option<String>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Ask the offline agent to re-download every asset
    Refresh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &cli.config {
        Some(path) => ReaderConfig::load_from(path),
        None => ReaderConfig::load(),
    }
    .context("Failed to load config")?;
    if let Some(database) = cli.database {
        config.database = Some(database);
    }
    if let Some(offline_database) = cli.offline_database {
        config.offline_database = Some(offline_database);
    }
    if let Some(document) = cli.document {
        config.document_path = Some(document);
    }

    let db_path = match &config.database {
        Some(path) => path.clone(),
        None => sqlite::default_path()?,
    };
    let store = SqliteStore::open(db_path.clone())
        .with_context(|| format!("Failed to open {}", db_path.display()))?;

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")?;
    let agent = start_agent(&config, client.clone()).await?;

    let source = config.document_source(client, agent.client().controller())?;
    let mut reader = Reader::resume(store, source.as_ref())
        .await
        .context("Could not load the document")?;
    if let Some(notice) = reader.attach_agent(agent.client()) {
        println!("{}", notice);
    }

    match cli.command {
        Commands::Read { page } => {
            if let Some(page) = page {
                reader.go_to_page(page.saturating_sub(1));
            }
            print_page(&reader);
        }

        Commands::Next => {
            reader.next_page();
            print_page(&reader);
        }

        Commands::Prev => {
            reader.prev_page();
            print_page(&reader);
        }

        Commands::Bookmark { action } => match action {
            BookmarkAction::Add => {
                let notice = reader.add_bookmark()?;
                println!("{} (page {})", notice, reader.current_page() + 1);
            }
            BookmarkAction::Remove { page } => {
                if reader.remove_bookmark(page.saturating_sub(1))? {
                    println!("Removed bookmark on page {}", page);
                } else {
                    println!("No bookmark on page {}", page);
                }
            }
            BookmarkAction::List => {
                let bookmarks = &reader.state().bookmarks;
                if bookmarks.is_empty() {
                    println!("No bookmarks yet");
                }
                for bookmark in bookmarks.iter() {
                    println!(
                        "  {:>3}  {:<32} {}",
                        bookmark.page + 1,
                        page_title(&reader, bookmark.page),
                        timestamp(bookmark.at)
                    );
                }
            }
        },

        Commands::History { action } => match action {
            HistoryAction::List => {
                for entry in reader.state().history.iter() {
                    println!(
                        "  {:>3}  {:<32} {}",
                        entry.page + 1,
                        page_title(&reader, entry.page),
                        timestamp(entry.at)
                    );
                }
            }
            HistoryAction::Clear => {
                reader.clear_history()?;
                println!("History cleared");
            }
        },

        Commands::Passphrase { action } => match action {
            PassphraseAction::Set { value } => {
                let notice = reader.apply_passphrase(value.as_deref().unwrap_or(""))?;
                println!("{}", notice);
            }
        },

        Commands::Cache { action } => match action {
            CacheAction::Refresh => refresh_offline(&mut reader).await,
        },

        Commands::Status => {
            let state = reader.state();
            println!("Page:       {} / {}", reader.current_page() + 1, reader.page_count());
            println!("Progress:   {}%", reader.progress_percent());
            println!("Bookmarks:  {}", state.bookmarks.len());
            println!("History:    {}", state.history.len());
            println!("Offline:    {}", state.offline);
            println!("Database:   {}", db_path.display());
        }
    }

    agent.shutdown();
    Ok(())
}

fn print_page(reader: &Reader<SqliteStore>) {
    let Some(page) = reader.page() else {
        println!("No page to show");
        return;
    };

    println!("{}", page.title);
    println!();
    for paragraph in &page.body {
        println!("{}", paragraph);
        println!();
    }
    println!("[{}] {} (2x: {})", page.image.alt, page.image.regular, page.image.retina);
    println!(
        "Page {} of {} · {}%",
        reader.current_page() + 1,
        reader.page_count(),
        reader.progress_percent()
    );
}

fn page_title(reader: &Reader<SqliteStore>, index: usize) -> String {
    reader
        .state()
        .document
        .as_ref()
        .and_then(|d| d.page(index))
        .map(|p| p.title.clone())
        .unwrap_or_else(|| format!("Page {}", index + 1))
}

fn timestamp(at: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(at)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Register the offline agent on its snapshot and let it settle.
async fn start_agent(config: &ReaderConfig, client: reqwest::Client) -> anyhow::Result<AgentHandle> {
    let mut agent_config = AgentConfig::new(config.scope_url()?);
    agent_config.cache_name = config.cache_name.clone();

    let offline_path = config.offline_path()?;
    let snapshot = SnapshotStore::open(offline_path.clone())
        .with_context(|| format!("Failed to open {}", offline_path.display()))?;
    let agent = CacheAgent::persistent(agent_config, snapshot, Arc::new(HttpNetwork::new(client)))
        .context("Failed to load the offline snapshot")?;

    let handle = AgentHandle::spawn(agent);
    let state = handle.ready().await;
    tracing::debug!(?state, "Agent settled");
    Ok(handle)
}

async fn refresh_offline(reader: &mut Reader<SqliteStore>) {
    println!("{}", reader.sync_offline_status());

    if let Some(notice) = reader.request_offline_cache() {
        println!("{}", notice);
        return;
    }
    println!("{}", reader.state().offline);

    match tokio::time::timeout(REFRESH_TIMEOUT, reader.next_agent_notice()).await {
        Ok(Some(notice)) => println!("{}", notice),
        Ok(None) => println!("Offline agent stopped before finishing"),
        Err(_) => println!("Offline cache refresh did not finish, see the log for details"),
    }
}
