use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tab_freezer::app::App;
use tab_freezer::config::Config;
use tab_freezer::host::{MemoryBrowser, WindowId};
use tab_freezer::popup::session_label;
use tab_freezer::restore::Restorer;
use tab_freezer::store::{FileStore, SessionStore};
use tab_freezer::{freeze, snapshot, tui};

#[derive(Parser)]
#[command(name = "tab-freezer", about = "Freeze tabs and save or restore browsing sessions")]
struct Cli {
    /// Browser state file (defaults to the data dir)
    #[arg(long, global = true)]
    browser: Option<PathBuf>,
    /// Saved-session storage file (defaults to the data dir)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the interactive popup (default)
    Popup,
    /// List saved sessions
    Ls,
    /// Save the current windows as a new session
    Save,
    /// Restore saved session <INDEX>
    Open { index: usize },
    /// Delete saved session <INDEX>
    Delete { index: usize },
    /// Print the stored sessions as JSON
    Export,
    /// Discard tabs: the active one by default
    Freeze {
        /// Discard every tab of this window
        #[arg(long, conflicts_with = "all")]
        window: Option<u32>,
        /// Discard every tab of every window
        #[arg(long)]
        all: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Popup);
    init_tracing(matches!(command, Commands::Popup))?;

    let config = Config::load();
    let browser_path = cli
        .browser
        .or_else(|| config.storage.browser_path.clone())
        .unwrap_or_else(default_browser_path);
    let store_path = cli
        .store
        .or_else(|| config.storage.path.clone())
        .unwrap_or_else(FileStore::default_path);

    let browser = Arc::new(
        MemoryBrowser::load_from(&browser_path)
            .with_context(|| format!("loading browser state from {}", browser_path.display()))?,
    );
    let store = SessionStore::new(FileStore::new(store_path));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command(command, Arc::clone(&browser), store, config))?;

    browser
        .save_to(&browser_path)
        .with_context(|| format!("saving browser state to {}", browser_path.display()))
}

async fn run_command(
    command: Commands,
    browser: Arc<MemoryBrowser>,
    store: SessionStore<FileStore>,
    config: Config,
) -> anyhow::Result<()> {
    match command {
        Commands::Popup => {
            tui::install_panic_hook();
            App::run(browser, store, config).await
        }
        Commands::Ls => {
            let sessions = store.load()?;
            if sessions.is_empty() {
                println!("No saved sessions.");
            }
            for (i, session) in sessions.iter().enumerate() {
                println!("{}: {}", i, session_label(session));
            }
            Ok(())
        }
        Commands::Save => {
            let mut session = snapshot::capture(browser.as_ref()).await?;
            session.refresh_timestamp();
            println!(
                "saved {} windows, {} tabs",
                session.window_count(),
                session.tab_count()
            );
            store.append(session)?;
            Ok(())
        }
        Commands::Open { index } => {
            let sessions = store.load()?;
            let session = sessions
                .get(index)
                .with_context(|| format!("no saved session {}", index))?;
            let reports = Restorer::new(browser.as_ref(), config.restore)
                .open_windows(&session.windows)
                .await?;
            for report in reports {
                if let Some(id) = report.window_id {
                    println!(
                        "window {}: {} tabs, {} frozen, {} timed out",
                        id, report.created, report.discarded, report.timed_out
                    );
                }
            }
            Ok(())
        }
        Commands::Delete { index } => {
            let mut sessions = store.load()?;
            match store.delete(&mut sessions, index)? {
                Some(_) => println!("deleted session {}", index),
                None => println!("no saved session {}", index),
            }
            Ok(())
        }
        Commands::Export => {
            let raw = store.export_raw()?.unwrap_or_else(|| "[]".to_string());
            println!("{}", raw);
            Ok(())
        }
        Commands::Freeze { window, all } => {
            if all {
                let frozen = freeze::freeze_all(browser.as_ref()).await?;
                println!("froze {} tabs", frozen);
            } else if let Some(id) = window {
                let frozen = freeze::freeze_window(browser.as_ref(), WindowId(id)).await?;
                println!("froze {} tabs in window {}", frozen, id);
            } else if !freeze::freeze_active_tab(browser.as_ref()).await? {
                println!("no focused window");
            }
            Ok(())
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tab-freezer")
}

fn default_browser_path() -> PathBuf {
    data_dir().join("browser.json")
}

/// The popup owns the terminal, so its logs go to a file next to the data.
fn init_tracing(popup: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if popup {
        let dir = data_dir();
        fs::create_dir_all(&dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("tab-freezer.log"))?;
        builder.with_ansi(false).with_writer(Mutex::new(file)).init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
    Ok(())
}
