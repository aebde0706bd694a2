//! drivestore CLI - Command line interface for Google Drive storage.
//!
//! This tool runs single storage operations against Google Drive using the
//! service-account settings found in the environment (or a `.env` file).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use drivestore_storage::{create_default_registry, Storage};

#[derive(Parser)]
#[command(name = "drivestore")]
#[command(about = "drivestore - Google Drive storage operations by file ID")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Impersonate this user through domain-wide delegation.
    #[arg(long, value_name = "EMAIL")]
    delegate: Option<String>,

    /// Operate on items in shared drives.
    #[arg(long)]
    shared_drives: bool,

    /// Allow access to files flagged as abusive.
    #[arg(long)]
    acknowledge_abuse: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a file can be retrieved.
    Exists {
        /// Drive file ID.
        id: String,
    },

    /// Delete a file.
    Delete {
        /// Drive file ID.
        id: String,
    },

    /// Print a file's size in bytes.
    Size {
        /// Drive file ID.
        id: String,
    },

    /// Print a file's last modification time.
    ModifiedTime {
        /// Drive file ID.
        id: String,
    },

    /// Print when the file was last viewed.
    AccessedTime {
        /// Drive file ID.
        id: String,
    },

    /// Print a file's content download link.
    Url {
        /// Drive file ID.
        id: String,
    },
}

impl Cli {
    /// Backend configuration handed to the storage registry.
    fn storage_config(&self) -> serde_json::Value {
        let mut config = serde_json::json!({});
        if let Some(user) = &self.delegate {
            config["create_delegated"] = serde_json::json!(user);
        }
        if self.shared_drives {
            config["supportsTeamDrives"] = serde_json::json!(true);
        }
        if self.acknowledge_abuse {
            config["acknowledgeAbuse"] = serde_json::json!(true);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded settings from {}", path.display());
    }

    let storage = create_default_registry()
        .resolve("gdrive", cli.storage_config())
        .context("Failed to configure Google Drive storage")?;

    match cli.command {
        Commands::Exists { id } => cmd_exists(storage, &id).await,
        Commands::Delete { id } => cmd_delete(storage, &id).await,
        Commands::Size { id } => cmd_size(storage, &id).await,
        Commands::ModifiedTime { id } => cmd_modified_time(storage, &id).await,
        Commands::AccessedTime { id } => cmd_accessed_time(storage, &id).await,
        Commands::Url { id } => cmd_url(storage, &id).await,
    }
}

/// Render an optional value, `null` when absent.
fn or_null<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "null".to_string())
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    or_null(time.map(|t| t.to_rfc3339()))
}

async fn cmd_exists(storage: Arc<dyn Storage>, id: &str) -> Result<()> {
    let exists = storage
        .exists(id)
        .await
        .context("Failed to check file")?;
    println!("{}", exists);
    Ok(())
}

async fn cmd_delete(storage: Arc<dyn Storage>, id: &str) -> Result<()> {
    storage
        .delete(id)
        .await
        .with_context(|| format!("Failed to delete {}", id))?;
    println!("File deleted: {}", id);
    Ok(())
}

async fn cmd_size(storage: Arc<dyn Storage>, id: &str) -> Result<()> {
    let size = storage.size(id).await.context("Failed to get size")?;
    println!("{}", or_null(size));
    Ok(())
}

async fn cmd_modified_time(storage: Arc<dyn Storage>, id: &str) -> Result<()> {
    let time = storage
        .modified_time(id)
        .await
        .context("Failed to get modified time")?;
    println!("{}", format_time(time));
    Ok(())
}

async fn cmd_accessed_time(storage: Arc<dyn Storage>, id: &str) -> Result<()> {
    let time = storage
        .accessed_time(id)
        .await
        .context("Failed to get accessed time")?;
    println!("{}", format_time(time));
    Ok(())
}

async fn cmd_url(storage: Arc<dyn Storage>, id: &str) -> Result<()> {
    let url = storage.url(id).await.context("Failed to get url")?;
    println!("{}", or_null(url));
    Ok(())
}
