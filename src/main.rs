//! Locafoto Vault - CLI
//!
//! Command-line interface for vault operations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use uuid::Uuid;

use locafoto_vault::batch::BatchReport;
use locafoto_vault::{CancelToken, ExportFormat, ItemFilter, NewItem, Vault};

#[derive(Parser)]
#[command(name = "locafoto")]
#[command(version = locafoto_vault::VERSION)]
#[command(about = "Locafoto - local-first encrypted media vault")]
struct Cli {
    /// Vault path
    #[arg(short, long, default_value = "./vault", global = true)]
    vault: PathBuf,

    /// PIN code
    #[arg(short, long, env = "LOCAFOTO_PIN", global = true, hide_env_values = true)]
    pin: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up a new vault
    Init,

    /// Manage named transfer keys
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Encrypt a file into the vault
    Add {
        path: PathBuf,

        /// Album id
        #[arg(long)]
        album: Option<Uuid>,

        /// Encrypted thumbnail source
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },

    /// List items, newest capture first
    List {
        #[arg(long)]
        album: Option<Uuid>,

        #[arg(long)]
        favorites: bool,

        #[arg(long)]
        include_hidden: bool,
    },

    /// Show one item's metadata
    Show { id: Uuid },

    /// Decrypt an item to a file
    Extract { id: Uuid, output: PathBuf },

    /// Export items as transfer files
    Export {
        ids: Vec<Uuid>,

        /// Named key to seal the transfer with
        #[arg(short, long)]
        key: String,

        #[arg(short, long, value_enum, default_value_t = Format::Lfs)]
        format: Format,

        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Import .lfs containers, .locaphoto bundles or plain media files
    Import { paths: Vec<PathBuf> },

    /// Delete an item
    Delete { id: Uuid },

    /// Mark or unmark an item as favorite
    Favorite {
        id: Uuid,
        #[arg(long)]
        off: bool,
    },

    /// List albums
    Albums,

    /// Remove blobs no item references
    Reclaim,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Generate a random named key
    Create { name: String },

    /// Show named keys and how many imports depend on them
    List,

    /// Delete an unused named key
    Delete { name: String },

    /// Write a named key to a .lfkey file
    Export { name: String, output: PathBuf },

    /// Add a named key from a .lfkey file
    Import { path: PathBuf },

    /// Add a named key from a hex string
    ImportHex { name: String, hex: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Lfs,
    Locaphoto,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Lfs => ExportFormat::Container,
            Format::Locaphoto => ExportFormat::Bundle,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let vault = Vault::open(&cli.vault)
        .with_context(|| format!("opening vault at {}", cli.vault.display()))?;

    let result = run(&vault, cli.pin.as_deref(), cli.command).await;
    vault.shutdown().await?;
    result
}

fn require_pin(pin: Option<&str>) -> anyhow::Result<&str> {
    match pin {
        Some(pin) => Ok(pin),
        None => bail!("a PIN is required (--pin or LOCAFOTO_PIN)"),
    }
}

async fn run(vault: &Vault, pin: Option<&str>, command: Commands) -> anyhow::Result<()> {
    if let Commands::Init = command {
        vault.initialize(require_pin(pin)?)?;
        println!("✅ Vault created at: {}", vault.root().display());
        return Ok(());
    }

    if !vault.is_initialized()? {
        bail!("vault at {} is not initialized, run `locafoto init`", vault.root().display());
    }
    vault.unlock(require_pin(pin)?)?;

    match command {
        Commands::Init => {}

        Commands::Key { command } => run_key(vault, command).await?,

        Commands::Add {
            path,
            album,
            thumbnail,
        } => {
            let data = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let mut input = NewItem::new(data);
            input.album_id = album;
            if let Some(thumb) = thumbnail {
                input = input.with_thumbnail(std::fs::read(&thumb)?);
            }

            let item = vault.add_item(input).await?;
            println!("✅ Added {} ({}, {} bytes)", item.id, item.format, item.original_size);
        }

        Commands::List {
            album,
            favorites,
            include_hidden,
        } => {
            let items = vault
                .list_items(ItemFilter {
                    album,
                    favorites_only: favorites,
                    include_hidden,
                    ..Default::default()
                })
                .await?;

            if items.is_empty() {
                println!("📭 No items in vault");
            } else {
                println!("📷 Items in vault ({}):", items.len());
                println!("{:-<72}", "");
                for item in items {
                    let hidden = if item.is_hidden { "🔒" } else { "  " };
                    let fav = if item.is_favorite { "⭐" } else { "  " };
                    println!(
                        "{} {} {} - {} {} ({} bytes)",
                        hidden,
                        fav,
                        item.id,
                        item.capture_date.format("%Y-%m-%d %H:%M"),
                        item.format,
                        item.original_size
                    );
                }
            }
        }

        Commands::Show { id } => {
            let item = vault.get_item(id).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }

        Commands::Extract { id, output } => {
            let data = vault.read_item(id).await?;
            std::fs::write(&output, &data)?;
            println!("✅ Item written to: {}", output.display());
        }

        Commands::Export {
            ids,
            key,
            format,
            out,
        } => {
            let ids = if ids.is_empty() {
                vault.all_items().await?.into_iter().map(|i| i.id).collect()
            } else {
                ids
            };
            let report = vault
                .export_items(ids, &key, format.into(), &out, &cancel_on_ctrl_c(), print_progress)
                .await?;

            for path in &report.succeeded {
                println!("📤 {}", path.display());
            }
            finish_batch(&report)?;
        }

        Commands::Import { paths } => {
            let report = vault
                .import_files(paths, &cancel_on_ctrl_c(), print_progress)
                .await;

            for item in &report.succeeded {
                match item.source_key {
                    Some(ref key) => println!("📥 {} (key '{}')", item.id, key),
                    None => println!("📥 {}", item.id),
                }
            }
            finish_batch(&report)?;
        }

        Commands::Delete { id } => {
            if vault.delete_item(id).await? {
                println!("🗑️ Deleted {}", id);
            } else {
                println!("Nothing to delete for {}", id);
            }
        }

        Commands::Favorite { id, off } => {
            if !vault.set_favorite(id, !off).await? {
                bail!("no item {}", id);
            }
        }

        Commands::Albums => {
            for album in vault.albums().await? {
                let latest = album
                    .latest_capture
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!("{}  {:>5} items  {}", album.album_id, album.item_count, latest);
            }
        }

        Commands::Reclaim => {
            let removed = vault.reclaim_orphans().await?;
            println!("🧹 Reclaimed {} orphan blob(s)", removed.len());
        }
    }

    Ok(())
}

/// Token cancelled by the first Ctrl-C; the batch stops before its next item
fn cancel_on_ctrl_c() -> CancelToken {
    let token = CancelToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted, stopping after the current item");
            on_signal.cancel();
        }
    });
    token
}

async fn run_key(vault: &Vault, command: KeyCommands) -> anyhow::Result<()> {
    match command {
        KeyCommands::Create { name } => {
            vault.create_key(&name).await?;
            println!("🔑 Created key '{}'", name);
        }

        KeyCommands::List => {
            let stats = vault.key_stats().await?;
            if stats.is_empty() {
                println!("No named keys");
            }
            for key in stats {
                let last = key
                    .last_used_at
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "{:<24} used by {:>4} import(s), last used {}{}",
                    key.name,
                    key.usage_count,
                    last,
                    if key.deletable { "" } else { " (in use)" }
                );
            }
        }

        KeyCommands::Delete { name } => {
            vault.delete_key(&name).await?;
            println!("🗑️ Deleted key '{}'", name);
        }

        KeyCommands::Export { name, output } => {
            let bytes = vault.export_named_key(&name).await?;
            write_private(&output, &bytes)?;
            println!("⚠️ {} holds the raw key, share it only over a trusted channel", output.display());
        }

        KeyCommands::Import { path } => {
            let bytes = std::fs::read(&path)?;
            let name = vault.import_named_key(&bytes).await?;
            println!("🔑 Imported key '{}'", name);
        }

        KeyCommands::ImportHex { name, hex } => {
            vault.import_hex_key(&name, &hex).await?;
            println!("🔑 Imported key '{}'", name);
        }
    }
    Ok(())
}

fn print_progress(progress: &locafoto_vault::BatchProgress) {
    log::info!("[{}/{}] {}", progress.completed, progress.total, progress.current);
}

fn finish_batch<T>(report: &BatchReport<T>) -> anyhow::Result<()> {
    for failure in &report.failed {
        eprintln!("❌ {} [{}]: {}", failure.label, failure.kind, failure.message);
    }
    if report.cancelled {
        println!("⏹ Cancelled, {} item(s) skipped", report.skipped());
    }
    if !report.is_complete_success() {
        bail!(
            "{} of {} item(s) not processed",
            report.failed.len() + report.skipped(),
            report.total
        );
    }
    Ok(())
}

fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(bytes)
}
