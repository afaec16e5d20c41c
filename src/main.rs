//! Diagnosis Bot - Main Entry Point
//!
//! A Telegram group bot that answers `/diagnose` with a random joke
//! diagnosis for a chat member.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use diagnosis_bot::commands::CommandHandler;
use diagnosis_bot::config::{BotSettings, SeverityTable, TelegramConfig};
use diagnosis_bot::diagnosis::DiagnosisComposer;
use diagnosis_bot::directory::MemberDirectory;
use diagnosis_bot::dispatch::{DispatchMessage, Dispatcher};
use diagnosis_bot::platform::ChatPlatform;
use diagnosis_bot::telegram::{InstanceLock, TelegramBot};

/// Telegram bot that diagnoses chat members.
#[derive(Parser, Debug)]
#[command(name = "diagnosis_bot")]
#[command(about = "Hand out random joke diagnoses to Telegram chat members")]
#[command(version)]
struct Args {
    /// Path to a JSON word table overriding the built-in one.
    #[arg(short, long)]
    diagnoses: Option<PathBuf>,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Write the built-in word table to this path and exit.
    #[arg(long)]
    generate_diagnoses: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Handle word table generation
    if let Some(path) = &args.generate_diagnoses {
        return generate_word_table(path);
    }

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    // Load configurations
    let tg_config = TelegramConfig::from_env()
        .context("Failed to load Telegram configuration from environment")?;

    let bot_settings = BotSettings::from_env_with_defaults();

    let composer = load_composer(args.diagnoses.as_deref().or(bot_settings.diagnoses_path.as_deref()))?;

    info!(
        "Loaded word table ({} combinations, style: {:?})",
        composer.table().combinations(),
        bot_settings.diagnosis_style
    );

    // Refuse to run twice against the same bot session
    let lock = InstanceLock::acquire(InstanceLock::path_for(&tg_config.session_path))
        .context("Failed to acquire instance lock")?;
    debug!("Holding instance lock {}", lock.path().display());

    // Connect to Telegram
    let (bot, updates) = TelegramBot::connect(&tg_config, bot_settings.history_scan_limit)
        .await
        .context("Failed to connect to Telegram")?;

    let me = bot
        .bot_identity()
        .await
        .context("Failed to fetch bot identity")?;
    info!("Running as {}", me.mention());

    let directory = Arc::new(MemberDirectory::from_settings(&bot_settings));
    info!(
        "Member snapshots: ttl {}s, order {}",
        directory.ttl().as_secs(),
        directory.policy()
    );

    let mut handler = CommandHandler::new(Arc::clone(&directory), composer, bot_settings.diagnosis_style);
    match &me.handle {
        Some(username) => handler = handler.with_bot_username(username.clone()),
        None => warn!("Bot has no username; /cmd@bot suffixes will not be checked"),
    }

    let bot = Arc::new(bot);
    let handler = Arc::new(handler);

    // Create dispatcher channel
    let (dispatch_tx, dispatch_rx) = mpsc::channel::<DispatchMessage>(4);

    let dispatcher = Dispatcher::new(Arc::clone(&bot), handler);

    // Spawn dispatcher task
    let mut dispatcher_handle = tokio::spawn(async move {
        dispatcher.run(updates, dispatch_rx).await;
    });

    info!("Bot is running. Use Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            let _ = dispatch_tx.send(DispatchMessage::Shutdown).await;
            let _ = (&mut dispatcher_handle).await;
        }
        _ = &mut dispatcher_handle => {
            warn!("Dispatcher stopped unexpectedly");
        }
    }

    // Cleanup
    info!("Shutting down...");
    bot.disconnect();
    drop(lock);

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Builds the composer from a word table file or the built-in lists.
fn load_composer(path: Option<&Path>) -> Result<DiagnosisComposer> {
    let table = match path {
        Some(path) => {
            info!("Loading word table from {}", path.display());
            SeverityTable::load_from_file(path)
                .with_context(|| format!("Failed to load word table {}", path.display()))?
        }
        None => SeverityTable::builtin(),
    };

    DiagnosisComposer::new(table).context("Word table validation failed")
}

/// Writes the built-in word table as an editable example.
fn generate_word_table(path: &Path) -> Result<()> {
    SeverityTable::builtin().save_to_file(path)?;

    println!("✓ Word table written to: {}", path.display());
    println!("\nTo use it:");
    println!("1. Edit the word lists (every level needs problems, body_parts and qualifiers)");
    println!("2. Check it: validate_diagnoses --file {}", path.display());
    println!("3. Run: diagnosis_bot --diagnoses {}", path.display());

    Ok(())
}
