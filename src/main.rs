use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use freelance_desk::application::errors::{BotError, ConfigError};
use freelance_desk::application::messaging::{CommandDispatcher, Reply};
use freelance_desk::application::services::Desk;
use freelance_desk::domain::traits::Bot;
use freelance_desk::infrastructure::adapters::ConsoleAdapter;
use freelance_desk::infrastructure::config::Config;
use freelance_desk::infrastructure::database::SqliteStore;

#[derive(Parser)]
#[command(name = "freelance-desk")]
#[command(about = "Order and review desk for freelance employees", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Database path (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the console desk
    Run,
    /// Show version
    Version,
    /// Generate default config
    InitConfig,
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => {
            if let Err(e) = run_desk(&cli.config, cli.db) {
                tracing::error!("{}", e);
                std::process::exit(1);
            }
        }
        Commands::Version => {
            println!("freelance-desk v{}", env!("CARGO_PKG_VERSION"));
        }
        Commands::InitConfig => {
            init_config();
        }
    }
}

/// An existing but invalid config file is an error; a missing one means defaults.
fn load_config(config_path: &str) -> Result<Config, ConfigError> {
    if Path::new(config_path).exists() {
        let mut config = Config::load(config_path)?;
        config.apply_env();
        Ok(config)
    } else {
        tracing::info!(path = config_path, "No config file, using defaults");
        Ok(Config::load_env())
    }
}

fn run_desk(config_path: &str, db_override: Option<PathBuf>) -> Result<(), BotError> {
    let mut config = load_config(config_path)?;
    if let Some(path) = db_override {
        config.database.path = path;
    }
    config.validate()?;

    tracing::info!(name = %config.bot.name, db = %config.database.path.display(), "Starting desk");

    let store = SqliteStore::open(&config.database.path)?;
    let desk = Arc::new(Desk::new(Arc::new(store), config.directory.page_size));
    let dispatcher = CommandDispatcher::new(desk, &config.bot.prefix, config.reviews.profile_limit);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| BotError::Internal(format!("Failed to start runtime: {}", e)))?;
    rt.block_on(async {
        let bot = ConsoleAdapter::new(&config.bot.name);
        run_console_bot(bot, dispatcher).await;
    });
    Ok(())
}

async fn run_console_bot(bot: ConsoleAdapter, mut dispatcher: CommandDispatcher) {
    if let Err(e) = bot.start().await {
        tracing::error!("Failed to start bot: {}", e);
        return;
    }

    let info = bot.bot_info();
    tracing::info!("Bot started: @{}", info.username);

    // Main loop (for console mode)
    while let Some(input) = bot.read_line("> ").await {
        if input.is_empty() {
            continue;
        }
        if matches!(input.as_str(), "quit" | "exit") {
            break;
        }

        let reply = dispatcher.process_text("console", &input).await;
        deliver(&bot, reply).await;
    }

    tracing::info!("Console input closed, shutting down");
}

/// Print the reply, then push notifications to the counterpart parties.
async fn deliver<B: Bot>(bot: &B, reply: Reply) {
    if !reply.text.is_empty() {
        if let Err(e) = bot.send_message("console", &reply.text).await {
            tracing::warn!("Failed to send reply: {}", e);
        }
    }
    for note in reply.notifications {
        if let Err(e) = bot.notify_user(note.external_user_id, &note.text).await {
            tracing::warn!(external_user_id = note.external_user_id, "Notification not delivered: {}", e);
        }
    }
}

fn init_config() {
    match serde_yaml::to_string(&Config::default()) {
        Ok(yaml) => {
            println!("{}", yaml);
            println!("\nSave this to config.yaml and adjust as needed.");
        }
        Err(e) => tracing::error!("Failed to render default config: {}", e),
    }
}
