use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use donna::commands::{
    auth::{AuthGoogleCommand, SetApiKeyCommand},
    calendar::{AvailabilityCommand, CreateEventCommand, GetEventCommand, ListEventsCommand},
    chat::ChatCommand,
    Command, CommandContext,
};
use donna::config::Config;

#[derive(Parser)]
#[command(name = "donna")]
#[command(about = "Donna - streaming chat and Google Calendar assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,
    /// List upcoming events (next 24 hours by default)
    Events {
        /// Show this day instead (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },
    /// Create a calendar event
    CreateEvent {
        #[arg(long)]
        summary: Option<String>,
        /// Start time, e.g. 2024-03-16T09:00:00
        #[arg(long)]
        start: Option<String>,
        /// End time, e.g. 2024-03-16T10:00:00
        #[arg(long)]
        end: Option<String>,
        /// IANA time zone for start and end (defaults to the configured timezone)
        #[arg(long)]
        time_zone: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Read the whole event from a JSON file in Google Calendar format
        #[arg(long, conflicts_with_all = ["summary", "start", "end", "time_zone", "location", "description"])]
        from_file: Option<PathBuf>,
    },
    /// Show one event by id
    GetEvent {
        event_id: String,
    },
    /// Print the free periods of a day
    Availability {
        /// Day to check (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
    /// Authorize Google Calendar access
    Auth {
        /// Only report the stored token state
        #[arg(long)]
        status: bool,
    },
    /// Set the chat API key in configuration
    SetApiKey {
        /// The API key from platform.openai.com
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load().await.context("Failed to load application configuration")?;

    // Initialize logging (stderr, stdout carries command output)
    let log_level = if cli.debug { "debug" } else { config.general.log_level.as_str() };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("donna={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Donna starting up");
    debug!("Configuration loaded from {:?}", Config::get_config_path()?);

    let context = CommandContext::new(config);

    let mut command: Box<dyn Command> = match cli.command {
        Commands::Chat => Box::new(ChatCommand),
        Commands::Events { date } => Box::new(ListEventsCommand { date }),
        Commands::CreateEvent {
            summary,
            start,
            end,
            time_zone,
            location,
            description,
            from_file,
        } => Box::new(CreateEventCommand {
            summary,
            start,
            end,
            time_zone,
            location,
            description,
            from_file,
        }),
        Commands::GetEvent { event_id } => Box::new(GetEventCommand { event_id }),
        Commands::Availability { date } => Box::new(AvailabilityCommand { date }),
        Commands::Auth { status } => Box::new(AuthGoogleCommand { status_only: status }),
        Commands::SetApiKey { key } => Box::new(SetApiKeyCommand { api_key: key }),
    };

    command.execute(&context).await.context("Failed to execute command")?;

    Ok(())
}
