//! hass CLI
//!
//! Inspect and control a Home Assistant server over its WebSocket API:
//! - list and inspect entities
//! - call services, switch lights, drive thermostats
//! - stream events as they happen

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hass_cli::commands::{self, LightAction};
use hass_cli::output::print_error;
use hass_cli::session::{self, GlobalOptions};
use hass_core::config::{ENV_TOKEN, ENV_URL};
use hass_core::HvacMode;

#[derive(Parser)]
#[command(name = "hass")]
#[command(author, version, about = "Home Assistant from the command line")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Home Assistant URL (e.g. http://homeassistant.local:8123)
    #[arg(long, global = true, env = ENV_URL)]
    url: Option<String>,

    /// Long-lived access token
    #[arg(long, global = true, env = ENV_TOKEN, hide_env_values = true)]
    token: Option<String>,

    /// Command timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entities and their states
    States {
        /// Only show entities of this domain
        #[arg(short, long)]
        domain: Option<String>,
        /// Show every domain, not just the configured ones
        #[arg(short, long, conflicts_with = "domain")]
        all: bool,
        /// Show detailed information
        #[arg(short, long)]
        long: bool,
    },

    /// Show one entity with its attributes
    State {
        /// Entity id (e.g. light.kitchen)
        entity_id: String,
    },

    /// Call a service
    Call {
        /// Service domain (e.g. light)
        domain: String,
        /// Service name (e.g. turn_on)
        service: String,
        /// Target entity
        #[arg(short, long)]
        entity: Option<String>,
        /// Extra service data as a JSON object
        #[arg(long)]
        data: Option<String>,
    },

    /// Control a light
    Light {
        #[command(subcommand)]
        action: LightCommand,
    },

    /// Control a thermostat
    Climate {
        #[command(subcommand)]
        action: ClimateCommand,
    },

    /// Stream events until Ctrl-C
    Watch {
        /// Only events of this type (e.g. state_changed)
        #[arg(short, long)]
        event_type: Option<String>,
    },

    /// Check connectivity and latency
    Ping,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum LightCommand {
    /// Turn a light on
    On {
        entity: String,
        /// Brightness from 0 to 255
        #[arg(short, long)]
        brightness: Option<u8>,
        /// Color as r,g,b
        #[arg(long, value_parser = commands::parse_rgb)]
        rgb: Option<[u8; 3]>,
    },
    /// Turn a light off
    Off { entity: String },
    /// Toggle a light
    Toggle { entity: String },
}

#[derive(Subcommand)]
enum ClimateCommand {
    /// Set the target temperature
    Temperature {
        entity: String,
        #[arg(allow_negative_numbers = true)]
        value: f64,
    },
    /// Set the HVAC mode (off, heat, cool, heat_cool, auto, dry, fan_only)
    Mode { entity: String, mode: HvacMode },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Check that the configuration can be used to connect
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let options = GlobalOptions {
        config: cli.config,
        url: cli.url,
        token: cli.token,
        timeout: cli.timeout,
    };

    match run(cli.command, &options).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, options: &GlobalOptions) -> Result<()> {
    // Configuration commands never touch the network
    let command = match command {
        Commands::Config { action } => {
            return match action {
                ConfigAction::Show => commands::config_show(options),
                ConfigAction::Path => {
                    commands::config_path(options);
                    Ok(())
                }
                ConfigAction::Init { force } => commands::config_init(options, force),
                ConfigAction::Validate => commands::config_validate(options),
            };
        }
        other => other,
    };

    let started = Instant::now();
    let (config, api) = session::connect(options).await?;
    let connect_time = started.elapsed();

    let result = match command {
        Commands::States { domain, all, long } => {
            commands::states_command(&api, &config.app, domain.as_deref(), all, long).await
        }
        Commands::State { entity_id } => commands::state_command(&api, &entity_id).await,
        Commands::Call {
            domain,
            service,
            entity,
            data,
        } => {
            commands::call_command(&api, &domain, &service, entity.as_deref(), data.as_deref())
                .await
        }
        Commands::Light { action } => match action {
            LightCommand::On {
                entity,
                brightness,
                rgb,
            } => commands::light_command(&api, LightAction::On, &entity, brightness, rgb).await,
            LightCommand::Off { entity } => {
                commands::light_command(&api, LightAction::Off, &entity, None, None).await
            }
            LightCommand::Toggle { entity } => {
                commands::light_command(&api, LightAction::Toggle, &entity, None, None).await
            }
        },
        Commands::Climate { action } => match action {
            ClimateCommand::Temperature { entity, value } => {
                commands::climate_temperature_command(&api, &entity, value).await
            }
            ClimateCommand::Mode { entity, mode } => {
                commands::climate_mode_command(&api, &entity, mode).await
            }
        },
        Commands::Watch { event_type } => {
            commands::watch_command(&api, event_type.as_deref()).await
        }
        Commands::Ping => commands::ping_command(&api, connect_time).await,
        // Handled before connecting
        Commands::Config { .. } => Ok(()),
    };

    api.client().close().await;
    result
}
