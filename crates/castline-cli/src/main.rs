//! Castline CLI - control OBS Studio or Streamlabs Desktop from the terminal
//!
//! Connects over obs-websocket, runs one command and exits. Failures exit
//! non-zero.

use anyhow::{bail, Context, Result};
use castline_client::{SessionManager, SessionManagerBuilder, StateSubscriber};
use castline_core::{SessionState, SoftwareVariant};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

use config::{FileConfig, Overrides, Settings};

/// How long `start`/`stop` wait for the software to confirm
const CONFIRM_WAIT: Duration = Duration::from_secs(5);

/// Castline - streaming software remote control
#[derive(Parser)]
#[command(name = "castline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (default: ~/.config/castline/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// obs-websocket URL; the OBS default falls back to Streamlabs' port
    #[arg(short, long, global = true)]
    address: Option<String>,

    /// obs-websocket password
    #[arg(short, long, global = true, env = "CASTLINE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and show which software answered
    Status,

    /// Start streaming
    Start,

    /// Stop streaming
    Stop,

    /// Switch the program scene
    Scene {
        /// Scene name
        name: String,
    },

    /// List scenes
    Scenes {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print every session state change until Ctrl+C
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.log_level, cli.json_logs)?;

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::load_default()?,
    };
    let settings = Settings::resolve(
        file,
        Overrides {
            address: cli.address,
            password: cli.password,
            timeout_ms: cli.timeout_ms,
        },
    );

    let session = SessionManagerBuilder::new()
        .config(settings.session.clone())
        .build();

    let variant = session
        .try_connect(settings.target.clone())
        .await
        .with_context(|| format!("Could not connect to {}", settings.target.address))?;

    let address = session
        .active_address()
        .unwrap_or_else(|| settings.target.address.clone());
    info!("Session open with {} at {}", variant, address);

    // Subscribed after connecting, so only later changes are reported
    let mut state = session.subscribe();

    let outcome = run(&cli.command, &session, &mut state, variant, &address).await;
    session.disconnect().await;
    outcome
}

async fn run(
    command: &Commands,
    session: &SessionManager,
    state: &mut StateSubscriber,
    variant: SoftwareVariant,
    address: &str,
) -> Result<()> {
    match command {
        Commands::Status => {
            println!(
                "{} {} at {}",
                "Connected".green().bold(),
                variant_label(variant),
                address
            );
            println!("  state: {}", state_label(session.state()));
        }
        Commands::Start => {
            session
                .try_start_streaming()
                .await
                .context("Could not start streaming")?;
            confirm(state, SessionState::Streaming, "Streaming").await;
        }
        Commands::Stop => {
            session
                .try_stop_streaming()
                .await
                .context("Could not stop streaming")?;
            confirm(state, SessionState::Connected, "Stream stopped").await;
        }
        Commands::Scene { name } => {
            session
                .try_set_current_scene(name)
                .await
                .with_context(|| format!("Could not switch to scene '{}'", name))?;
            println!("{} {}", "Scene".green().bold(), name.yellow());
        }
        Commands::Scenes { json } => {
            let scenes = session.try_get_scenes().await.context("Could not list scenes")?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&scenes)?);
            } else if scenes.is_empty() {
                println!("{}", "No scenes".yellow());
            } else {
                for scene in &scenes {
                    println!("  {}", scene.scene_name);
                }
            }
        }
        Commands::Watch => watch(state, variant, address).await?,
    }

    Ok(())
}

/// The request was accepted; report whether the software followed through
async fn confirm(state: &mut StateSubscriber, target: SessionState, label: &str) {
    if state.wait_for_state(target, CONFIRM_WAIT).await {
        println!("{}", label.green().bold());
    } else {
        println!(
            "{} request accepted, no confirmation after {}s",
            "Pending".yellow().bold(),
            CONFIRM_WAIT.as_secs()
        );
    }
}

async fn watch(state: &mut StateSubscriber, variant: SoftwareVariant, address: &str) -> Result<()> {
    println!(
        "{} {} at {} (Ctrl+C to stop)",
        "Watching".cyan().bold(),
        variant_label(variant),
        address
    );
    println!("  {}", state_label(state.current()));

    loop {
        tokio::select! {
            changed = state.changed() => match changed {
                Some(SessionState::Disconnected) | None => {
                    println!("  {}", state_label(SessionState::Disconnected));
                    bail!("Connection to {} lost", address);
                }
                Some(next) => println!("  {}", state_label(next)),
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Received shutdown signal");
                return Ok(());
            }
        }
    }
}

fn variant_label(variant: SoftwareVariant) -> colored::ColoredString {
    match variant {
        SoftwareVariant::Obs => "OBS Studio".cyan(),
        SoftwareVariant::Streamlabs => "Streamlabs Desktop".magenta(),
        SoftwareVariant::Unknown => "unknown software".yellow(),
    }
}

fn state_label(state: SessionState) -> colored::ColoredString {
    match state {
        SessionState::Disconnected => state.as_str().red(),
        SessionState::Connected => state.as_str().green(),
        SessionState::Streaming => state.as_str().green().bold(),
    }
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
