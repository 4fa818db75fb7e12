//! slot-telemetry - Replay and configuration tool
//!
//! Drives the telemetry engine against scripted page sessions and manages
//! the selector configuration.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use slot_telemetry::config::{self, OutputFormat, TelemetryConfig};
use slot_telemetry::replay::{self, ReplayReport, Scenario};
use slot_telemetry::telemetry::{spawn_json_writer, ChannelSink, LogLinesSink, RecordingSink, TracingSink};
use slot_telemetry::SelectorTable;

/// slot-telemetry - Non-invasive slot machine UI telemetry
#[derive(Parser, Debug)]
#[command(name = "slot-telemetry")]
#[command(about = "Derives gameplay telemetry from a slot machine page without touching it")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a scripted page session and emit its telemetry
    Replay {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Configuration file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format, overriding the configuration
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Output file, overriding the configuration (stdout when unset)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the default configuration
    DefaultConfig,
    /// Validate a configuration file
    CheckConfig {
        /// Configuration file (TOML)
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Replay {
            scenario,
            config: config_path,
            format,
            output,
        } => {
            let mut config = match config_path {
                Some(path) => config::load_config(&path)?,
                None => load_or_create_config(),
            };
            if let Some(format) = format {
                config.output.format = format;
            }
            if output.is_some() {
                config.output.path = output;
            }
            run_replay(&scenario, &config)
        }
        Command::DefaultConfig => {
            print!("{}", toml::to_string_pretty(&TelemetryConfig::default())?);
            Ok(())
        }
        Command::CheckConfig { path } => {
            let config = config::load_config(&path)?;
            config
                .compile_selectors()
                .with_context(|| format!("Invalid selectors in {:?}", path))?;
            println!("{}: ok", path.display());
            Ok(())
        }
    }
}

/// Load configuration from the user config directory or fall back to defaults
fn load_or_create_config() -> TelemetryConfig {
    if let Ok(config_dir) = config::get_config_dir() {
        let config_path = config_dir.join("config.toml");
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path);
                    return config;
                }
                Err(e) => warn!("Ignoring unreadable configuration {:?}: {:#}", config_path, e),
            }
        }
    }
    info!("Using default configuration");
    TelemetryConfig::default()
}

fn run_replay(scenario_path: &Path, config: &TelemetryConfig) -> Result<()> {
    let scenario = replay::load_scenario(scenario_path)?;
    let selectors = config.compile_selectors().context("Invalid selector configuration")?;
    let session_id = Uuid::new_v4();
    let recorder = RecordingSink::new();

    info!("Replaying {:?} (session {})", scenario_path, session_id);

    let report = match config.output.format {
        OutputFormat::Log => match &config.output.path {
            Some(path) => {
                let file = File::create(path).with_context(|| format!("Failed to create output {:?}", path))?;
                let sink = LogLinesSink::new(BufWriter::new(file));
                let report = block_on_replay(scenario, selectors, (sink, recorder.clone()), config)?;
                info!("Wrote {} records to {:?}", recorder.records().len(), path);
                report
            }
            None => block_on_replay(scenario, selectors, (TracingSink, recorder.clone()), config)?,
        },
        OutputFormat::Json => {
            let writer: Box<dyn Write + Send> = match &config.output.path {
                Some(path) => Box::new(BufWriter::new(
                    File::create(path).with_context(|| format!("Failed to create output {:?}", path))?,
                )),
                None => Box::new(std::io::stdout()),
            };
            let (sink, receiver) = ChannelSink::unbounded();
            let writer_handle = spawn_json_writer(writer, receiver, session_id);

            // The sink is dropped with the engine, which closes the channel
            let report = block_on_replay(scenario, selectors, (sink, recorder.clone()), config);
            let written = writer_handle
                .join()
                .map_err(|_| anyhow!("Telemetry writer thread panicked"))?;
            info!("Wrote {} records", written);
            report?
        }
    };

    info!(
        "Session {} complete: {} steps, {} mutations, {} records (engine {})",
        session_id,
        report.steps_applied,
        report.mutations,
        recorder.records().len(),
        if report.status.started { "started" } else { "never started" }
    );
    Ok(())
}

fn block_on_replay<S>(
    scenario: Scenario,
    selectors: SelectorTable,
    sink: S,
    config: &TelemetryConfig,
) -> Result<ReplayReport>
where
    S: slot_telemetry::TelemetrySink,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_interrupt.cancel();
            }
        });
        replay::replay(scenario, selectors, sink, &config.readiness, &cancel).await
    })
}
