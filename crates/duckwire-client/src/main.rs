//! duckwire command-line front end.
//!
//! Connects to the device's WebSocket control channel and drives the
//! runtime from the library crate: program execution, live text
//! injection, SD-card and internal-file management, and status queries.
//!
//! ```text
//! main()
//!  └─ ws::connect()          -- dial the device, start driver tasks
//!  └─ DeviceStorage / ExecutionEngine / StatusPoller
//!  └─ one subcommand, then shutdown
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use duckwire_core::protocol::command::Command;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use duckwire_client::application::notify::{ChangeTracker, LogNotifier};
use duckwire_client::application::poller::StatusPoller;
use duckwire_client::application::{
    parse_program, DeviceStorage, ExecutionEngine, InputSession, Operation,
};
use duckwire_client::domain::config::ClientConfig;
use duckwire_client::domain::status::SessionConnectivity;
use duckwire_client::infrastructure::link::DeviceLink;
use duckwire_client::infrastructure::ws;

#[derive(Parser)]
#[command(name = "duckwire", version, about = "Remote control for duckwire HID devices")]
struct Cli {
    /// WebSocket endpoint of the device control channel.
    #[arg(long, env = "DUCKWIRE_URL", default_value = "ws://192.168.4.1/ws")]
    device_url: String,

    /// Acknowledgement timeout in seconds.
    #[arg(long, default_value_t = 10)]
    ack_timeout: u64,

    /// Emit machine-readable JSON where a listing is produced.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Parse a local script file and execute it on the target.
    Run {
        /// Path to the script file.
        script: PathBuf,
    },
    /// Type text on the target.
    Type {
        text: String,
        /// Press ENTER after the text.
        #[arg(long)]
        enter: bool,
    },
    /// Press one key combo, e.g. `duckwire press CTRL ALT DELETE`.
    Press {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Switch the device keyboard layout, e.g. `duckwire layout de`.
    Layout { code: String },
    /// Query device status.
    Status,
    /// Query firmware version.
    Version,
    /// Query flash memory usage.
    Mem,
    /// SD-card file operations.
    #[command(subcommand)]
    Sd(SdCommand),
    /// Internal-filesystem operations.
    #[command(subcommand)]
    Fs(FsCommand),
}

#[derive(Subcommand)]
enum SdCommand {
    /// List files.
    Ls,
    /// Print a file.
    Cat { file: String },
    /// Upload a local file.
    Write { file: String, source: PathBuf },
    /// Run a script from the card and poll until it finishes.
    Run { file: String },
    /// Stop the running script.
    Stop,
    /// Delete a file.
    Rm { file: String },
}

#[derive(Subcommand)]
enum FsCommand {
    /// List files.
    Ls,
    /// Upload a local file.
    Save { file: String, source: PathBuf },
    /// Run an internal script and poll until it finishes.
    Run { file: String },
    /// Stop the running script.
    Stop,
    /// Delete a file.
    Rm { file: String },
    /// Erase the internal filesystem.
    Format,
    /// Mark a script to run on boot.
    Autorun { file: String },
}

#[derive(Serialize)]
struct ListingRow<'a> {
    name: &'a str,
    size: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        device_url: cli.device_url.clone(),
        ack_timeout: Duration::from_secs(cli.ack_timeout),
        ..ClientConfig::default()
    };

    let connectivity = Arc::new(SessionConnectivity::new());
    let connection = ws::connect(
        &config.device_url,
        config.dispatch_tick,
        Arc::clone(&connectivity),
    )
    .await?;
    let link = connection.link();
    let sd_events = link
        .take_sd_events()
        .context("sd event channel already taken")?;

    let device: Arc<dyn DeviceLink> = link.clone();
    let storage = DeviceStorage::new(Arc::clone(&device), sd_events, config.clone());
    let notifier = Arc::new(ChangeTracker::new(Arc::new(LogNotifier)));

    let result = dispatch(&cli, &config, &device, &storage, &connectivity, &notifier).await;

    // Let queued fire-and-forget traffic drain before tearing down.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !link.is_drained() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(config.dispatch_tick).await;
    }
    connection.shutdown();
    result
}

async fn dispatch(
    cli: &Cli,
    config: &ClientConfig,
    device: &Arc<dyn DeviceLink>,
    storage: &DeviceStorage,
    connectivity: &Arc<SessionConnectivity>,
    notifier: &Arc<ChangeTracker>,
) -> anyhow::Result<()> {
    match &cli.command {
        CliCommand::Run { script } => {
            let text = std::fs::read_to_string(script)
                .with_context(|| format!("failed to read {}", script.display()))?;
            let program = parse_program(&text)?;
            info!(operations = program.len(), "program parsed");
            let engine = ExecutionEngine::new(Arc::clone(device), config.clone());
            engine.run(program).await?;
            println!("done: {} operations", engine.completed());
        }

        CliCommand::Type { text, enter } => {
            let program = if *enter {
                vec![Operation::TypeLine(text.clone())]
            } else {
                vec![Operation::Type(text.clone())]
            };
            ExecutionEngine::new(Arc::clone(device), config.clone())
                .run(program)
                .await?;
        }

        CliCommand::Press { keys } => {
            let line = keys.join(" ");
            let program = parse_program(&line)?;
            ExecutionEngine::new(Arc::clone(device), config.clone())
                .run(program)
                .await?;
        }

        CliCommand::Layout { code } => {
            let input = InputSession::new(Arc::clone(device), Arc::clone(notifier), config);
            input.change_layout(code)?;
        }

        CliCommand::Status => println!("{}", device.request(Command::Status).await?),
        CliCommand::Version => println!("{}", device.request(Command::Version).await?),
        CliCommand::Mem => println!("{}", device.request(Command::Mem).await?),

        CliCommand::Sd(sd) => match sd {
            SdCommand::Ls => {
                let entries = storage.sd_list().await?;
                if cli.json {
                    let rows: Vec<ListingRow> = entries
                        .iter()
                        .map(|e| ListingRow {
                            name: &e.name,
                            size: e.size,
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    for entry in entries {
                        println!("{:>10}  {}", entry.size, entry.name);
                    }
                }
            }
            SdCommand::Cat { file } => println!("{}", storage.sd_read(file).await?),
            SdCommand::Write { file, source } => {
                let content = std::fs::read(source)
                    .with_context(|| format!("failed to read {}", source.display()))?;
                storage.sd_write(file, &content).await?;
                println!("wrote {} bytes to {file}", content.len());
            }
            SdCommand::Run { file } => {
                storage.sd_run(file)?;
                poll_until_idle(device, connectivity, notifier, config).await;
            }
            SdCommand::Stop => storage.sd_stop_run()?,
            SdCommand::Rm { file } => storage.sd_remove(file)?,
        },

        CliCommand::Fs(fs) => match fs {
            FsCommand::Ls => println!("{}", storage.spiffs_list().await?),
            FsCommand::Save { file, source } => {
                let content = std::fs::read(source)
                    .with_context(|| format!("failed to read {}", source.display()))?;
                storage.spiffs_save(file, &content).await?;
                poll_until_idle(device, connectivity, notifier, config).await;
                println!("saved {} bytes to {file}", content.len());
            }
            FsCommand::Run { file } => {
                storage.spiffs_run(file)?;
                poll_until_idle(device, connectivity, notifier, config).await;
            }
            FsCommand::Stop => storage.spiffs_stop(None)?,
            FsCommand::Rm { file } => storage.spiffs_remove(file)?,
            FsCommand::Format => storage.spiffs_format()?,
            FsCommand::Autorun { file } => storage.set_autorun(file)?,
        },
    }
    Ok(())
}

/// Polls device status until no long-running condition holds.  A couple of
/// forced polls cover the lag between issuing a command and the device
/// reporting itself busy.
async fn poll_until_idle(
    device: &Arc<dyn DeviceLink>,
    connectivity: &Arc<SessionConnectivity>,
    notifier: &Arc<ChangeTracker>,
    config: &ClientConfig,
) {
    let poller = StatusPoller::new(
        Arc::clone(device),
        Arc::clone(connectivity),
        Arc::clone(notifier),
        config.poll_interval,
    );
    poller.handle().force(2);
    poller.run().await;
    info!(status = poller.handle().current(), "device idle");
}
