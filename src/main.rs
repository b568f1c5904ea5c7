use clap::Parser;
use colored::*;
use dbxbridge::{ChannelState, DaemonClient, FileInfo, Response};
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Notify, oneshot};

mod cli;
mod config;

use cli::Cli;
use cli::commands::{Commands, collect_args, watch_events};
use config::Config;

fn setup_logging(level: Option<&str>) -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dbxbridge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("dbxbridge.log");
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the config file
    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(log_file)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    if cli.is_verbose() {
        println!(
            "{} {}",
            "Command socket:".yellow(),
            config.client.command.socket_path.display()
        );
        println!(
            "{} {}",
            "Event socket:".yellow(),
            config.client.events.socket_path.display()
        );
    }

    match &cli.command {
        Commands::Status => handle_status_command(config).await,
        Commands::Send { command, args, json } => {
            handle_send_command(command, args, *json, config).await
        }
        Commands::FileInfo { path, dir } => handle_file_info_command(path, *dir, config).await,
        Commands::Watch { events } => handle_watch_command(events, config).await,
    }
}

/// Start a client and wait up to `connect_wait` for the unified connect.
async fn connect(config: &Config) -> Result<(DaemonClient, bool)> {
    let mut client = DaemonClient::new(config.client.clone());
    let connected = Arc::new(Notify::new());
    let notify = Arc::clone(&connected);
    client.on_connect(move || notify.notify_one());
    client.on_connection_attempt(|attempt| {
        log::debug!("command socket connect attempt {} failed", attempt);
    });

    client.start().context("Failed to start daemon client")?;
    let up = tokio::time::timeout(config.cli.connect_wait(), connected.notified())
        .await
        .is_ok();
    Ok((client, up))
}

fn colored_state(state: ChannelState) -> ColoredString {
    match state {
        ChannelState::Connected => state.to_string().green(),
        ChannelState::Connecting => state.to_string().yellow(),
        ChannelState::Disconnected => state.to_string().red(),
    }
}

async fn handle_status_command(config: &Config) -> Result<()> {
    info!("Checking daemon connection");
    let (mut client, up) = connect(config).await?;

    println!(
        "{:<10} {}",
        "command:",
        colored_state(client.command_channel().state())
    );
    println!(
        "{:<10} {}",
        "events:",
        colored_state(client.event_channel().state())
    );
    let connected = up && client.is_connected();
    client.shutdown().await;

    if connected {
        println!("{}", "Connected to daemon".green());
        Ok(())
    } else {
        Err(eyre!(
            "daemon not reachable within {:?}",
            config.cli.connect_wait()
        ))
    }
}

async fn handle_send_command(
    command: &str,
    pairs: &[(String, String)],
    json: bool,
    config: &Config,
) -> Result<()> {
    info!("Sending command {} with {} args", command, pairs.len());
    let (mut client, _) = connect(config).await?;

    let (tx, rx) = oneshot::channel();
    client.send_with_args(command, collect_args(pairs), move |reply| {
        let _ = tx.send(reply);
    });
    let reply = await_reply(rx, config).await;
    client.shutdown().await;

    match reply? {
        Some(response) => print_response(&response, json),
        None => Err(eyre!("daemon did not accept '{}'", command)),
    }
}

async fn handle_file_info_command(path: &Path, is_directory: bool, config: &Config) -> Result<()> {
    let path = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    info!("Requesting file info for {}", path.display());
    let (mut client, _) = connect(config).await?;

    let (tx, rx) = oneshot::channel();
    client.request_file_info(path.clone(), is_directory, move |info| {
        let _ = tx.send(info);
    });
    let info = await_reply(rx, config).await;
    client.shutdown().await;

    print_file_info(&path, &info?);
    Ok(())
}

async fn handle_watch_command(requested: &[String], config: &Config) -> Result<()> {
    let mut client = DaemonClient::new(config.client.clone());

    for event in watch_events(requested) {
        let name = event.clone();
        client
            .register_handler(event, move |args| {
                let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
                println!("{} {}", stamp.to_string().dimmed(), name.cyan().bold());
                for (key, values) in args {
                    println!("    {} = {}", key, values.join(", "));
                }
            })
            .context("Failed to register event handler")?;
    }
    client.on_connect(|| println!("{}", "connected".green()));
    client.on_disconnect(|| println!("{}", "disconnected".red()));

    client.start().context("Failed to start daemon client")?;
    println!("{}", "Watching for events, Ctrl-C to stop".yellow());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    client.shutdown().await;
    Ok(())
}

/// Wait for a completion. File info may take three round trips.
async fn await_reply<T>(rx: oneshot::Receiver<T>, config: &Config) -> Result<T> {
    let limit = config.cli.connect_wait() + config.client.command.io_timeout() * 3;
    match tokio::time::timeout(limit, rx).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(_)) => Err(eyre!("command was dropped without a result")),
        Err(_) => Err(eyre!("no reply within {:?}", limit)),
    }
}

fn print_response(response: &Response, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(response).context("Failed to encode reply")?;
        println!("{}", out);
        return Ok(());
    }

    if response.is_empty() {
        println!("{}", "ok".green());
    }
    for (key, values) in response {
        println!("{} {}", format!("{}:", key).cyan(), values.join("\t"));
    }
    Ok(())
}

fn print_file_info(path: &Path, info: &FileInfo) {
    println!("{}", path.display().to_string().bold());
    if let Some(status) = info.status() {
        println!("  {:<8} {:?}", "status:", status);
    }
    if let Some(tag) = info.tag() {
        println!("  {:<8} {:?}", "tag:", tag);
    }
    match info.emblem_names() {
        Some(names) if names.is_empty() => println!("  {:<8} {}", "emblems:", "none".dimmed()),
        Some(names) => println!("  {:<8} {}", "emblems:", names.join(", ").green()),
        None => println!("  {}", "daemon gave no status for this path".red()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.socket_dir {
        config = config.with_socket_dir(dir);
    }

    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    info!("Starting with config from: {:?}", cli.config);

    // one thread: event handlers, hooks and completions all run on it
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime
        .block_on(run_application(&cli, &config))
        .context("Application failed")?;

    Ok(())
}
