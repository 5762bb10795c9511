use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use stream_mux::transport::tls::hardened_client_config;
use stream_mux::{ConnectionRegistry, EventSink, Subscription, WsTransport};

mod bulk;
mod commands;
mod config;

use bulk::{BulkLine, load_bulk};
use commands::{Command, HELP, format_active, read_prompt_line};
use config::{RecorderConfig, load_config};

#[derive(Parser)]
#[command(name = "recorder")]
#[command(about = "Subscribe to streaming channels and record what they send")]
struct Args {
    /// File receiving one message payload per line
    record_file: PathBuf,

    /// File receiving operational log lines
    log_file: PathBuf,

    /// Optional TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint URI (overrides the config file)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_directive = if args.debug {
        "stream_recorder=debug,stream_mux=debug"
    } else {
        "stream_recorder=info,stream_mux=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();

    let mut config: RecorderConfig = load_config(args.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }

    let record_file = File::create(&args.record_file)
        .with_context(|| format!("cannot open file at {}", args.record_file.display()))?;
    let log_file = File::create(&args.log_file)
        .with_context(|| format!("cannot open file at {}", args.log_file.display()))?;

    let sink = Arc::new(EventSink::spawn(record_file, log_file).context("Failed to start writers")?);
    let transport = Arc::new(WsTransport::new(hardened_client_config()?));
    let registry = ConnectionRegistry::new(config.endpoint.clone(), transport, sink.clone())
        .context("Failed to start connection registry")?
        .with_shutdown_grace(config.shutdown_grace());

    info!("Recording to {}", args.record_file.display());
    println!("WebSocket Connection to {}", config.endpoint);

    let result = run_prompt(&registry);

    // Sockets first: no callback may produce into the sink once it drains.
    registry.shutdown();
    let report = sink.join();
    info!(
        "Wrote {} message(s) and {} log line(s)",
        report.messages, report.logs
    );
    println!("ended! ...");

    result
}

/// Read commands from stdin until `quit` or end of input
fn run_prompt(registry: &ConnectionRegistry) -> Result<()> {
    let mut stdin = io::stdin().lock();

    loop {
        print!(">");
        io::stdout().flush()?;

        let line = match read_prompt_line(&mut stdin) {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Cannot read from stdin: {}", e);
                println!("[Error] cannot read input: {}", e);
                return Ok(());
            }
        };
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("[Error] {}", e);
                continue;
            }
        };

        match command {
            Command::Quit => return Ok(()),
            Command::Help => println!("{}", HELP),
            Command::Subscribe(channel) => match registry.subscribe(Subscription::new(channel)) {
                Ok(id) => println!("[INFO]: connection created successfully with id[{}]", id),
                Err(e) => println!("[ERROR] {}", e),
            },
            Command::Disconnect(id) => {
                if registry.disconnect(id).is_err() {
                    println!(
                        "[Error] cannot disconnect from reader [{}] please refer to log file for more details",
                        id
                    );
                }
            }
            Command::Bulk(path) => {
                let file = match File::open(&path) {
                    Ok(file) => file,
                    Err(e) => {
                        println!("[Error] cannot open {}: {}", path.display(), e);
                        continue;
                    }
                };
                for outcome in load_bulk(BufReader::new(file), |sub| registry.subscribe(sub)) {
                    if let BulkLine::Unreadable { error, .. } = &outcome {
                        warn!("Bulk load of {} stopped: {}", path.display(), error);
                    }
                    println!("{}", outcome);
                }
            }
            Command::Active => print!("{}", format_active(&registry.connections())),
        }
    }
}
