//! Input Relay CLI
//!
//! Store-and-forward delivery of captured input events.

use clap::{Parser, Subcommand};
use input_relay::{
    delivery::PendingStore, AuditLog, Config, DeliveryOutcome, Event, HttpTransport, Relay,
    VERSION,
};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "input-relay")]
#[command(version = VERSION)]
#[command(about = "Store-and-forward relay for captured input events", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay until Ctrl+C
    Start {
        /// Read events as JSON lines from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// Show configuration and pending event count
    Status,

    /// Run one send cycle now
    Flush,

    /// Show the most recently recorded events
    Recent {
        /// Number of events to show
        #[arg(long, short, default_value = "20")]
        limit: usize,
    },

    /// Show configuration
    Config,

    /// Run the local ingestion receiver
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8000")]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    });
    init_tracing(cli.debug || config.debug_mode);

    match cli.command {
        Commands::Start { stdin } => cmd_start(&config, stdin),
        Commands::Status => {
            cmd_status(&config);
            Ok(())
        }
        Commands::Flush => cmd_flush(&config),
        Commands::Recent { limit } => cmd_recent(&config, limit),
        Commands::Config => {
            cmd_config(&config);
            Ok(())
        }
        #[cfg(feature = "server")]
        Commands::Serve { port } => cmd_serve(port),
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_relay(config: &Config) -> anyhow::Result<Relay> {
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    let transport = HttpTransport::new(&config.webhook_url, config.request_timeout())?;
    Ok(Relay::new(config, Arc::new(transport)))
}

fn cmd_start(config: &Config, read_stdin: bool) -> anyhow::Result<()> {
    println!("Input Relay v{VERSION}");
    println!();
    println!("  Webhook: {}", config.webhook_url);
    println!("  Send interval: {}s", config.send_interval().as_secs());
    println!("  Batch size: {}", config.batch_size());
    println!("  Pending store: {:?}", config.pending_cache_path());

    let relay = Arc::new(build_relay(config)?);
    relay.start()?;

    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone())?;

    // Cleared before the relay stops so the reader records nothing more.
    let producing = Arc::new(AtomicBool::new(true));
    if read_stdin {
        let relay = Arc::clone(&relay);
        let producing = Arc::clone(&producing);
        // Detached: a blocked stdin read must not hold up shutdown.
        thread::spawn(move || {
            let stdin = std::io::stdin();
            for (idx, line) in stdin.lock().lines().enumerate() {
                let Ok(line) = line else { break };
                if !producing.load(Ordering::SeqCst) {
                    eprintln!("Relay stopping, line {} not recorded", idx + 1);
                    break;
                }
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(&line) {
                    Ok(event) => {
                        if !relay.record(event) && relay.is_stopped() {
                            eprintln!("Relay stopped, line {} not recorded", idx + 1);
                            break;
                        }
                    }
                    Err(e) => eprintln!("Skipping malformed event on line {}: {e}", idx + 1),
                }
            }
        });
    }

    let mut last_report = relay.stats();
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
        let stats = relay.stats();
        if stats != last_report {
            println!("[{}] {stats}", chrono::Local::now().format("%H:%M:%S"));
            last_report = stats;
        }
    }

    println!();
    println!("Stopping relay...");
    producing.store(false, Ordering::SeqCst);
    relay.stop();
    println!("Final stats: {}", relay.stats());
    Ok(())
}

fn cmd_status(config: &Config) {
    println!("Input Relay Status");
    println!("==================");
    println!();
    println!("Configuration:");
    println!("  Webhook: {}", config.webhook_url);
    println!("  Send interval: {}s", config.send_interval().as_secs());
    println!("  Batch size: {}", config.batch_size());
    println!("  Log directory: {:?}", config.log_dir);
    println!();

    let store = PendingStore::new(config.pending_cache_path());
    let pending = store.load();
    if pending.is_empty() {
        println!("No undelivered events.");
    } else {
        println!("Undelivered events: {}", pending.len());
    }
}

fn cmd_flush(config: &Config) -> anyhow::Result<()> {
    let relay = build_relay(config)?;
    match relay.flush_now()? {
        None => println!("Nothing to send."),
        Some(DeliveryOutcome::Delivered(n)) => println!("Delivered {n} events."),
        Some(DeliveryOutcome::Failed {
            delivered,
            remaining,
        }) => println!(
            "Delivered {delivered} events; {} kept for retry.",
            remaining.len()
        ),
    }
    relay.stop();
    Ok(())
}

fn cmd_recent(config: &Config, limit: usize) -> anyhow::Result<()> {
    let log = AuditLog::new(&config.log_dir);
    let events = log.read_recent(limit)?;
    if events.is_empty() {
        println!("No events recorded in {:?}", log.path());
        return Ok(());
    }
    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}

fn cmd_config(config: &Config) {
    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(config).unwrap_or_else(|_| "Error".to_string())
    );
}

#[cfg(feature = "server")]
fn cmd_serve(port: u16) -> anyhow::Result<()> {
    use input_relay::server::{run, ServerConfig};

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let (addr, _state, shutdown_tx) = run(ServerConfig::new(port)).await?;
        println!("Receiver listening on http://{addr} (Ctrl+C to stop)");
        tokio::signal::ctrl_c().await?;
        let _ = shutdown_tx.send(());
        Ok::<(), anyhow::Error>(())
    })
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })?;
    Ok(())
}
