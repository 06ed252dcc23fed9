//! Fleet Node - OCPP provisioning server
//!
//! Loads a fleet file (devices + firmware catalog) into memory and
//! provisions every charge point that connects.
//!
//! # Usage
//!
//! ```bash
//! # Serve the fleet on the default port
//! fleet-node --fleet fleet.json
//!
//! # Redirect provisioned devices to the production CSMS
//! FINAL_WS_SERVER_ADDRESS=ws://csms.example:8887 fleet-node --fleet fleet.json
//!
//! # Persist device state on shutdown
//! fleet-node --fleet fleet.json --save-on-exit --log-level debug
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fleet_ocpp::{BroadcastNotifier, ChargePointStore, MemoryStore, Notifier, Server, ServerConfig};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// OCPP 1.6 / 2.0.1 charge point provisioning server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Fleet file (charge points and firmware catalog, JSON)
    #[arg(short, long, default_value = "fleet.json")]
    fleet: PathBuf,

    /// WebSocket listen address
    #[arg(long, default_value = "0.0.0.0:8887")]
    listen: SocketAddr,

    /// Address pushed to devices at the end of their configuration
    #[arg(long, env = "FINAL_WS_SERVER_ADDRESS")]
    final_server_address: Option<String>,

    /// Pause after a failed firmware download/installation, in seconds
    #[arg(long, default_value = "5")]
    firmware_failure_delay: u64,

    /// Largest accepted WebSocket message, in bytes
    #[arg(long, default_value = "65536")]
    max_message_size: usize,

    /// Write device state back to the fleet file on Ctrl-C
    #[arg(long)]
    save_on_exit: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let redirect = args.final_server_address.as_deref().unwrap_or("(none)");

    // Print banner
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Fleet Node - OCPP Provisioning Server           ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Listen:   {:<50} ║", args.listen);
    println!("║  Fleet:    {:<50} ║", truncate(&args.fleet.display().to_string(), 50));
    println!("║  Redirect: {:<50} ║", truncate(redirect, 50));
    println!("║  Protocol: {:<50} ║", "ocpp1.6, ocpp2.0.1");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let store = Arc::new(MemoryStore::load(&args.fleet)?);

    let mut config = ServerConfig::default()
        .with_listen_addr(args.listen)
        .with_firmware_failure_delay(Duration::from_secs(args.firmware_failure_delay))
        .with_max_message_size(args.max_message_size);
    if let Some(address) = &args.final_server_address {
        config = config.with_final_server_address(address);
    }

    let notifier = Arc::new(BroadcastNotifier::default());
    spawn_notification_log(&notifier);

    let server = Server::new(
        config,
        store.clone() as Arc<dyn ChargePointStore>,
        notifier as Arc<dyn Notifier>,
    );

    info!("Starting provisioning server...");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down ({} connections open)", server.registry().len());
            if args.save_on_exit {
                store.dump(&args.fleet)?;
                info!("Saved fleet to {}", args.fleet.display());
            }
        }
    }

    Ok(())
}

/// Log the notification feed
fn spawn_notification_log(notifier: &BroadcastNotifier) {
    let mut rx = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(notification) => match serde_json::to_string(&notification) {
                    Ok(json) => info!("Notification: {}", json),
                    Err(e) => error!("Failed to encode notification: {}", e),
                },
                Err(RecvError::Lagged(missed)) => warn!("Notification log lagged, {} missed", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Truncate string with ellipsis
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
