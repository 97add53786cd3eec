use arpsentry::config;
use arpsentry::engine::{Engine, Entry, EntryState};
use arpsentry::protocol::MacAddr;
use arpsentry::telemetry::init_logging;
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "arpsentry")]
#[command(about = "ARP host tracking engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track hosts on the configured interface
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "arpsentry.toml")]
        config: PathBuf,

        /// Force this host off its address once it is seen (repeatable)
        #[arg(long, value_name = "MAC")]
        hunt: Vec<MacAddr>,
    },
    /// Validate a config file
    Validate {
        /// Path to config file
        #[arg(short, long, default_value = "arpsentry.toml")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, hunt } => cmd_run(&config, hunt),
        Commands::Validate { config } => {
            init_logging(None);
            cmd_validate(&config)
        }
    };

    if let Err(e) = result {
        eprintln!("[ERROR] {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &PathBuf, hunt: Vec<MacAddr>) -> Result<(), String> {
    use tokio::runtime::Runtime;

    let cfg = config::load(config_path).map_err(|e| format!("Failed to load config: {}", e))?;
    init_logging(Some(&cfg.logging));

    let validation = config::validate(&cfg);
    validation.print_diagnostics();
    if validation.has_errors() {
        return Err("Invalid configuration".to_string());
    }

    let host_mac = cfg
        .host_mac
        .or_else(|| get_interface_mac(&cfg.interface))
        .ok_or_else(|| format!("Cannot determine MAC address of {}", cfg.interface))?;
    let poll_interval = cfg.poll_interval();

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let engine = Engine::new(cfg.engine_config(host_mac)).map_err(|e| {
            format!(
                "Failed to open {}: {}. Run with root privileges.",
                cfg.interface, e
            )
        })?;

        let (tx, rx) = mpsc::channel(64);
        engine.add_notification_channel(tx);
        tokio::spawn(print_notifications(engine.clone(), rx, hunt));

        let server = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.listen_and_serve(poll_interval).await })
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
            result = server => {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Engine terminated: {}", e),
                    Err(e) => warn!("Engine task failed: {}", e),
                }
            }
        }

        engine.print_table();
        engine
            .stop()
            .await
            .map_err(|e| format!("Failed to stop engine: {}", e))
    })
}

/// Print every notification and start hunts for the requested hosts
async fn print_notifications(engine: Engine, mut rx: mpsc::Receiver<Entry>, hunt: Vec<MacAddr>) {
    let mut pending: HashSet<MacAddr> = hunt.into_iter().collect();

    while let Some(entry) = rx.recv().await {
        println!("{}", entry);

        if entry.state == EntryState::Normal && entry.online && pending.remove(&entry.mac) {
            if let Err(e) = engine.force_ip_change(entry.mac, entry.ip) {
                warn!(mac = %entry.mac, ip = %entry.ip, "Cannot hunt host: {}", e);
            }
        }
    }
}

fn cmd_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}

fn get_interface_mac(name: &str) -> Option<MacAddr> {
    // Read MAC from /sys/class/net/{name}/address
    let path = format!("/sys/class/net/{}/address", name);
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
