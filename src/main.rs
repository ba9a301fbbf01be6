// src/main.rs

//! The main entry point for the TutorLink server application.

use anyhow::Result;
use std::env;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};
use tutorlink::config::Config;
use tutorlink::server;

#[tokio::main]
async fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    // Collect command-line arguments to decide the execution mode.
    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("TutorLink version {VERSION}");
        return Ok(());
    }

    // The configuration path can be provided via --config; otherwise "config.toml".
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("config.toml");

    // A missing file means defaults; a broken one is fatal.
    let mut config = if Path::new(config_path).exists() {
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
                std::process::exit(1);
            }
        }
    } else {
        eprintln!("Configuration file \"{config_path}\" not found, using defaults.");
        Config::default()
    };

    // Override port if provided as a command-line argument
    if let Some(port_index) = args.iter().position(|arg| arg == "--port") {
        if let Some(port_str) = args.get(port_index + 1) {
            match port_str.parse::<u16>() {
                Ok(port) if port != 0 => config.port = port,
                _ => {
                    eprintln!("Invalid port number: {port_str}");
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("--port flag requires a value");
            std::process::exit(1);
        }
    }

    // Get the log level from the env var or the config.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());

    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true), // Enable ANSI color codes for log levels.
        )
        .init();

    info!("Starting TutorLink {VERSION}...");
    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
