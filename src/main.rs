//! Autopress - Automated In-Browser Translation Driver
//!
//! This is the main entry point for the Autopress application, which drives
//! a hosted web translation editor through the browser's debugging protocol
//! and a local translation relay.

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use autopress::cli::{Args, Commands};
use autopress::config::Config;
use autopress::driver::{CycleOutcome, ReadinessReport, StepDriver};
use autopress::relay::RelayServer;
use autopress::translate::check_service_availability;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            // Try to load config.toml from current directory first
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    // Execute command
    match args.command {
        Commands::Drive { count, strict } => {
            info!("Driving {} translation cycle(s)", count);

            check_service_availability(&config.service.endpoint).await?;
            let mut driver = connect_ready(&config).await?;

            let summary = driver.drive(count, strict).await;
            println!(
                "Drive finished: {} saved, {} unconfirmed, {} skipped",
                summary.saved, summary.unconfirmed, summary.skipped
            );
        }
        Commands::Step => {
            info!("Running a single translate-and-save cycle");

            check_service_availability(&config.service.endpoint).await?;
            let mut driver = connect_ready(&config).await?;

            match driver.translate_and_save().await {
                CycleOutcome::Saved => println!("Saved and advanced."),
                CycleOutcome::Unconfirmed { advanced: true } => {
                    println!("Save not confirmed; advanced anyway.")
                }
                CycleOutcome::Unconfirmed { advanced: false } => {
                    println!("Save not confirmed; staying on the current item.")
                }
                CycleOutcome::Skipped { reason } => println!("Skipped: {}", reason),
                CycleOutcome::NotReady => println!("Page not ready; nothing done."),
            }
        }
        Commands::Skip => {
            let mut driver = connect_ready(&config).await?;
            driver.skip().await?;
            println!("Advanced to the next string.");
        }
        Commands::Previous => {
            let mut driver = connect_ready(&config).await?;
            driver.previous().await?;
            println!("Returned to the previous string.");
        }
        Commands::Reset => {
            let mut driver = connect_ready(&config).await?;
            driver.reset().await?;
            println!("Editor state reset.");
        }
        Commands::Check => {
            info!("Probing page and translation service readiness");

            let driver = StepDriver::connect(&config).await?;
            let report = driver.probe().await?;
            print_readiness(&report);

            let service_status = match check_service_availability(&config.service.endpoint).await {
                Ok(()) => "reachable",
                Err(e) => {
                    warn!("{}", e);
                    "unreachable"
                }
            };
            println!("{:<22} {}", "translation service", service_status);

            if !report.ready() {
                println!("\nThe page is missing required elements; is the editor open?");
            }
        }
        Commands::Relay { port } => {
            if let Some(port) = port {
                config.relay.listen_port = port;
            }

            let server = RelayServer::new(config.relay)?;
            info!("Starting translation relay on {}", server.addr());
            server.run().await?;
        }
    }

    Ok(())
}

/// Connect to the browser and wait for the editor page to become ready.
async fn connect_ready(config: &Config) -> Result<StepDriver> {
    let mut driver = StepDriver::connect(config).await?;
    let report = driver.wait_until_ready().await?;
    if !report.ready() {
        print_readiness(&report);
        anyhow::bail!("Page did not become ready; is the translation editor open?");
    }
    Ok(driver)
}

fn print_readiness(report: &ReadinessReport) {
    let status = |present: bool| if present { "present" } else { "missing" };

    println!("\nPage readiness:");
    println!("{:<22} {}", "source field", status(report.source_field));
    println!(
        "{:<22} {}",
        "destination field",
        status(report.destination_field)
    );
    println!("{:<22} {}", "next control", status(report.next_control));
    println!(
        "{:<22} {}",
        "previous control",
        status(report.previous_control)
    );
    println!("{:<22} {}", "save control", status(report.save_control));
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let autopress_dir = std::env::current_dir()?.join(".autopress");
    let log_dir = autopress_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "autopress.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    // Determine log level
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Create console layer
    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    // Create file layer
    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    // Setup layered subscriber
    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer);

    // Initialize the subscriber
    subscriber
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
