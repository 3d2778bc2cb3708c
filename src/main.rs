use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mapharvest::browser::ChromeSessions;
use mapharvest::cli::Cli;
use mapharvest::config::{self, AppConfig};
use mapharvest::harvest::{prepare_output, Harvester};
use mapharvest::logger::{init_tracing, HarvestLogger};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::create_default_config() {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Edit this file to customize settings, then run mapharvest again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = cli.validate() {
        eprintln!("❌ Invalid arguments: {}", e);
        std::process::exit(1);
    }

    // Load configuration
    let mut app_config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config() {
            Ok(Some(created_path)) => {
                println!("✅ Created default configuration file at: {}", created_path.display());
                println!("   Edit this file to customize settings, then run mapharvest again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("❌ Configuration file not found at: {}", path.display());
                eprintln!("   Run with --init to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    cli.apply_overrides(&mut app_config);
    if let Err(e) = app_config.validate() {
        eprintln!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let verbosity = cli.verbosity();
    let logger = match &cli.log_file {
        Some(path) => HarvestLogger::with_log_file(verbosity, path),
        None => HarvestLogger::new(verbosity),
    };
    init_tracing(cli.log_level(), logger.tracing_writer())?;

    let categories = match cli.load_categories() {
        Ok(list) if !list.is_empty() => list,
        Ok(_) => {
            logger.error("No categories provided (both --categories and --categories-file are empty)");
            std::process::exit(1);
        }
        Err(e) => {
            logger.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    };

    // validate() guarantees both are present past this point
    let location = cli.location().to_string();
    let output = cli.output.clone().context("--output is required")?;

    let (sink, ledger) = match prepare_output(&output) {
        Ok(pair) => pair,
        Err(e) => {
            logger.error(&e.to_string());
            std::process::exit(1);
        }
    };
    if ledger.count() > 0 {
        logger.log_resume(ledger.count(), &output);
    }

    // First Ctrl-C stops after the current card; a second one exits immediately
    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\n⚠️  Force exiting.");
            std::process::exit(130); // 130 = 128 + SIGINT(2)
        }
        eprintln!("\n⚠️  Interrupt received. Finishing the current card, press Ctrl-C again to force exit...");
    })
    .unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to set Ctrl-C handler: {}. Interrupt signals may not be handled gracefully.", e);
    });

    logger.log_run_start(categories.len(), &location, &output);
    logger.start_progress(categories.len() as u64);

    // The browser API is blocking; keep it off the async workers
    let worker_logger = logger.clone();
    let worker_interrupt = Arc::clone(&interrupt);
    let headless = cli.headless;
    let proxy = cli.proxy.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let sessions = ChromeSessions::new(app_config.browser.clone(), headless, proxy);
        let mut harvester = Harvester::new(app_config, sessions, sink, ledger, &location)
            .with_logger(worker_logger)
            .with_interrupt(worker_interrupt);
        harvester.run(&categories)
    })
    .await
    .context("Harvest worker panicked")?;

    match outcome {
        Ok(summary) => {
            logger.finish_progress(&format!("Done. Total rows written this run: {}", summary.written));
            logger.print_final_summary(&summary);
            export_logs(&logger);
            if summary.interrupted {
                std::process::exit(130);
            }
        }
        Err(e) => {
            logger.finish_progress("Harvest aborted");
            logger.error(&format!("Harvest aborted: {}", e));
            export_logs(&logger);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn export_logs(logger: &HarvestLogger) {
    if logger.is_log_export_enabled() {
        if let Err(e) = logger.export_logs() {
            eprintln!("⚠️  Failed to write log file: {:#}", e);
        }
    }
}
