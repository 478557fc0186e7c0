//! XML Backup Exporter - CLI Entry Point
//!
//! This binary is a thin wrapper around the library, handling argument parsing,
//! logging setup, and command dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::fs::OpenOptions;
use std::io::Write;
use xml_backup_exporter::cli::{self, Args, DualWriter};
use xml_backup_exporter::core::config::Config;

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        Config::load(config_path)?
    } else {
        match Config::load_default() {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                Config::default()
            }
        }
    };

    // Apply CLI overrides to config
    if let Some(ref output) = args.output {
        config.output.directory = Some(output.clone());
    }
    if args.no_images {
        config.media.include_images = false;
    }
    if args.no_videos {
        config.media.include_videos = false;
    }
    if args.no_audio {
        config.media.include_audio = false;
    }
    if args.no_pdfs {
        config.media.include_pdfs = false;
    }
    if args.no_fetch {
        config.contacts.fetch_remote = false;
    }
    if let Some(secs) = args.fetch_timeout {
        config.contacts.fetch_timeout_secs = secs;
    }
    if args.sort_by_timestamp {
        config.calls.sort_by_timestamp = true;
    }
    if args.contacts_index {
        config.contacts.write_index = true;
    }
    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }

    // Initialize logger
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    if config.logging.log_to_file {
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.log_file)
            .with_context(|| {
                format!(
                    "Failed to open log file {}",
                    config.logging.log_file.display()
                )
            })?;

        Builder::new()
            .filter_level(log_level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} {} {}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .target(env_logger::Target::Pipe(Box::new(DualWriter {
                console: std::io::stderr(),
                file: log_file,
            })))
            .init();

        info!("Logging to file: {}", config.logging.log_file.display());
    } else {
        Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
            .init();
    }

    info!(
        "{} v{}",
        xml_backup_exporter::NAME,
        xml_backup_exporter::VERSION
    );

    cli::run_command(&args, &config)?;

    Ok(())
}
