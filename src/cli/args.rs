//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use crate::core::dispatch::BackupType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Export media, messages, call logs and contact media from SMS Backup & Restore files
#[derive(Parser, Debug)]
#[command(name = "xml-backup-exporter")]
#[command(version)]
#[command(about = "Export MMS media, SMS/MMS text, call logs and vCard media from phone backups", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// What to extract
    #[arg(short = 't', long = "type", value_enum, value_name = "TYPE")]
    pub backup_type: Option<BackupType>,

    /// Backup file, or directory holding backup files
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output directory (created if missing; overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Skip image attachments
    #[arg(long)]
    pub no_images: bool,

    /// Skip video attachments
    #[arg(long)]
    pub no_videos: bool,

    /// Skip audio attachments
    #[arg(long)]
    pub no_audio: bool,

    /// Skip PDF attachments
    #[arg(long)]
    pub no_pdfs: bool,

    /// Never download contact media referenced by URL
    #[arg(long)]
    pub no_fetch: bool,

    /// Timeout for downloading contact media, in seconds (overrides config)
    #[arg(long, value_name = "SECS")]
    pub fetch_timeout: Option<u64>,

    /// Write call log rows in timestamp order instead of file order
    #[arg(long)]
    pub sort_by_timestamp: bool,

    /// Also write contacts.csv when extracting vCards
    #[arg(long)]
    pub contacts_index: bool,

    /// Seed for generated file names (reproducible output)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show current configuration
    ShowConfig,

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the path of the configuration file in use
    ConfigPath,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_extract_arguments() {
        let args = Args::try_parse_from([
            "xml-backup-exporter",
            "-t",
            "sms-mms-media",
            "-i",
            "backups",
            "-o",
            "out",
            "--no-videos",
            "--seed",
            "42",
        ])
        .unwrap();
        assert_eq!(args.backup_type, Some(BackupType::MediaMms));
        assert_eq!(args.input, Some(PathBuf::from("backups")));
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert!(args.no_videos);
        assert!(!args.no_images);
        assert_eq!(args.seed, Some(42));
        assert!(args.command.is_none());
    }

    #[test]
    fn test_subcommands() {
        let args =
            Args::try_parse_from(["xml-backup-exporter", "generate-config", "-o", "c.toml"])
                .unwrap();
        assert!(matches!(
            args.command,
            Some(Commands::GenerateConfig { output: Some(_) })
        ));

        let args = Args::try_parse_from(["xml-backup-exporter", "config-path"]).unwrap();
        assert!(matches!(args.command, Some(Commands::ConfigPath)));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(Args::try_parse_from(["xml-backup-exporter", "-t", "photos"]).is_err());
    }
}
