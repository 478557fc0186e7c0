//! Command handlers
//!
//! Glue between the parsed arguments and the library: input discovery,
//! output directory creation, running the extraction and reporting.

use crate::cli::progress::{
    format_bytes, format_duration, print_header, print_info, print_success, print_warning,
    ExtractionSpinner,
};
use crate::cli::{Args, Commands};
use crate::core::config::{get_config_dir, get_config_path, Config};
use crate::core::dispatch::{run_extraction, BackupType, RunOptions};
use crate::core::input::{discover_inputs, normalize_path};
use crate::core::summary::{ExtractionSummary, Outcome};
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Run the command selected by `args`
pub fn run_command(args: &Args, config: &Config) -> Result<()> {
    match &args.command {
        Some(Commands::ShowConfig) => {
            show_config(config);
            Ok(())
        }
        Some(Commands::GenerateConfig { output }) => generate_config_file(output.clone()),
        Some(Commands::ConfigPath) => {
            show_config_path();
            Ok(())
        }
        None => extract(args, config),
    }
}

/// Run one extraction from the top-level arguments
pub fn extract(args: &Args, config: &Config) -> Result<()> {
    let backup_type = args
        .backup_type
        .ok_or_else(|| anyhow!("missing --type (one of sms-mms-media, sms-mms-text, calls, vcf)"))?;
    let input = args
        .input
        .as_deref()
        .map(normalize_path)
        .ok_or_else(|| anyhow!("missing --input (backup file or directory)"))?;
    let output_dir = args
        .output
        .clone()
        .or_else(|| config.output.directory.clone())
        .map(|p| normalize_path(&p))
        .ok_or_else(|| anyhow!("missing --output (or [output] directory in the config)"))?;

    if backup_type == BackupType::MediaMms && config.media.is_empty() {
        bail!("every media category is disabled; nothing to extract");
    }

    let inputs = discover_inputs(&input, backup_type.file_kind())?;

    if !output_dir.exists() {
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;
        debug!("Created output directory: {}", output_dir.display());
    }

    if !args.json {
        print_header(&format!("{} extraction", backup_type));
        print_info(&format!("Input:  {} ({} file(s))", input.display(), inputs.len()));
        print_info(&format!("Output: {}", output_dir.display()));
        println!();
    }

    let spinner = (!args.json).then(ExtractionSpinner::new);
    let options = RunOptions {
        seed: args.seed,
        progress: spinner
            .as_ref()
            .map(ExtractionSpinner::progress)
            .unwrap_or_default(),
    };

    let result = run_extraction(backup_type, &inputs, &output_dir, config, options);
    if let Some(spinner) = &spinner {
        spinner.finish();
    }
    let summary = result?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(backup_type, &summary);
    }

    if summary.all_inputs_failed() {
        bail!("none of the {} input file(s) could be read", inputs.len());
    }
    Ok(())
}

/// Print the run summary
pub fn print_summary(backup_type: BackupType, summary: &ExtractionSummary) {
    println!();
    match summary.outcome {
        Outcome::Completed => print_success(&format!("{} extraction complete", backup_type)),
        Outcome::EmptyResult => print_warning(&empty_result_message(backup_type)),
    }

    print_info(&format!("Files processed:   {}", summary.files_processed));
    print_info(&format!("Records processed: {}", summary.records_processed));
    print_info(&format!("Records written:   {}", summary.records_written));
    if summary.records_skipped() > 0 {
        print_info(&format!("Records skipped:   {}", summary.records_skipped()));
    }
    if summary.duplicates > 0 {
        print_info(&format!("Duplicates:        {}", summary.duplicates));
    }
    if summary.filtered_out > 0 {
        print_info(&format!("Filtered out:      {}", summary.filtered_out));
    }
    if summary.empty_payloads > 0 {
        print_info(&format!("Empty payloads:    {}", summary.empty_payloads));
    }
    if summary.bytes_written > 0 {
        let by_ext = summary
            .files_by_extension
            .iter()
            .map(|(ext, count)| format!("{} {}", count, ext))
            .collect::<Vec<_>>()
            .join(", ");
        print_info(&format!(
            "Media written:     {} ({})",
            format_bytes(summary.bytes_written),
            by_ext
        ));
    }
    if let Some(csv) = &summary.output_csv {
        print_info(&format!("CSV:               {}", csv.display()));
    }

    let errors = [
        ("parse", summary.parse_errors),
        ("decode", summary.decode_errors),
        ("fetch", summary.fetch_errors),
    ];
    for (kind, count) in errors {
        if count > 0 {
            print_warning(&format!("{} {} error(s); see the log for details", count, kind));
        }
    }
    for failure in &summary.failed_inputs {
        print_warning(&format!(
            "Could not read {}: {}",
            failure.path.display(),
            failure.message
        ));
    }

    print_info(&format!(
        "Time:              {}",
        format_duration(Duration::from_millis(summary.duration_ms))
    ));
}

fn empty_result_message(backup_type: BackupType) -> String {
    match backup_type {
        BackupType::MediaMms => "No media files found to extract".to_string(),
        BackupType::TextSms => "No messages found; wrote header-only CSV".to_string(),
        BackupType::Calls => "No calls found; wrote header-only CSV".to_string(),
        BackupType::Vcf => "No contacts found".to_string(),
    }
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => normalize_path(&path),
        None => {
            let dir = get_config_dir().context("No standard config directory on this system")?;
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            get_config_path().context("No standard config path on this system")?
        }
    };

    fs::write(&output_path, Config::generate_default_config())
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    info!("Configuration file: {}", output_path.display());
    info!("Edit this file to customize the extraction settings.");
    Ok(())
}

/// Print where the active configuration file is (or would be)
pub fn show_config_path() {
    let path = Config::get_active_config_path();
    println!("{}", path.display());
    if path.exists() {
        info!("Config file exists at: {}", path.display());
    } else {
        info!("Config file would be created at: {}", path.display());
    }
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[output]");
    info!(
        "  directory = {:?}",
        config
            .output
            .directory
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    info!(
        "  max_filename_length = {}",
        config.output.max_filename_length
    );
    info!("");
    info!("[media]");
    info!("  include_images = {}", config.media.include_images);
    info!("  include_videos = {}", config.media.include_videos);
    info!("  include_audio = {}", config.media.include_audio);
    info!("  include_pdfs = {}", config.media.include_pdfs);
    info!("");
    info!("[calls]");
    info!("  sort_by_timestamp = {}", config.calls.sort_by_timestamp);
    info!("");
    info!("[contacts]");
    info!("  fetch_remote = {}", config.contacts.fetch_remote);
    info!(
        "  fetch_timeout_secs = {}",
        config.contacts.fetch_timeout_secs
    );
    info!(
        "  connect_timeout_secs = {}",
        config.contacts.connect_timeout_secs
    );
    info!("  write_index = {}", config.contacts.write_index);
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Args {
        let mut full = vec!["xml-backup-exporter"];
        full.extend_from_slice(args);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_print_summary_with_skipped_records() {
        let mut summary = ExtractionSummary {
            records_processed: 5,
            parse_errors: 1,
            duplicates: 2,
            ..ExtractionSummary::default()
        };
        summary.add_media("jpg", 2048);
        summary.finish(true);
        assert_eq!(summary.records_skipped(), 3);
        print_summary(BackupType::MediaMms, &summary);
    }

    #[test]
    fn test_extract_requires_type_and_input() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().to_string_lossy().into_owned();

        let err = extract(&parse(&["-i", &out, "-o", &out]), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("--type"));

        let err = extract(&parse(&["-t", "calls", "-o", &out]), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("--input"));
    }

    #[test]
    fn test_extract_missing_input_path() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing").to_string_lossy().into_owned();
        let out = temp_dir.path().join("out").to_string_lossy().into_owned();

        let err = extract(
            &parse(&["-t", "calls", "-i", &missing, "-o", &out, "--json"]),
            &Config::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_extract_creates_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("calls-1.xml");
        fs::write(&input, "<calls count=\"0\"></calls>").unwrap();
        let out = temp_dir.path().join("nested").join("out");

        extract(
            &parse(&[
                "-t",
                "calls",
                "-i",
                &input.to_string_lossy(),
                "-o",
                &out.to_string_lossy(),
                "--json",
            ]),
            &Config::default(),
        )
        .unwrap();
        assert!(out.join("call_log.csv").exists());
    }

    #[test]
    fn test_generate_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("generated.toml");
        generate_config_file(Some(path.clone())).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, Config::default());
    }
}
