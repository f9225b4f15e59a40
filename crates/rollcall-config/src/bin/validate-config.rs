//! Config validation CLI tool
//!
//! Validates a rollcall configuration file and reports any errors.

use rollcall_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a rollcall configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match rollcall_config::load_config(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", rollcall_config::CURRENT_CONFIG_VERSION);
            println!("  Owner: {}", config.owner);
            println!("  Data directory: {}", config.data_dir.display());
            println!(
                "  Minimum attendance rate: {:.0}%",
                config.defaults.minimum_attendance_rate * 100.0
            );
            println!(
                "  Snapshot interval: {}s",
                config.defaults.snapshot_interval_seconds
            );
            println!(
                "  Auto clear: on new session = {}, after report = {}",
                config.defaults.auto_clear_on_new_session, config.defaults.auto_clear_after_report
            );

            if !config.seed_instructors.is_empty() {
                println!();
                println!("Seed instructors:");
                for id in &config.seed_instructors {
                    println!("  - {}", id);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();

            match &e {
                rollcall_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Errors:");
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                }
                _ => {
                    eprintln!("Error: {}", e);
                }
            }

            ExitCode::from(1)
        }
    }
}
