//! Config validation CLI tool
//!
//! Checks a pomod configuration file and reports anything that will be
//! clamped or defaulted at runtime.

use pomo_util::default_config_path;
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
            eprintln!("Validates a pomod configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    let (config, warnings) = match pomo_config::load_config_checked(&config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                pomo_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                pomo_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("Failed to parse TOML: {}", parse_err);
                }
                pomo_config::ConfigError::UnsupportedVersion(version) => {
                    eprintln!(
                        "Unsupported config version {} (expected {})",
                        version,
                        pomo_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            return ExitCode::from(1);
        }
    };

    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("✓ Configuration loads, with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    let show = |v: Option<i64>| v.map_or_else(|| "default".to_string(), |m| m.to_string());

    println!();
    println!("Summary:");
    println!("  Config version: {}", pomo_config::CURRENT_CONFIG_VERSION);
    println!("  User: {}", config.service.user);
    println!("  Data dir: {}", config.service.data_dir.display());
    println!("  Tick: {}ms", config.service.tick_interval.as_millis());
    println!("  Focus minutes: {}", show(config.timer.focus_minutes));
    println!("  Short break minutes: {}", show(config.timer.short_break_minutes));
    println!("  Long break minutes: {}", show(config.timer.long_break_minutes));
    println!("  Long break every: {}", show(config.timer.long_break_interval));
    println!("  Auto-start break: {}", config.timer.auto_start_break);
    println!("  Auto-start next focus: {}", config.timer.auto_start_next_focus);

    ExitCode::SUCCESS
}
