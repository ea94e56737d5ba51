//! # Local Logger
//!
//! Installs a `fern` dispatcher that writes every record to the console and to
//! a per-run log file. Only the newest log file of an application is kept; older
//! ones are removed before the new file is opened.

use std::fs;
use std::io::IsTerminal;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

/// Maps a configured level name onto a `log` filter. Unknown names mean `info`.
pub fn parse_level(log_level: &str) -> log::LevelFilter {
    match log_level.trim().to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" | "warning" => log::LevelFilter::Warn,
        "error" | "fatal" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// # Setup Logging
///
/// Installs the global logger for `app_name`.
///
/// # Arguments
/// * `app_name` - Prefix of the log file name, e.g. `opsdash`.
/// * `log_dir` - Directory for the log file; `None` logs to the console only.
/// * `log_level` - Level name, see [`parse_level`].
///
/// # Errors
/// Fails when the log directory cannot be created, the log file cannot be
/// opened, or a global logger is already installed.
pub fn setup_logging(app_name: &str, log_dir: Option<&Path>, log_level: &str) -> Result<()> {
    let level = parse_level(log_level);
    let colour = std::io::stdout().is_terminal();

    let console = fern::Dispatch::new()
        .format(move |out, message, record| {
            let level = if colour {
                colour_level(record.level())
            } else {
                record.level().to_string()
            };
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                level,
                message
            ))
        })
        .chain(std::io::stdout());

    let mut root = fern::Dispatch::new()
        .level(level)
        // Dependencies are chatty at debug level.
        .level_for("tungstenite", log::LevelFilter::Warn)
        .level_for("tokio_tungstenite", log::LevelFilter::Warn)
        .level_for("hyper_util", log::LevelFilter::Warn)
        .level_for("reqwest", log::LevelFilter::Warn)
        .chain(console);

    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
        cleanup_old_logs(app_name, dir)?;

        let file_name = format!(
            "{}_{}.log",
            app_name,
            chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
        );
        let file = fern::log_file(dir.join(file_name)).context("failed to open log file")?;

        root = root.chain(
            fern::Dispatch::new()
                .format(|out, message, record| {
                    out.finish(format_args!(
                        "{}[{}][{}] {}",
                        chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                        record.target(),
                        record.level(),
                        message
                    ))
                })
                .chain(file),
        );
    }

    root.apply().context("a global logger is already installed")?;
    Ok(())
}

fn colour_level(level: log::Level) -> String {
    match level {
        log::Level::Error => "ERROR".red().bold().to_string(),
        log::Level::Warn => "WARN".yellow().to_string(),
        log::Level::Info => "INFO".green().to_string(),
        log::Level::Debug => "DEBUG".blue().to_string(),
        log::Level::Trace => "TRACE".dimmed().to_string(),
    }
}

/// Removes every `<app_name>_*.log` file in `log_dir`.
///
/// File names embed a sortable timestamp, so the new file created right after
/// this call is the only one left.
fn cleanup_old_logs(app_name: &str, log_dir: &Path) -> Result<()> {
    let prefix = format!("{app_name}_");
    let entries = fs::read_dir(log_dir)
        .with_context(|| format!("failed to list log directory {}", log_dir.display()))?;

    for entry in entries.filter_map(|res| res.ok()) {
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".log"));
        if is_ours {
            if let Err(e) = fs::remove_file(&path) {
                eprintln!("Failed to delete old log file {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}
