//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If `TIDEMARK_STORE_BACKEND` is unset, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TIDEMARK_STORE_BACKEND`: `memory` or `sqlite` (required)
//! - `TIDEMARK_DB_PATH`: Database file path
//! - `TIDEMARK_DB_POOL_SIZE`: Connection pool size
//! - `TIDEMARK_MACHINE_ID`: Lease holder identity (defaults to host name)
//! - `TIDEMARK_LEASE_SECONDS`: Default lease length in seconds
//! - `TIDEMARK_SCHEDULER_ENABLED`: Whether the periodic scheduler runs
//! - `TIDEMARK_STARTUP_DELAY`: Seconds before the first scheduled pass
//! - `TIDEMARK_CHECK_INTERVAL`: Seconds between scheduled passes
//! - `TIDEMARK_LOG_LEVEL`: Default log filter
//! - `TIDEMARK_LOG_JSON`: Emit JSON log lines (true/false)
//!
//! Unset optional variables keep their defaults.
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./tidemark.json` or `./tidemark.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tidemark_domain::{Config, Result, StoreBackend, TidemarkError};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the backend
/// variable is missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `TidemarkError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// `TIDEMARK_STORE_BACKEND` must be present; everything else is optional.
///
/// # Errors
/// Returns `TidemarkError::Config` if the backend variable is missing or any
/// variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.store.backend = env_var("TIDEMARK_STORE_BACKEND")?
        .parse::<StoreBackend>()
        .map_err(TidemarkError::Config)?;

    if let Some(path) = env_opt("TIDEMARK_DB_PATH") {
        config.database.path = path;
    }
    if let Some(pool_size) = env_parse::<u32>("TIDEMARK_DB_POOL_SIZE", "pool size")? {
        config.database.pool_size = pool_size;
    }
    if let Some(machine_id) = env_opt("TIDEMARK_MACHINE_ID") {
        config.store.machine_id = Some(machine_id);
    }
    if let Some(seconds) = env_parse::<u64>("TIDEMARK_LEASE_SECONDS", "lease duration")? {
        config.store.default_lease_seconds = seconds;
    }

    config.scheduler.enabled = env_bool("TIDEMARK_SCHEDULER_ENABLED", config.scheduler.enabled);
    if let Some(seconds) = env_parse::<u64>("TIDEMARK_STARTUP_DELAY", "startup delay")? {
        config.scheduler.startup_delay_seconds = seconds;
    }
    if let Some(seconds) = env_parse::<u64>("TIDEMARK_CHECK_INTERVAL", "check interval")? {
        config.scheduler.check_interval_seconds = seconds;
    }

    if let Some(level) = env_opt("TIDEMARK_LOG_LEVEL") {
        config.logging.level = level;
    }
    config.logging.json = env_bool("TIDEMARK_LOG_JSON", config.logging.json);

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `TidemarkError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(TidemarkError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            TidemarkError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| TidemarkError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| TidemarkError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| TidemarkError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(TidemarkError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe multiple paths for configuration files
///
/// Returns the first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    const NAMES: [&str; 8] = [
        "config.json",
        "config.toml",
        "tidemark.json",
        "tidemark.toml",
        "../config.json",
        "../config.toml",
        "../../config.json",
        "../../config.toml",
    ];

    let mut bases = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        bases.push(cwd);
    }
    if let Some(exe_dir) =
        std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        bases.push(exe_dir);
    }

    bases
        .iter()
        .flat_map(|base| NAMES.iter().map(move |name| base.join(name)))
        .find(|path| path.exists())
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| TidemarkError::Config(format!("Missing required environment variable: {key}")))
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an optional numeric variable, rejecting malformed values.
fn env_parse<T>(key: &str, what: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| TidemarkError::Config(format!("Invalid {what} in {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
