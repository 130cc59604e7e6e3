//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `CALBRIDGE_BIND_ADDR`: Webhook server bind address
//! - `CALBRIDGE_GOOGLE_CLIENT_ID`: OAuth client id
//! - `CALBRIDGE_GOOGLE_CLIENT_SECRET`: OAuth client secret
//! - `CALBRIDGE_GOOGLE_REDIRECT_URI`: OAuth redirect URI
//! - `CALBRIDGE_WEBHOOK_ADDRESS`: Public HTTPS address for push notifications
//! - `CALBRIDGE_TENANTS`: JSON array of tenant registry entries
//! - `CALBRIDGE_GOOGLE_API_BASE`: Optional API base override (tests)
//! - `CALBRIDGE_GOOGLE_TOKEN_ENDPOINT`: Optional token endpoint override
//! - `CALBRIDGE_GOOGLE_USERINFO_ENDPOINT`: Optional userinfo endpoint override
//! - `CALBRIDGE_SYNC_WORKERS`: Optional worker pool size override
//! - `CALBRIDGE_RENEWAL_LEAD_HOURS`: Optional channel renewal lead override
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./calbridge.json` or `./calbridge.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. Relative to executable location

use std::path::{Path, PathBuf};

use calbridge_domain::{
    CalbridgeError, Config, GoogleAppConfig, Result, ServerConfig, SyncSettings, TenantConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `CalbridgeError::Config` if configuration cannot be loaded from
/// either source, or if required fields are missing or malformed.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "environment configuration incomplete, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// All required environment variables must be present. The tenant registry
/// is passed as a JSON array in `CALBRIDGE_TENANTS`, e.g.
/// `[{"id":"acme","host":"acme.example.com","db_path":"/var/lib/calbridge/acme.db"}]`.
///
/// # Errors
/// Returns `CalbridgeError::Config` if required variables are missing or
/// have invalid values.
pub fn load_from_env() -> Result<Config> {
    let bind_addr = env_var("CALBRIDGE_BIND_ADDR")?;
    let client_id = env_var("CALBRIDGE_GOOGLE_CLIENT_ID")?;
    let client_secret = env_var("CALBRIDGE_GOOGLE_CLIENT_SECRET")?;
    let redirect_uri = env_var("CALBRIDGE_GOOGLE_REDIRECT_URI")?;
    let webhook_address = env_var("CALBRIDGE_WEBHOOK_ADDRESS")?;

    let tenants_json = env_var("CALBRIDGE_TENANTS")?;
    let tenants: Vec<TenantConfig> = serde_json::from_str(&tenants_json)
        .map_err(|e| CalbridgeError::Config(format!("Invalid CALBRIDGE_TENANTS: {e}")))?;
    if tenants.is_empty() {
        return Err(CalbridgeError::Config("CALBRIDGE_TENANTS must not be empty".into()));
    }

    let mut sync = SyncSettings::default();
    if let Some(workers) = env_parse_opt::<usize>("CALBRIDGE_SYNC_WORKERS")? {
        sync.workers = workers;
    }
    if let Some(lead) = env_parse_opt::<i64>("CALBRIDGE_RENEWAL_LEAD_HOURS")? {
        sync.renewal_lead_hours = lead;
    }

    // Deserialize through serde so the endpoint defaults stay defined in one
    // place, on the domain type.
    let mut google: GoogleAppConfig = serde_json::from_value(serde_json::json!({
        "client_id": client_id,
        "client_secret": client_secret,
        "redirect_uri": redirect_uri,
        "webhook_address": webhook_address,
    }))
    .map_err(|e| CalbridgeError::Config(format!("google config: {e}")))?;
    if let Ok(api_base) = std::env::var("CALBRIDGE_GOOGLE_API_BASE") {
        google.api_base = api_base;
    }
    if let Ok(token_endpoint) = std::env::var("CALBRIDGE_GOOGLE_TOKEN_ENDPOINT") {
        google.token_endpoint = token_endpoint;
    }
    if let Ok(userinfo_endpoint) = std::env::var("CALBRIDGE_GOOGLE_USERINFO_ENDPOINT") {
        google.userinfo_endpoint = userinfo_endpoint;
    }

    Ok(Config { server: ServerConfig { bind_addr }, google, sync, tenants })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Errors
/// Returns `CalbridgeError::Config` if the file cannot be found, read, or
/// parsed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalbridgeError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalbridgeError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalbridgeError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, detecting the format by file
/// extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    let config: Config = match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CalbridgeError::Config(format!("Invalid TOML format: {e}")))?,
        "json" => serde_json::from_str(contents)
            .map_err(|e| CalbridgeError::Config(format!("Invalid JSON format: {e}")))?,
        _ => {
            return Err(CalbridgeError::Config(format!("Unsupported config format: {extension}")))
        }
    };

    if config.tenants.is_empty() {
        return Err(CalbridgeError::Config("tenant registry must not be empty".into()));
    }

    Ok(config)
}

/// Probe multiple paths for configuration files
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("calbridge.json"),
            cwd.join("calbridge.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
        ]);
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("calbridge.json"),
                exe_dir.join("calbridge.toml"),
            ]);
        }
    }

    candidates.into_iter().find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        CalbridgeError::Config(format!("Missing required environment variable: {key}"))
    })
}

fn env_parse_opt<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| CalbridgeError::Config(format!("Invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}
