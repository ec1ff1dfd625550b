//! Nodegate configuration file handling
//!
//! Provides default configuration generation and loading for the bot.
//! Configuration files are TOML and live under the data directory
//! (`~/.local/share/nodegate/config.toml` on Linux) unless `--config` says
//! otherwise.
//!
//! Secrets (bot token, store key) are never read from this file directly;
//! it only names the files that hold them. See `secrets.rs`.

use nodegate::gatekeeper::{GateSettings, RoleSettings, RoleSpec, Windows};
use nodegate::gatekeeper::{DEFAULT_ACTIVITY_WINDOW, DEFAULT_VERIFICATION_WINDOW};
use nodegate::store::supabase::DEFAULT_TABLE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default primary role name
const DEFAULT_VERIFIED_ROLE: &str = "Altruistic Mode";

/// Sweep once a day
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file already exists: {0} (use --force to overwrite)")]
    AlreadyExists(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Nodegate bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodegateConfig {
    /// Discord connection settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Record store settings
    pub store: StoreConfig,

    /// Managed roles
    #[serde(default)]
    pub roles: RolesConfig,

    /// Freshness windows and sweep cadence
    #[serde(default)]
    pub windows: WindowsConfig,

    /// Activity sweep behavior
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Guild to register commands in and sweep (default: first guild at startup)
    pub guild_id: Option<u64>,

    /// File holding the bot token
    pub token_file: Option<PathBuf>,
}

/// Which record store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Supabase,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Supabase project URL
    pub url: Option<String>,

    /// Table holding node records
    #[serde(default = "default_table")]
    pub table: String,

    /// File holding the Supabase service key
    pub key_file: Option<PathBuf>,

    /// SQLite database path (sqlite backend)
    pub sqlite_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    /// Primary role, by name or `id:<snowflake>`
    pub verified: RoleSpec,
    pub active: Option<RoleSpec>,
    pub inactive: Option<RoleSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowsConfig {
    #[serde(default = "default_verification", with = "duration_str")]
    pub verification: Duration,

    #[serde(default = "default_activity", with = "duration_str")]
    pub activity: Duration,

    #[serde(default = "default_sweep_interval", with = "duration_str")]
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Also visit holders of the inactive role so returning nodes are promoted
    #[serde(default)]
    pub include_inactive: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_verification() -> Duration {
    DEFAULT_VERIFICATION_WINDOW
}

fn default_activity() -> Duration {
    DEFAULT_ACTIVITY_WINDOW
}

fn default_sweep_interval() -> Duration {
    DEFAULT_SWEEP_INTERVAL
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            verified: RoleSpec::Name(DEFAULT_VERIFIED_ROLE.to_string()),
            active: None,
            inactive: None,
        }
    }
}

impl Default for WindowsConfig {
    fn default() -> Self {
        Self {
            verification: DEFAULT_VERIFICATION_WINDOW,
            activity: DEFAULT_ACTIVITY_WINDOW,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Durations as humantime strings ("24h", "7d")
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

impl NodegateConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: NodegateConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    #[allow(dead_code)]
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        write_file(path, &contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.guild_id == Some(0) {
            return Err(ConfigError::Invalid(
                "[discord].guild_id must be a guild snowflake".to_string(),
            ));
        }

        match self.store.backend {
            StoreBackend::Supabase if self.store.url.is_none() => {
                return Err(ConfigError::Invalid(
                    "[store].url is required for the supabase backend".to_string(),
                ));
            }
            StoreBackend::Sqlite if self.store.sqlite_path.is_none() => {
                return Err(ConfigError::Invalid(
                    "[store].sqlite_path is required for the sqlite backend".to_string(),
                ));
            }
            _ => {}
        }

        let windows = &self.windows;
        if windows.verification.is_zero()
            || windows.activity.is_zero()
            || windows.sweep_interval.is_zero()
        {
            return Err(ConfigError::Invalid(
                "[windows] durations must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Gatekeeper settings derived from this file
    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            roles: RoleSettings {
                verified: self.roles.verified.clone(),
                active: self.roles.active.clone(),
                inactive: self.roles.inactive.clone(),
            },
            windows: Windows {
                verification: self.windows.verification,
                activity: self.windows.activity,
            },
            sweep_inactive: self.sweep.include_inactive,
        }
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        r#"# Nodegate Bot Configuration
#
# Links node IDs reported to the record store with Discord members, and keeps
# their status roles in step with node activity.
#
# Secrets are not stored here. Point token_file / key_file at files holding
# them, or set NODEGATE_DISCORD_TOKEN / NODEGATE_SUPABASE_KEY.

[discord]
# Guild to register /node and /checkroles in, and to sweep.
# Leave commented to use the first guild the bot is in.
# guild_id = 123456789012345678

# File holding the bot token (default: token.txt next to this file)
# token_file = "/run/secrets/discord-token"

[store]
# Record store backend: "supabase" or "sqlite"
backend = "supabase"

# Supabase project URL
url = "https://your-project.supabase.co"

# Table holding node records
table = "node_records"

# File holding the Supabase service key (default: supabase-key.txt next to this file)
# key_file = "/run/secrets/supabase-key"

# SQLite database (sqlite backend only)
# sqlite_path = "/var/lib/nodegate/nodes.db"

[roles]
# Roles can be given by name or as "id:<snowflake>".
# Names are bound to IDs the first time a guild is seen, so later renames are safe.
verified = "Altruistic Mode"

# Optional status roles, swapped by node activity
# active = "Active Node"
# inactive = "Inactive Node"

[windows]
# A node must have reported within this window to be verified
verification = "24h"

# A node must have reported within this window to keep the active role
activity = "7d"

# How often to sweep holders of the active role
sweep_interval = "24h"

[sweep]
# Also sweep holders of the inactive role, so returning nodes are promoted
include_inactive = false

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG overrides)
level = "info"
"#
        .to_string()
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path, force: bool) -> Result<(), ConfigError> {
        if config_path.exists() && !force {
            return Err(ConfigError::AlreadyExists(config_path.to_path_buf()));
        }
        write_file(config_path, &Self::generate_default_toml())
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };

    // Create parent directory if needed
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    fs::write(path, contents).map_err(write_err)
}

/// Directory holding the config and default secret files
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nodegate")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// Resolve `--config`, falling back to the default path
pub fn resolve_config_path(config: Option<String>) -> PathBuf {
    config.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// A file with this name next to the config file
pub fn sibling_path(config_path: &Path, file_name: &str) -> PathBuf {
    config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(file_name)
}
