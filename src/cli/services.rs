//! Shared startup for the commands that talk to Discord or the store.

use super::config::{resolve_config_path, sibling_path, NodegateConfig, StoreBackend};
use super::secrets::{
    determine_secret_source, read_secret, DEFAULT_SUPABASE_KEY_FILE, DEFAULT_TOKEN_FILE,
    DISCORD_TOKEN_ENV, SUPABASE_KEY_ENV,
};
use nodegate::store::{NodeStore, SqliteStore, SupabaseStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed (tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the config, generating a default one on first run.
///
/// A freshly generated config still has placeholder values, so this returns
/// an error asking the operator to edit it.
pub fn load_config(
    config: Option<String>,
) -> Result<(PathBuf, NodegateConfig), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config);

    if !config_path.exists() {
        println!("📝 No config file found. Creating default configuration...");
        NodegateConfig::create_default(&config_path, false)?;
        println!("   Created: {}", config_path.display());
        return Err(format!(
            "Edit {} (store URL and roles), then run again",
            config_path.display()
        )
        .into());
    }

    let config = NodegateConfig::load(&config_path)?;
    init_logging(&config.logging.level);
    info!(config = %config_path.display(), "Loaded configuration");
    Ok((config_path, config))
}

/// Read the Discord bot token.
pub fn discord_token(
    config_path: &Path,
    config: &NodegateConfig,
    token_file: Option<String>,
) -> Result<String, Box<dyn std::error::Error>> {
    let explicit = token_file
        .map(PathBuf::from)
        .or_else(|| config.discord.token_file.clone());
    let source = determine_secret_source(
        explicit,
        DISCORD_TOKEN_ENV,
        &sibling_path(config_path, DEFAULT_TOKEN_FILE),
    );
    read_secret(source, "Discord bot token")
}

/// Open the configured record store.
pub async fn open_store(
    config_path: &Path,
    config: &NodegateConfig,
    key_file: Option<String>,
) -> Result<Arc<dyn NodeStore>, Box<dyn std::error::Error>> {
    let store = &config.store;
    match store.backend {
        StoreBackend::Supabase => {
            let url = store
                .url
                .as_deref()
                .ok_or("[store].url is required for the supabase backend")?;
            let explicit = key_file.map(PathBuf::from).or_else(|| store.key_file.clone());
            let source = determine_secret_source(
                explicit,
                SUPABASE_KEY_ENV,
                &sibling_path(config_path, DEFAULT_SUPABASE_KEY_FILE),
            );
            let key = read_secret(source, "Supabase service key")?;

            let supabase = SupabaseStore::new(url, &store.table, key);
            info!(endpoint = supabase.endpoint(), "Using Supabase record store");
            Ok(Arc::new(supabase))
        }
        StoreBackend::Sqlite => {
            let path = store
                .sqlite_path
                .as_deref()
                .ok_or("[store].sqlite_path is required for the sqlite backend")?;
            let sqlite = SqliteStore::open(path).await?;
            info!(path = %path.display(), "Using SQLite record store");
            Ok(Arc::new(sqlite))
        }
    }
}
