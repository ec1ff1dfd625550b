use super::config::{resolve_config_path, NodegateConfig};

/// Write the default configuration file
pub fn execute(config: Option<String>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = resolve_config_path(config);
    NodegateConfig::create_default(&config_path, force)?;

    println!("📝 Wrote default configuration to {}", config_path.display());
    println!("   Set [store].url and [roles] before running the bot.");
    Ok(())
}
