use super::services::{discord_token, load_config, open_store};
use nodegate::discord::NodegateBot;
use nodegate::gatekeeper::Gatekeeper;
use serenity::all::{GatewayIntents, GuildId};
use serenity::Client;
use std::sync::Arc;
use tracing::info;

/// Run the bot service
///
/// Connects to the Discord gateway, registers `/node` and `/checkroles` in
/// the guild, and sweeps activity roles every `[windows].sweep_interval`
/// until the process is stopped.
///
/// ## Secret Loading
///
/// The bot token and the Supabase key are each loaded from (in order):
/// 1. `--token-file` / `--store-key-file` if provided, else the file named in the config
/// 2. `NODEGATE_DISCORD_TOKEN` / `NODEGATE_SUPABASE_KEY`
/// 3. `token.txt` / `supabase-key.txt` next to the config
/// 4. Interactive prompt (stdin)
pub async fn execute(
    config: Option<String>,
    token_file: Option<String>,
    store_key_file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🚀 Starting nodegate bot...");

    let (config_path, config) = load_config(config)?;
    let token = discord_token(&config_path, &config, token_file)?;
    let store = open_store(&config_path, &config, store_key_file).await?;

    let gatekeeper = Arc::new(Gatekeeper::new(store, config.gate_settings()));
    let guild = config.discord.guild_id.map(GuildId::new);
    let handler = NodegateBot::new(gatekeeper, guild, config.windows.sweep_interval);

    // GUILD_MEMBERS is privileged: enable "Server Members Intent" for the bot
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS;
    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .map_err(|e| format!("Failed to create Discord client: {}", e))?;

    info!(guild = ?config.discord.guild_id, "Connecting to Discord");
    client
        .start()
        .await
        .map_err(|e| format!("Discord client stopped: {}", e))?;

    Ok(())
}
