use super::services::{discord_token, load_config, open_store};
use chrono::Utc;
use nodegate::discord::SerenityGuild;
use nodegate::gatekeeper::Gatekeeper;
use serenity::all::{GuildId, Http};
use std::sync::Arc;

/// Run one activity sweep and print the report
///
/// Uses the Discord HTTP API only; no gateway connection is opened, so
/// this can run from cron next to (or instead of) the bot's own schedule.
pub async fn execute(
    config: Option<String>,
    token_file: Option<String>,
    store_key_file: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (config_path, config) = load_config(config)?;
    let token = discord_token(&config_path, &config, token_file)?;
    let store = open_store(&config_path, &config, store_key_file).await?;

    let http = Arc::new(Http::new(&token));
    let bot = http
        .get_current_user()
        .await
        .map_err(|e| format!("Failed to authenticate with Discord: {}", e))?;

    let guild_id = match config.discord.guild_id {
        Some(id) => GuildId::new(id),
        None => http
            .get_guilds(None, Some(1))
            .await
            .map_err(|e| format!("Failed to list guilds: {}", e))?
            .first()
            .map(|g| g.id)
            .ok_or("Bot is not in any guild; set [discord].guild_id")?,
    };

    let gatekeeper = Gatekeeper::new(store, config.gate_settings());
    let guild = SerenityGuild::new(Arc::clone(&http), guild_id, bot.id);

    println!("🔄 Sweeping guild {}...", guild_id);
    let report = gatekeeper.sweep(&guild, Utc::now()).await?;

    println!();
    println!("Checked:     {}", report.checked);
    println!("Activated:   {}", report.activated);
    println!("Deactivated: {}", report.deactivated);
    println!("Failed:      {}", report.failed);

    Ok(())
}
