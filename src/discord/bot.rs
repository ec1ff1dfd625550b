//! Gateway event handler.
//!
//! On Ready the slash commands are registered in the target guild and the
//! activity sweep is spawned (once, even across reconnects). Each command
//! interaction is answered through a `ReplyObligation`, so every path
//! produces exactly one ephemeral reply.

use super::client::{InteractionResponder, SerenityGuild};
use super::commands::{registrations, unknown_command_text, Command};
use super::reply::ReplyObligation;
use super::traits::{GuildClient, Responder, UserRef};
use crate::gatekeeper::{GateError, GateResult, Gatekeeper};
use crate::store::NodeStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{CommandDataOptionValue, Context, EventHandler, GuildId, Interaction, Ready};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Serenity event handler wiring Discord to the gatekeeper.
pub struct NodegateBot {
    gatekeeper: Arc<Gatekeeper<dyn NodeStore>>,
    guild: Option<GuildId>,
    sweep_interval: Duration,
    sweep_started: AtomicBool,
}

impl NodegateBot {
    /// `guild` pins the bot to one guild; otherwise the first guild in
    /// Ready is used for command registration and sweeps.
    pub fn new(
        gatekeeper: Arc<Gatekeeper<dyn NodeStore>>,
        guild: Option<GuildId>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            gatekeeper,
            guild,
            sweep_interval,
            sweep_started: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EventHandler for NodegateBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Connected to Discord");

        let Some(guild_id) = self.guild.or_else(|| ready.guilds.first().map(|g| g.id)) else {
            warn!("Bot is not in any guild; commands not registered");
            return;
        };

        match guild_id.set_commands(&ctx.http, registrations()).await {
            Ok(commands) => info!(guild = %guild_id, count = commands.len(), "Registered commands"),
            Err(e) => error!(guild = %guild_id, error = %e, "Failed to register commands"),
        }

        if self.sweep_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let gatekeeper = Arc::clone(&self.gatekeeper);
        let guild = SerenityGuild::new(Arc::clone(&ctx.http), guild_id, ready.user.id);
        let every = self.sweep_interval;
        info!(guild = %guild_id, interval = ?every, "Starting activity sweep");
        tokio::spawn(async move {
            gatekeeper.run_sweeps(&guild, every).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(interaction) = interaction else {
            return;
        };

        let command = {
            let options = interaction.data.options.iter().filter_map(|option| {
                match &option.value {
                    CommandDataOptionValue::String(value) => {
                        Some((option.name.as_str(), value.as_str()))
                    }
                    _ => None,
                }
            });
            Command::parse(&interaction.data.name, options)
        };
        let user = UserRef(interaction.user.id.to_string());
        let bot_user = ctx.cache.current_user().id;
        let guild = interaction
            .guild_id
            .map(|id| SerenityGuild::new(Arc::clone(&ctx.http), id, bot_user));
        let responder = InteractionResponder::new(Arc::clone(&ctx.http), interaction);

        handle_command(
            &*self.gatekeeper,
            guild.as_ref(),
            &responder,
            &user,
            &command,
            Utc::now(),
        )
        .await;
    }
}

/// Run one command and deliver its single reply.
pub async fn handle_command<S, G, R>(
    gatekeeper: &Gatekeeper<S>,
    guild: Option<&G>,
    responder: &R,
    user: &UserRef,
    command: &Command,
    now: DateTime<Utc>,
) where
    S: NodeStore + ?Sized,
    G: GuildClient + ?Sized,
    R: Responder + ?Sized,
{
    let reply = ReplyObligation::acknowledge(responder).await;

    let outcome: GateResult<String> = match (command, guild) {
        (Command::Unknown(name), _) => Ok(unknown_command_text(name)),
        (_, None) => Err(GateError::NotInGuild),
        (Command::Node { node_id }, Some(guild)) => gatekeeper
            .verify(guild, user, node_id, now)
            .await
            .map(|verification| verification.summary()),
        (Command::CheckRoles, Some(guild)) => gatekeeper
            .check_member(guild, user, now)
            .await
            .map(|check| check.summary()),
    };

    let content = match outcome {
        Ok(content) => content,
        Err(e) => {
            if e.is_user_error() {
                warn!(%user, command = command.name(), error = %e, "Command rejected");
            } else {
                error!(%user, command = command.name(), error = ?e, "Command failed");
            }
            e.user_message()
        }
    };

    if let Err(e) = reply.resolve(&content).await {
        error!(%user, command = command.name(), error = %e, "Failed to deliver reply");
    }
}
