//! Serenity implementations of `GuildClient` and `Responder`.

use super::traits::{
    ActorStanding, GuildClient, GuildError, GuildRef, GuildResult, GuildRole, Responder, RoleRef,
    UserRef,
};
use async_trait::async_trait;
use serenity::all::{
    CommandInteraction, CreateInteractionResponse, CreateInteractionResponseMessage,
    EditInteractionResponse, GuildId, Http, Permissions, RoleId, UserId,
};
use std::sync::Arc;
use tracing::debug;

/// Discord caps member listing pages at 1000.
const MEMBER_PAGE_SIZE: u64 = 1000;

const AUDIT_REASON: &str = "Node activity status";

/// Membership context over the Discord HTTP API.
pub struct SerenityGuild {
    http: Arc<Http>,
    guild_id: GuildId,
    bot_user: UserId,
}

impl SerenityGuild {
    pub fn new(http: Arc<Http>, guild_id: GuildId, bot_user: UserId) -> Self {
        Self {
            http,
            guild_id,
            bot_user,
        }
    }

    fn user_id(user: &UserRef) -> GuildResult<UserId> {
        user.0
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(UserId::new)
            .ok_or_else(|| GuildError::InvalidReference(format!("user {}", user)))
    }

    fn role_id(role: RoleRef) -> GuildResult<RoleId> {
        if role.0 == 0 {
            return Err(GuildError::InvalidReference(format!("role {}", role)));
        }
        Ok(RoleId::new(role.0))
    }
}

fn map_error(err: serenity::Error) -> GuildError {
    let status = match &err {
        serenity::Error::Http(http_err) => http_err.status_code().map(|s| s.as_u16()),
        _ => None,
    };

    match status {
        Some(401) | Some(403) => GuildError::Unauthorized,
        _ => match err {
            serenity::Error::Http(_) => GuildError::Network(err.to_string()),
            other => GuildError::Platform(other.to_string()),
        },
    }
}

fn is_not_found(err: &serenity::Error) -> bool {
    matches!(
        err,
        serenity::Error::Http(http_err)
            if http_err.status_code().map(|s| s.as_u16()) == Some(404)
    )
}

#[async_trait]
impl GuildClient for SerenityGuild {
    fn guild(&self) -> GuildRef {
        GuildRef(self.guild_id.get())
    }

    async fn roles(&self) -> GuildResult<Vec<GuildRole>> {
        let roles = self.guild_id.roles(&*self.http).await.map_err(map_error)?;
        Ok(roles
            .into_values()
            .map(|role| GuildRole {
                id: RoleRef(role.id.get()),
                name: role.name,
                position: role.position,
            })
            .collect())
    }

    async fn member_roles(&self, user: &UserRef) -> GuildResult<Vec<RoleRef>> {
        let member = self
            .guild_id
            .member(&*self.http, Self::user_id(user)?)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    GuildError::MemberNotFound(user.clone())
                } else {
                    map_error(e)
                }
            })?;
        Ok(member.roles.iter().map(|r| RoleRef(r.get())).collect())
    }

    async fn add_role(&self, user: &UserRef, role: RoleRef) -> GuildResult<()> {
        self.http
            .add_member_role(
                self.guild_id,
                Self::user_id(user)?,
                Self::role_id(role)?,
                Some(AUDIT_REASON),
            )
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    GuildError::RoleNotFound(role)
                } else {
                    map_error(e)
                }
            })
    }

    async fn remove_role(&self, user: &UserRef, role: RoleRef) -> GuildResult<()> {
        self.http
            .remove_member_role(
                self.guild_id,
                Self::user_id(user)?,
                Self::role_id(role)?,
                Some(AUDIT_REASON),
            )
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    GuildError::RoleNotFound(role)
                } else {
                    map_error(e)
                }
            })
    }

    async fn actor_standing(&self) -> GuildResult<ActorStanding> {
        let guild = self
            .guild_id
            .to_partial_guild(&*self.http)
            .await
            .map_err(map_error)?;
        let member = self
            .guild_id
            .member(&*self.http, self.bot_user)
            .await
            .map_err(map_error)?;

        // @everyone shares the guild's ID
        let everyone = RoleId::new(self.guild_id.get());
        let mut permissions = Permissions::empty();
        let mut highest_position = 0;
        for (id, role) in &guild.roles {
            if *id == everyone || member.roles.contains(id) {
                permissions |= role.permissions;
            }
            if member.roles.contains(id) {
                highest_position = highest_position.max(role.position);
            }
        }

        let can_manage_roles = guild.owner_id == self.bot_user
            || permissions.administrator()
            || permissions.manage_roles();

        debug!(guild = %self.guild_id, highest_position, can_manage_roles, "Bot standing");
        Ok(ActorStanding {
            highest_position,
            can_manage_roles,
        })
    }

    async fn members_with_role(&self, role: RoleRef) -> GuildResult<Vec<UserRef>> {
        let role_id = Self::role_id(role)?;
        let mut holders = Vec::new();
        let mut after: Option<UserId> = None;

        loop {
            let page = self
                .guild_id
                .members(&*self.http, Some(MEMBER_PAGE_SIZE), after)
                .await
                .map_err(map_error)?;

            let full_page = page.len() as u64 == MEMBER_PAGE_SIZE;
            after = page.last().map(|m| m.user.id);

            holders.extend(
                page.iter()
                    .filter(|m| m.roles.contains(&role_id))
                    .map(|m| UserRef(m.user.id.to_string())),
            );

            if !full_page {
                break;
            }
        }

        Ok(holders)
    }
}

/// Ephemeral reply channel of one slash command interaction.
pub struct InteractionResponder {
    http: Arc<Http>,
    interaction: CommandInteraction,
}

impl InteractionResponder {
    pub fn new(http: Arc<Http>, interaction: CommandInteraction) -> Self {
        Self { http, interaction }
    }
}

#[async_trait]
impl Responder for InteractionResponder {
    async fn acknowledge(&self) -> GuildResult<()> {
        self.interaction
            .defer_ephemeral(&*self.http)
            .await
            .map_err(map_error)
    }

    async fn edit(&self, content: &str) -> GuildResult<()> {
        self.interaction
            .edit_response(&*self.http, EditInteractionResponse::new().content(content))
            .await
            .map(|_| ())
            .map_err(map_error)
    }

    async fn send(&self, content: &str) -> GuildResult<()> {
        let message = CreateInteractionResponseMessage::new()
            .content(content)
            .ephemeral(true);
        self.interaction
            .create_response(&*self.http, CreateInteractionResponse::Message(message))
            .await
            .map_err(map_error)
    }
}
