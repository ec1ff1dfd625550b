//! Discord Client Trait Abstractions
//!
//! These traits let the gatekeeper run against MockGuildClient in tests and
//! against the serenity HTTP client in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discord user identifier (snowflake, kept as a string like the record store does)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserRef(pub String);

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discord role identifier (snowflake)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleRef(pub u64);

impl fmt::Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discord guild identifier (snowflake)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GuildRef(pub u64);

impl fmt::Display for GuildRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A role as listed in the guild's role catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRole {
    pub id: RoleRef,
    pub name: String,
    /// Hierarchy position; higher positions outrank lower ones
    pub position: u16,
}

/// What the bot itself is allowed to do in a guild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorStanding {
    /// Position of the bot's highest role
    pub highest_position: u16,
    /// Manage Roles (or Administrator) permission
    pub can_manage_roles: bool,
}

/// Result type for Discord operations
pub type GuildResult<T> = Result<T, GuildError>;

/// Discord client errors
#[derive(Debug, thiserror::Error)]
pub enum GuildError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Role not found: {0}")]
    RoleNotFound(RoleRef),

    #[error("Member not found: {0}")]
    MemberNotFound(UserRef),

    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Unauthorized operation")]
    Unauthorized,

    #[error("Discord error: {0}")]
    Platform(String),
}

/// Membership context for a single guild
///
/// One value is bound to one guild; the bot builds a fresh one for every
/// interaction from the interaction's guild ID.
#[async_trait]
pub trait GuildClient: Send + Sync {
    /// Guild this client operates on
    fn guild(&self) -> GuildRef;

    /// Full role catalog of the guild
    async fn roles(&self) -> GuildResult<Vec<GuildRole>>;

    /// Roles currently held by a member
    async fn member_roles(&self, user: &UserRef) -> GuildResult<Vec<RoleRef>>;

    /// Grant a role to a member
    async fn add_role(&self, user: &UserRef, role: RoleRef) -> GuildResult<()>;

    /// Revoke a role from a member
    async fn remove_role(&self, user: &UserRef, role: RoleRef) -> GuildResult<()>;

    /// Bot's highest role position and Manage Roles capability
    async fn actor_standing(&self) -> GuildResult<ActorStanding>;

    /// Every member currently holding `role`
    async fn members_with_role(&self, role: RoleRef) -> GuildResult<Vec<UserRef>>;
}

/// Reply channel of a single command invocation
///
/// Replies are always visible only to the requester.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Defer the reply (Discord shows "thinking...")
    async fn acknowledge(&self) -> GuildResult<()>;

    /// Fill in the deferred reply
    async fn edit(&self, content: &str) -> GuildResult<()>;

    /// Send a reply to an invocation that was never acknowledged
    async fn send(&self, content: &str) -> GuildResult<()>;
}
