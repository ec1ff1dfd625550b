//! Gatekeeper errors.
//!
//! Every variant ends the current command. Each maps to a short message
//! shown only to the requester; the `Display` form carries the diagnostic
//! detail that goes to the log.

use crate::discord::traits::GuildError;
use crate::store::StoreError;
use chrono::{DateTime, Utc};

/// Result type for gatekeeper operations.
pub type GateResult<T> = Result<T, GateError>;

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("Invalid node ID format: {0:?}")]
    InvalidFormat(String),

    #[error("No node record for {0}")]
    NotFound(String),

    #[error("Node {node_id} last seen {last_seen}")]
    Stale {
        node_id: String,
        last_seen: DateTime<Utc>,
    },

    #[error("User already linked to node {node_id}")]
    AlreadyLinked { node_id: String },

    #[error("Node {0} is linked to another user")]
    IdentifierTaken(String),

    #[error("Role not configured in guild: {0}")]
    RoleNotConfigured(String),

    #[error("Bot lacks the Manage Roles permission")]
    MissingPermission,

    #[error("Bot's highest role does not outrank {role}")]
    InsufficientRank { role: String },

    #[error("Node {0} changed while linking")]
    Conflict(String),

    #[error("Command used outside a server")]
    NotInGuild,

    #[error("Store query failed: {0}")]
    StoreQueryFailed(#[source] StoreError),

    #[error("Store update failed: {0}")]
    StoreUpdateFailed(#[source] StoreError),

    #[error("Failed to change role {role}: {source}")]
    RoleMutationFailed {
        role: String,
        #[source]
        source: GuildError,
    },

    #[error("{0}")]
    Unknown(String),
}

impl GateError {
    /// Discord lookup failure outside role mutation.
    pub(crate) fn guild_lookup(what: &str, e: GuildError) -> Self {
        Self::Unknown(format!("Failed to look up {}: {}", what, e))
    }

    /// True for outcomes caused by the request itself rather than by the
    /// bot's setup or its collaborators.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFormat(_)
                | Self::NotFound(_)
                | Self::Stale { .. }
                | Self::AlreadyLinked { .. }
                | Self::IdentifierTaken(_)
                | Self::Conflict(_)
                | Self::NotInGuild
        )
    }

    /// Message shown to the requester.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidFormat(_) => "❌ Invalid node ID. Use 1-64 letters, digits, '-' or '_'."
                .to_string(),
            Self::NotFound(_) => "❌ No node found with this ID.".to_string(),
            Self::Stale { last_seen, .. } => format!(
                "❌ This node has not checked in recently (last seen <t:{}:R>). \
                 Make sure it is running, then try again.",
                last_seen.timestamp()
            ),
            Self::AlreadyLinked { node_id } => format!(
                "❌ Your account is already linked to node `{}`. One node per user.",
                node_id
            ),
            Self::IdentifierTaken(_) => {
                "❌ This node is already linked to another user.".to_string()
            }
            Self::RoleNotConfigured(role) => format!(
                "❌ Could not find the \"{}\" role. Please ask an admin to create it.",
                role
            ),
            Self::MissingPermission => "❌ Bot is missing permissions. Please give the bot \
                 \"Manage Roles\" permission."
                .to_string(),
            Self::InsufficientRank { role } => format!(
                "❌ Bot's role must be higher than the \"{}\" role in the server settings.",
                role
            ),
            Self::Conflict(_) => {
                "⚠️ Your node reported in while we were linking it. Please run the command again."
                    .to_string()
            }
            Self::NotInGuild => "❌ This command can only be used in a server.".to_string(),
            Self::RoleMutationFailed { .. } => {
                "❌ Failed to update your roles. Please check bot permissions.".to_string()
            }
            Self::StoreQueryFailed(_) | Self::StoreUpdateFailed(_) | Self::Unknown(_) => {
                "❌ An error occurred. Please try again later.".to_string()
            }
        }
    }
}
