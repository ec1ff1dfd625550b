//! Node verification (`/node <nodeid>`).
//!
//! Checks, in order, each failing fast:
//! 1. Node ID format (before touching the store)
//! 2. Requester has no linked node yet (one node per user)
//! 3. Node is not linked to someone else (one user per node)
//! 4. Node has a record, and it is fresher than the verification window
//! 5. Roles resolve in this guild and the bot may manage them
//!
//! Then the node is linked with a conditional update on the exact record
//! that was read, and the roles are granted.

use super::error::{GateError, GateResult};
use super::gate::Gatekeeper;
use super::identifier::validate_node_id;
use super::roles::ensure_manageable;
use crate::discord::traits::{GuildClient, UserRef};
use crate::store::{NodeRecord, NodeStore};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub record: NodeRecord,
    /// Names of roles granted
    pub granted: Vec<String>,
    /// Names of roles revoked
    pub revoked: Vec<String>,
}

impl Verification {
    /// Reply shown to the requester.
    pub fn summary(&self) -> String {
        let record = &self.record;
        let mut lines = vec![
            "✅ Node verified! Role granted successfully.".to_string(),
            format!("Node ID: `{}`", record.node_id),
        ];
        if let Some(version) = &record.version {
            lines.push(format!("Version: {}", version));
        }
        if let Some(peers) = record.peer_count {
            lines.push(format!("Peers: {}", peers));
        }
        lines.push(format!("Last seen: <t:{}:R>", record.timestamp.timestamp()));
        lines.join("\n")
    }
}

impl<S: NodeStore + ?Sized> Gatekeeper<S> {
    /// Link `raw_node_id` to `user` and grant the node roles.
    pub async fn verify<G: GuildClient + ?Sized>(
        &self,
        guild: &G,
        user: &UserRef,
        raw_node_id: &str,
        now: DateTime<Utc>,
    ) -> GateResult<Verification> {
        let node_id = validate_node_id(raw_node_id)?;

        if let Some(existing) = self
            .store
            .latest_for_user(user)
            .await
            .map_err(GateError::StoreQueryFailed)?
        {
            return Err(GateError::AlreadyLinked {
                node_id: existing.node_id,
            });
        }

        if let Some(owner) = self
            .store
            .linked_user_for_node(node_id)
            .await
            .map_err(GateError::StoreQueryFailed)?
        {
            // Requesters with a link were rejected above, so `owner` is someone else
            warn!(%user, %owner, node_id, "Node already linked to another user");
            return Err(GateError::IdentifierTaken(node_id.to_string()));
        }

        let record = self
            .store
            .latest_for_node(node_id)
            .await
            .map_err(GateError::StoreQueryFailed)?
            .ok_or_else(|| GateError::NotFound(node_id.to_string()))?;

        if !record.is_fresh(now, self.windows.verification) {
            return Err(GateError::Stale {
                node_id: node_id.to_string(),
                last_seen: record.timestamp,
            });
        }

        let roles = self.roles.resolve(guild).await?;
        let standing = guild
            .actor_standing()
            .await
            .map_err(|e| GateError::guild_lookup("bot standing", e))?;
        ensure_manageable(&standing, &roles.managed())?;

        let linked = self
            .store
            .link_user(node_id, record.timestamp, user)
            .await
            .map_err(GateError::StoreUpdateFailed)?;
        if linked == 0 {
            warn!(%user, node_id, "Node record changed between read and link");
            return Err(GateError::Conflict(node_id.to_string()));
        }

        let held = guild
            .member_roles(user)
            .await
            .map_err(|e| GateError::guild_lookup("member roles", e))?;

        let mut granted = Vec::new();
        let mut revoked = Vec::new();

        for role in std::iter::once(&roles.verified).chain(roles.active.as_ref()) {
            if !held.contains(&role.id) {
                guild
                    .add_role(user, role.id)
                    .await
                    .map_err(|source| GateError::RoleMutationFailed {
                        role: role.name.clone(),
                        source,
                    })?;
                granted.push(role.name.clone());
            }
        }

        if let Some(inactive) = roles.inactive.as_ref().filter(|r| held.contains(&r.id)) {
            guild
                .remove_role(user, inactive.id)
                .await
                .map_err(|source| GateError::RoleMutationFailed {
                    role: inactive.name.clone(),
                    source,
                })?;
            revoked.push(inactive.name.clone());
        }

        info!(%user, node_id, ?granted, ?revoked, "Node verified");

        Ok(Verification {
            record: NodeRecord {
                discord_user_id: Some(user.0.clone()),
                ..record
            },
            granted,
            revoked,
        })
    }
}
