//! Role binding and rank checks.
//!
//! Roles are configured by display name or by ID (`id:<snowflake>`). A name
//! is resolved to an ID the first time a guild is seen and the binding is
//! cached, so renaming a role afterwards does not break the bot. A cached
//! binding whose role disappears is re-resolved from configuration.

use super::error::{GateError, GateResult};
use crate::discord::traits::{ActorStanding, GuildClient, GuildRef, GuildRole, RoleRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// How a role is identified in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RoleSpec {
    Id(RoleRef),
    Name(String),
}

impl TryFrom<String> for RoleSpec {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        match raw.strip_prefix("id:") {
            Some(id) => id
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .map(|id| RoleSpec::Id(RoleRef(id)))
                .ok_or_else(|| format!("invalid role id: {:?}", raw)),
            None if raw.trim().is_empty() => Err("role name cannot be empty".to_string()),
            None => Ok(RoleSpec::Name(raw)),
        }
    }
}

impl From<RoleSpec> for String {
    fn from(spec: RoleSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for RoleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleSpec::Id(id) => write!(f, "id:{}", id),
            RoleSpec::Name(name) => write!(f, "{}", name),
        }
    }
}

impl RoleSpec {
    fn find<'a>(&self, catalog: &'a [GuildRole]) -> Option<&'a GuildRole> {
        match self {
            RoleSpec::Id(id) => catalog.iter().find(|r| r.id == *id),
            RoleSpec::Name(name) => {
                let mut matches = catalog.iter().filter(|r| &r.name == name);
                let first = matches.next();
                if first.is_some() && matches.next().is_some() {
                    warn!(role = %name, "Several roles share this name, binding the first");
                }
                first
            }
        }
    }
}

/// Roles the gatekeeper manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSettings {
    /// Primary role granted on verification
    pub verified: RoleSpec,
    /// Status role for nodes seen within the activity window
    pub active: Option<RoleSpec>,
    /// Status role for nodes not seen within the activity window
    pub inactive: Option<RoleSpec>,
}

impl RoleSettings {
    /// Only a primary role, no status roles.
    pub fn verified_only(verified: RoleSpec) -> Self {
        Self {
            verified,
            active: None,
            inactive: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RoleBindings {
    verified: RoleRef,
    active: Option<RoleRef>,
    inactive: Option<RoleRef>,
}

impl RoleBindings {
    fn ids(&self) -> impl Iterator<Item = RoleRef> {
        std::iter::once(self.verified).chain(self.active).chain(self.inactive)
    }
}

/// Roles of one guild with their current positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoles {
    pub verified: GuildRole,
    pub active: Option<GuildRole>,
    pub inactive: Option<GuildRole>,
}

impl ResolvedRoles {
    /// Every role the bot may grant or revoke.
    pub fn managed(&self) -> Vec<&GuildRole> {
        std::iter::once(&self.verified)
            .chain(self.active.as_ref())
            .chain(self.inactive.as_ref())
            .collect()
    }

    /// Status roles only.
    pub fn status_roles(&self) -> Vec<&GuildRole> {
        self.active.iter().chain(self.inactive.iter()).collect()
    }
}

/// Resolves configured roles per guild and caches the bindings.
pub struct RoleResolver {
    settings: RoleSettings,
    bindings: RwLock<HashMap<GuildRef, RoleBindings>>,
}

impl RoleResolver {
    pub fn new(settings: RoleSettings) -> Self {
        Self {
            settings,
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the configured roles in `guild`.
    ///
    /// The catalog is listed on every call (positions change), but names are
    /// only matched when no valid binding is cached for the guild.
    pub async fn resolve<G: GuildClient + ?Sized>(&self, guild: &G) -> GateResult<ResolvedRoles> {
        let catalog = guild
            .roles()
            .await
            .map_err(|e| GateError::guild_lookup("guild roles", e))?;

        let cached = self.bindings.read().await.get(&guild.guild()).copied();
        let bindings = match cached {
            Some(bindings) if bindings.ids().all(|id| catalog.iter().any(|r| r.id == id)) => {
                bindings
            }
            stale => {
                if stale.is_some() {
                    warn!(guild = %guild.guild(), "Bound role disappeared, re-resolving roles");
                }
                let bindings = self.bind(&catalog)?;
                info!(
                    guild = %guild.guild(),
                    verified = %bindings.verified,
                    active = ?bindings.active,
                    inactive = ?bindings.inactive,
                    "Bound node roles"
                );
                self.bindings
                    .write()
                    .await
                    .insert(guild.guild(), bindings);
                bindings
            }
        };

        let lookup = |id: RoleRef| catalog.iter().find(|r| r.id == id).cloned();
        Ok(ResolvedRoles {
            verified: lookup(bindings.verified)
                .ok_or_else(|| GateError::RoleNotConfigured(self.settings.verified.to_string()))?,
            active: bindings.active.and_then(lookup),
            inactive: bindings.inactive.and_then(lookup),
        })
    }

    fn bind(&self, catalog: &[GuildRole]) -> GateResult<RoleBindings> {
        let find = |spec: &RoleSpec| {
            spec.find(catalog)
                .map(|role| role.id)
                .ok_or_else(|| GateError::RoleNotConfigured(spec.to_string()))
        };

        Ok(RoleBindings {
            verified: find(&self.settings.verified)?,
            active: self.settings.active.as_ref().map(find).transpose()?,
            inactive: self.settings.inactive.as_ref().map(find).transpose()?,
        })
    }
}

/// Check that the bot may grant and revoke every role in `roles`.
///
/// Discord only lets a member change roles strictly below its own highest role.
pub fn ensure_manageable(standing: &ActorStanding, roles: &[&GuildRole]) -> GateResult<()> {
    if !standing.can_manage_roles {
        return Err(GateError::MissingPermission);
    }

    match roles
        .iter()
        .find(|role| standing.highest_position <= role.position)
    {
        Some(role) => Err(GateError::InsufficientRank {
            role: role.name.clone(),
        }),
        None => Ok(()),
    }
}
