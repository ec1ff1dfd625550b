use super::roles::{RoleResolver, RoleSettings};
use crate::store::NodeStore;
use std::sync::Arc;
use std::time::Duration;

/// Node must have checked in this recently to be verified.
pub const DEFAULT_VERIFICATION_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Node must have checked in this recently to keep the active role.
pub const DEFAULT_ACTIVITY_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Freshness windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    pub verification: Duration,
    pub activity: Duration,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            verification: DEFAULT_VERIFICATION_WINDOW,
            activity: DEFAULT_ACTIVITY_WINDOW,
        }
    }
}

/// Gatekeeper configuration
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub roles: RoleSettings,
    pub windows: Windows,
    /// Also sweep holders of the inactive role, so returning nodes are promoted
    pub sweep_inactive: bool,
}

impl GateSettings {
    pub fn new(roles: RoleSettings) -> Self {
        Self {
            roles,
            windows: Windows::default(),
            sweep_inactive: false,
        }
    }
}

/// Links nodes to users and keeps their roles in step with node activity.
///
/// Holds the record store and the role bindings; the guild is passed per
/// call since interactions may come from any guild the bot is in.
pub struct Gatekeeper<S: NodeStore + ?Sized> {
    pub(crate) store: Arc<S>,
    pub(crate) roles: RoleResolver,
    pub(crate) windows: Windows,
    pub(crate) sweep_inactive: bool,
}

impl<S: NodeStore + ?Sized> Gatekeeper<S> {
    pub fn new(store: Arc<S>, settings: GateSettings) -> Self {
        Self {
            store,
            roles: RoleResolver::new(settings.roles),
            windows: settings.windows,
            sweep_inactive: settings.sweep_inactive,
        }
    }
}
