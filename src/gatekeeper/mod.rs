//! Gatekeeper module: node verification and activity roles
//!
//! - Verification: link a node to a member and grant the primary role
//! - Reconciliation: keep active/inactive status roles in step with node activity
//! - Roles: bind configured roles per guild and check the bot may manage them

pub mod error;
pub mod gate;
pub mod identifier;
pub mod reconciliation;
pub mod roles;
pub mod verification;

#[cfg(test)]
mod proptests;

pub use error::{GateError, GateResult};
pub use gate::{
    GateSettings, Gatekeeper, Windows, DEFAULT_ACTIVITY_WINDOW, DEFAULT_VERIFICATION_WINDOW,
};
pub use identifier::{validate_node_id, MAX_NODE_ID_LEN};
pub use reconciliation::{MemberCheck, StatusChange, SweepReport};
pub use roles::{ensure_manageable, ResolvedRoles, RoleResolver, RoleSettings, RoleSpec};
pub use verification::Verification;
