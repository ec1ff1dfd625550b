//! nodegate - Node-Verified Discord Roles
//!
//! A Discord bot that links community members to the nodes they run and
//! keeps their membership roles in step with node activity.
//!
//! Key principles:
//! - The record store is the source of truth for node activity
//! - One user per node, one node per user
//! - Roles are bound by stable ID, never by display name alone
//! - Every command gets exactly one ephemeral reply

pub mod discord;
pub mod gatekeeper;
pub mod store;
