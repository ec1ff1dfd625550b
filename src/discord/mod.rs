//! Discord integration
//!
//! The gatekeeper only sees the `GuildClient` and `Responder` traits;
//! serenity lives behind them in `client` and `bot`.

pub mod bot;
pub mod client;
pub mod commands;
pub mod mock;
pub mod reply;
pub mod traits;

pub use bot::{handle_command, NodegateBot};
pub use client::{InteractionResponder, SerenityGuild};
pub use commands::Command;
pub use mock::{MockGuildClient, MockResponder, RoleMutation};
pub use reply::ReplyObligation;
pub use traits::{
    ActorStanding, GuildClient, GuildError, GuildRef, GuildResult, GuildRole, Responder, RoleRef,
    UserRef,
};
