//! Slash command definitions and parsing.

use serenity::builder::{CreateCommand, CreateCommandOption};
use serenity::model::application::CommandOptionType;

pub const NODE_COMMAND: &str = "node";
pub const CHECKROLES_COMMAND: &str = "checkroles";
pub const NODE_ID_OPTION: &str = "nodeid";

/// A parsed slash command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/node <nodeid>`
    Node { node_id: String },
    /// `/checkroles`
    CheckRoles,
    /// Anything this bot did not register
    Unknown(String),
}

impl Command {
    /// Parse an invocation from its name and string options.
    ///
    /// A `/node` invocation without its option parses as an empty ID,
    /// which validation then rejects.
    pub fn parse<'a>(name: &str, options: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        match name {
            NODE_COMMAND => {
                let node_id = options
                    .into_iter()
                    .find(|(option, _)| *option == NODE_ID_OPTION)
                    .map(|(_, value)| value.to_string())
                    .unwrap_or_default();
                Command::Node { node_id }
            }
            CHECKROLES_COMMAND => Command::CheckRoles,
            other => Command::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Command::Node { .. } => NODE_COMMAND,
            Command::CheckRoles => CHECKROLES_COMMAND,
            Command::Unknown(name) => name,
        }
    }
}

/// Reply for commands this bot does not handle.
pub fn unknown_command_text(name: &str) -> String {
    format!(
        "❓ Unknown command `/{}`. Available commands: `/{} <nodeid>`, `/{}`.",
        name, NODE_COMMAND, CHECKROLES_COMMAND
    )
}

/// Guild command registrations.
pub fn registrations() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new(NODE_COMMAND)
            .description("Verify your node and receive the verified role")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::String,
                    NODE_ID_OPTION,
                    "Your node ID",
                )
                .required(true),
            ),
        CreateCommand::new(CHECKROLES_COMMAND)
            .description("Update your node status roles from recent activity"),
    ]
}
