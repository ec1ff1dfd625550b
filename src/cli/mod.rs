use clap::{Parser, Subcommand};

pub mod check_node;
pub mod config;
pub mod init_config;
pub mod run;
pub mod secrets;
pub mod services;
pub mod sweep;
pub mod version;

#[derive(Parser)]
#[command(name = "nodegate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discord bot that verifies node operators and tracks node activity", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the bot service
    Run {
        /// Path to config file (default: ~/.local/share/nodegate/config.toml)
        #[arg(long)]
        config: Option<String>,

        /// Path to file containing the Discord bot token
        #[arg(long)]
        token_file: Option<String>,

        /// Path to file containing the Supabase service key
        #[arg(long)]
        store_key_file: Option<String>,
    },

    /// Run one activity sweep over the guild and exit
    Sweep {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,

        /// Path to file containing the Discord bot token
        #[arg(long)]
        token_file: Option<String>,

        /// Path to file containing the Supabase service key
        #[arg(long)]
        store_key_file: Option<String>,
    },

    /// Show the latest record for a node ID
    CheckNode {
        /// Node ID to look up
        node_id: String,

        /// Path to config file
        #[arg(long)]
        config: Option<String>,

        /// Path to file containing the Supabase service key
        #[arg(long)]
        store_key_file: Option<String>,
    },

    /// Write a default config file
    InitConfig {
        /// Path to config file
        #[arg(long)]
        config: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Display version information
    Version,
}

pub async fn execute(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run {
            config,
            token_file,
            store_key_file,
        } => run::execute(config, token_file, store_key_file).await,
        Commands::Sweep {
            config,
            token_file,
            store_key_file,
        } => sweep::execute(config, token_file, store_key_file).await,
        Commands::CheckNode {
            node_id,
            config,
            store_key_file,
        } => check_node::execute(node_id, config, store_key_file).await,
        Commands::InitConfig { config, force } => init_config::execute(config, force),
        Commands::Version => {
            version::execute();
            Ok(())
        }
    }
}
