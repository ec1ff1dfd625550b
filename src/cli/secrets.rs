//! Secret loading for the bot token and the store key.
//!
//! Sources, checked in order:
//! 1. an explicit file (`--token-file`, or `token_file` in the config)
//! 2. an environment variable (warned, meant for containers and testing)
//! 3. a default file next to the config (`token.txt`, `supabase-key.txt`)
//! 4. a masked interactive prompt

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DISCORD_TOKEN_ENV: &str = "NODEGATE_DISCORD_TOKEN";
pub const SUPABASE_KEY_ENV: &str = "NODEGATE_SUPABASE_KEY";

pub const DEFAULT_TOKEN_FILE: &str = "token.txt";
pub const DEFAULT_SUPABASE_KEY_FILE: &str = "supabase-key.txt";

/// Where a secret is read from
#[derive(Debug, PartialEq, Eq)]
pub enum SecretSource {
    /// From a file holding only the secret
    File(PathBuf),
    /// From the named environment variable
    EnvVar(&'static str),
    /// From a stdin prompt (masked input)
    Stdin,
}

/// Pick the source for one secret.
pub fn determine_secret_source(
    explicit_file: Option<PathBuf>,
    env_var: &'static str,
    default_file: &Path,
) -> SecretSource {
    if let Some(file) = explicit_file {
        SecretSource::File(file)
    } else if std::env::var(env_var).is_ok() {
        SecretSource::EnvVar(env_var)
    } else if default_file.exists() {
        SecretSource::File(default_file.to_path_buf())
    } else {
        SecretSource::Stdin
    }
}

/// Read a secret from its source. `label` names it in prompts and errors.
pub fn read_secret(source: SecretSource, label: &str) -> Result<String, Box<dyn std::error::Error>> {
    let secret = match source {
        SecretSource::File(path) => {
            if !path.exists() {
                return Err(format!("{} file not found: {}", label, path.display()).into());
            }

            fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {} file: {}", label, e))?
                .trim()
                .to_string()
        }
        SecretSource::EnvVar(var) => {
            warn!(
                var,
                "Reading {} from the environment; prefer a secret file in production", label
            );
            std::env::var(var).map_err(|_| format!("{} env var not set", var))?
        }
        SecretSource::Stdin => rpassword::prompt_password(format!("Enter {}: ", label))
            .map_err(|e| format!("Failed to read {} from stdin: {}", label, e))?,
    };

    if secret.trim().is_empty() {
        return Err(format!("{} is empty", label).into());
    }

    Ok(secret.trim().to_string())
}
