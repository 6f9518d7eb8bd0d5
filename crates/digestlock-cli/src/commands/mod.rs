//! CLI command definitions and dispatch.

pub mod generate;
pub mod rewrite;
pub mod verify;

use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use digestlock_common::config::RegistryConfig;
use digestlock_common::constants::BIN_NAME;
use digestlock_image::DigestResolver;
use digestlock_image::registry::RegistryResolver;

/// digestlock: pin container images to immutable digests.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, bin_name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Collect images from a directory tree and write a lockfile.
    Generate(generate::GenerateArgs),
    /// Rewrite the files listed in a lockfile to pin their images.
    Rewrite(rewrite::RewriteArgs),
    /// Check that a lockfile still matches its files and registries.
    Verify(verify::VerifyArgs),
}

/// Registry credentials shared by commands that resolve digests.
#[derive(Args, Debug, Clone, Default)]
pub struct RegistryArgs {
    /// Registry user name.
    #[arg(long = "registry-username", env = "DIGESTLOCK_REGISTRY_USERNAME")]
    pub username: Option<String>,

    /// Registry password or token.
    #[arg(
        long = "registry-password",
        env = "DIGESTLOCK_REGISTRY_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,
}

impl RegistryArgs {
    /// Builds the digest resolver for these credentials.
    #[must_use]
    pub fn resolver(self) -> Arc<dyn DigestResolver> {
        Arc::new(RegistryResolver::new(RegistryConfig {
            username: self.username,
            password: self.password,
        }))
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Generate(args) => generate::execute(args).await,
        Command::Rewrite(args) => rewrite::execute(args).await,
        Command::Verify(args) => verify::execute(args).await,
    }
}
