//! `dlock verify`: Compare a lockfile against freshly resolved images.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use digestlock_common::config::VerifyConfig;
use digestlock_common::constants::DEFAULT_LOCKFILE_NAME;

use super::RegistryArgs;

/// Arguments for the `verify` command.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Lockfile to verify.
    #[arg(long, env = "DIGESTLOCK_LOCKFILE_PATH", default_value = DEFAULT_LOCKFILE_NAME)]
    pub lockfile_path: PathBuf,

    /// Compare images without their tags.
    #[arg(long, env = "DIGESTLOCK_EXCLUDE_TAGS")]
    pub exclude_tags: bool,

    /// Treat an empty digest in the lockfile as matching any digest.
    #[arg(long, env = "DIGESTLOCK_IGNORE_MISSING_DIGESTS")]
    pub ignore_missing_digests: bool,

    /// Registry credentials.
    #[command(flatten)]
    pub registry: RegistryArgs,
}

/// Executes the `verify` command.
///
/// # Errors
///
/// Returns an error describing the first difference found.
pub async fn execute(args: VerifyArgs) -> anyhow::Result<()> {
    let config = VerifyConfig {
        lockfile_path: args.lockfile_path,
        exclude_tags: args.exclude_tags,
        ignore_missing_digests: args.ignore_missing_digests,
    };
    digestlock_generate::verify(&config, args.registry.resolver())
        .await
        .with_context(|| format!("{} is out of date", config.lockfile_path.display()))?;
    println!("{} is up to date", config.lockfile_path.display());
    Ok(())
}
