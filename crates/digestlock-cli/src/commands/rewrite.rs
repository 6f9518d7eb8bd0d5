//! `dlock rewrite`: Pin the images of every file listed in a lockfile.

use std::path::PathBuf;

use clap::Args;
use digestlock_common::config::RewriteConfig;
use digestlock_common::constants::DEFAULT_LOCKFILE_NAME;
use digestlock_rewrite::Rewriter;

/// Arguments for the `rewrite` command.
#[derive(Args, Debug)]
pub struct RewriteArgs {
    /// Lockfile to read target images from.
    #[arg(long, env = "DIGESTLOCK_LOCKFILE_PATH", default_value = DEFAULT_LOCKFILE_NAME)]
    pub lockfile_path: PathBuf,

    /// Directory for temporary files; defaults to each file's own directory.
    #[arg(long, env = "DIGESTLOCK_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Write `name@sha256:digest` without the tag.
    #[arg(long, env = "DIGESTLOCK_EXCLUDE_TAGS")]
    pub exclude_tags: bool,
}

impl From<RewriteArgs> for RewriteConfig {
    fn from(args: RewriteArgs) -> Self {
        Self {
            lockfile_path: args.lockfile_path,
            temp_dir: args.temp_dir,
            exclude_tags: args.exclude_tags,
        }
    }
}

/// Executes the `rewrite` command.
///
/// # Errors
///
/// Returns an error if the lockfile cannot be read or any file cannot be
/// rewritten.
pub async fn execute(args: RewriteArgs) -> anyhow::Result<()> {
    let rewriter = Rewriter::new(args.into());
    let renamed = rewriter.rewrite().await?;
    for path in &renamed {
        println!("rewrote {}", path.display());
    }
    Ok(())
}
