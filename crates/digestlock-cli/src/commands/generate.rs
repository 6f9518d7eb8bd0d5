//! `dlock generate`: Collect images and write a lockfile.

use std::path::PathBuf;

use clap::Args;
use digestlock_common::config::{CollectorConfig, GenerateConfig};
use digestlock_common::constants::DEFAULT_LOCKFILE_NAME;
use digestlock_generate::Generator;

use super::RegistryArgs;

/// Arguments for the `generate` command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Directory every collected file must lie within.
    #[arg(long, env = "DIGESTLOCK_BASE_DIR", default_value = ".")]
    pub base_dir: PathBuf,

    /// Where to write the lockfile.
    #[arg(long, env = "DIGESTLOCK_LOCKFILE_PATH", default_value = DEFAULT_LOCKFILE_NAME)]
    pub lockfile_path: PathBuf,

    /// Explicit Dockerfile paths.
    #[arg(long, env = "DIGESTLOCK_DOCKERFILES", value_delimiter = ',')]
    pub dockerfiles: Vec<PathBuf>,

    /// Glob patterns selecting Dockerfiles.
    #[arg(long, env = "DIGESTLOCK_DOCKERFILE_GLOBS", value_delimiter = ',')]
    pub dockerfile_globs: Vec<String>,

    /// Search the base directory recursively for Dockerfiles.
    #[arg(long, env = "DIGESTLOCK_DOCKERFILE_RECURSIVE")]
    pub dockerfile_recursive: bool,

    /// Skip Dockerfiles entirely.
    #[arg(long, env = "DIGESTLOCK_EXCLUDE_ALL_DOCKERFILES")]
    pub exclude_all_dockerfiles: bool,

    /// Explicit compose file paths.
    #[arg(long, env = "DIGESTLOCK_COMPOSEFILES", value_delimiter = ',')]
    pub composefiles: Vec<PathBuf>,

    /// Glob patterns selecting compose files.
    #[arg(long, env = "DIGESTLOCK_COMPOSEFILE_GLOBS", value_delimiter = ',')]
    pub composefile_globs: Vec<String>,

    /// Search the base directory recursively for compose files.
    #[arg(long, env = "DIGESTLOCK_COMPOSEFILE_RECURSIVE")]
    pub composefile_recursive: bool,

    /// Skip compose files entirely.
    #[arg(long, env = "DIGESTLOCK_EXCLUDE_ALL_COMPOSEFILES")]
    pub exclude_all_composefiles: bool,

    /// Explicit manifest paths.
    #[arg(long, env = "DIGESTLOCK_KUBERNETESFILES", value_delimiter = ',')]
    pub kubernetesfiles: Vec<PathBuf>,

    /// Glob patterns selecting manifests.
    #[arg(long, env = "DIGESTLOCK_KUBERNETESFILE_GLOBS", value_delimiter = ',')]
    pub kubernetesfile_globs: Vec<String>,

    /// Search the base directory recursively for manifests.
    #[arg(long, env = "DIGESTLOCK_KUBERNETESFILE_RECURSIVE")]
    pub kubernetesfile_recursive: bool,

    /// Skip manifests entirely.
    #[arg(long, env = "DIGESTLOCK_EXCLUDE_ALL_KUBERNETESFILES")]
    pub exclude_all_kubernetesfiles: bool,

    /// Registry credentials.
    #[command(flatten)]
    pub registry: RegistryArgs,
}

fn collector(
    defaults: CollectorConfig,
    paths: Vec<PathBuf>,
    globs: Vec<String>,
    recursive: bool,
    excluded: bool,
) -> CollectorConfig {
    CollectorConfig {
        enabled: !excluded,
        paths,
        globs,
        recursive,
        ..defaults
    }
}

impl GenerateArgs {
    fn split(self) -> (GenerateConfig, RegistryArgs) {
        let config = GenerateConfig {
            base_dir: self.base_dir,
            lockfile_path: self.lockfile_path,
            dockerfiles: collector(
                CollectorConfig::dockerfiles(),
                self.dockerfiles,
                self.dockerfile_globs,
                self.dockerfile_recursive,
                self.exclude_all_dockerfiles,
            ),
            composefiles: collector(
                CollectorConfig::composefiles(),
                self.composefiles,
                self.composefile_globs,
                self.composefile_recursive,
                self.exclude_all_composefiles,
            ),
            kubernetesfiles: collector(
                CollectorConfig::kubernetesfiles(),
                self.kubernetesfiles,
                self.kubernetesfile_globs,
                self.kubernetesfile_recursive,
                self.exclude_all_kubernetesfiles,
            ),
        };
        (config, self.registry)
    }
}

/// Executes the `generate` command.
///
/// # Errors
///
/// Returns an error if collection, parsing, resolution, or writing the
/// lockfile fails.
pub async fn execute(args: GenerateArgs) -> anyhow::Result<()> {
    let (config, registry) = args.split();
    let generator = Generator::new(config, registry.resolver())?;
    let lockfile = generator.generate_to_file().await?;
    println!(
        "wrote {} images to {}",
        lockfile.image_count(),
        generator.config().lockfile_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::commands::{Cli, Command};

    fn parse(args: &[&str]) -> super::GenerateArgs {
        let mut argv = vec!["dlock", "generate"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).expect("parse").command {
            Command::Generate(args) => args,
            other => unreachable!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn defaults_enable_every_format() {
        let (config, _) = parse(&[]).split();
        assert!(config.dockerfiles.enabled);
        assert!(config.composefiles.enabled);
        assert!(config.kubernetesfiles.enabled);
        assert!(!config.dockerfiles.has_explicit_paths());
        assert_eq!(config.dockerfiles.default_names, vec!["Dockerfile"]);
    }

    #[test]
    fn per_format_options_are_kept_apart() {
        let (config, _) = parse(&[
            "--dockerfiles",
            "a/Dockerfile,b/Dockerfile",
            "--composefile-recursive",
            "--kubernetesfile-globs",
            "k8s/*.yaml",
            "--exclude-all-composefiles",
        ])
        .split();
        assert_eq!(config.dockerfiles.paths.len(), 2);
        assert!(config.composefiles.recursive);
        assert!(!config.composefiles.enabled);
        assert_eq!(config.kubernetesfiles.globs, vec!["k8s/*.yaml"]);
        assert!(!config.kubernetesfiles.recursive);
    }
}
