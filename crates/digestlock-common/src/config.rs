//! Configuration models for the generate, rewrite, and verify pipelines.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// How one file format discovers its candidate paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Whether this format takes part in generation at all.
    pub enabled: bool,
    /// Explicit paths, relative to the base directory.
    pub paths: Vec<PathBuf>,
    /// Glob patterns, relative to the base directory.
    pub globs: Vec<String>,
    /// Walk the base directory for default-named files.
    pub recursive: bool,
    /// File names considered when no explicit paths or globs are given.
    pub default_names: Vec<String>,
}

impl CollectorConfig {
    fn with_defaults(names: &[&str]) -> Self {
        Self {
            enabled: true,
            paths: Vec::new(),
            globs: Vec::new(),
            recursive: false,
            default_names: names.iter().map(|n| (*n).to_string()).collect(),
        }
    }

    /// Collector defaults for Dockerfiles.
    #[must_use]
    pub fn dockerfiles() -> Self {
        Self::with_defaults(constants::DEFAULT_DOCKERFILE_NAMES)
    }

    /// Collector defaults for compose files.
    #[must_use]
    pub fn composefiles() -> Self {
        Self::with_defaults(constants::DEFAULT_COMPOSEFILE_NAMES)
    }

    /// Collector defaults for orchestrator manifests.
    #[must_use]
    pub fn kubernetesfiles() -> Self {
        Self::with_defaults(constants::DEFAULT_KUBERNETESFILE_NAMES)
    }

    /// Returns whether explicit paths or globs were supplied.
    #[must_use]
    pub fn has_explicit_paths(&self) -> bool {
        !self.paths.is_empty() || !self.globs.is_empty()
    }
}

/// Options for the generate pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Directory every collected path must lie within.
    pub base_dir: PathBuf,
    /// Where the lockfile is written.
    pub lockfile_path: PathBuf,
    /// Dockerfile discovery.
    pub dockerfiles: CollectorConfig,
    /// Compose file discovery.
    pub composefiles: CollectorConfig,
    /// Orchestrator manifest discovery.
    pub kubernetesfiles: CollectorConfig,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            lockfile_path: PathBuf::from(constants::DEFAULT_LOCKFILE_NAME),
            dockerfiles: CollectorConfig::dockerfiles(),
            composefiles: CollectorConfig::composefiles(),
            kubernetesfiles: CollectorConfig::kubernetesfiles(),
        }
    }
}

/// Options for the rewrite pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Lockfile to read target images from.
    pub lockfile_path: PathBuf,
    /// Directory for temporary files; next to each original when unset.
    pub temp_dir: Option<PathBuf>,
    /// Write `name@sha256:digest` without the tag.
    pub exclude_tags: bool,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            lockfile_path: PathBuf::from(constants::DEFAULT_LOCKFILE_NAME),
            temp_dir: None,
            exclude_tags: false,
        }
    }
}

/// Options for comparing an existing lockfile against a fresh one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyConfig {
    /// Lockfile to verify.
    pub lockfile_path: PathBuf,
    /// Compare images without their tags.
    pub exclude_tags: bool,
    /// Accept an empty digest in the existing lockfile as matching any digest.
    pub ignore_missing_digests: bool,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            lockfile_path: PathBuf::from(constants::DEFAULT_LOCKFILE_NAME),
            exclude_tags: false,
            ignore_missing_digests: false,
        }
    }
}

/// Credentials for the registry digest resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry user name.
    pub username: Option<String>,
    /// Registry password or access token.
    pub password: Option<String>,
}
