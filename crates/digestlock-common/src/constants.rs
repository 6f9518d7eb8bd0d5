//! System-wide constants and default file names.

/// Default file name of the generated lockfile.
pub const DEFAULT_LOCKFILE_NAME: &str = "digestlock.json";

/// File names searched for when no explicit Dockerfile paths are given.
pub const DEFAULT_DOCKERFILE_NAMES: &[&str] = &["Dockerfile"];

/// File names searched for when no explicit compose paths are given.
pub const DEFAULT_COMPOSEFILE_NAMES: &[&str] = &[
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

/// File names searched for when no explicit manifest paths are given.
pub const DEFAULT_KUBERNETESFILE_NAMES: &[&str] = &[
    "pod.yml",
    "pod.yaml",
    "deployment.yml",
    "deployment.yaml",
    "job.yml",
    "job.yaml",
];

/// Build file name used when a compose service omits `dockerfile`.
pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Sidecar file holding compose interpolation variables.
pub const DOTENV_FILE: &str = ".env";

/// Tag assumed when an image reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// The empty base image; never carries a tag or digest.
pub const SCRATCH: &str = "scratch";

/// Prefix written in front of a digest in textual image references.
pub const DIGEST_PREFIX: &str = "sha256:";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Capacity of the channels connecting pipeline stages.
pub const CHANNEL_CAPACITY: usize = 64;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "dlock";
