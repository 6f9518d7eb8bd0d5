//! Checks that an existing lockfile still matches its files and registries.

use std::collections::BTreeMap;
use std::path::{MAIN_SEPARATOR_STR, Path, PathBuf};
use std::sync::Arc;

use digestlock_common::config::{CollectorConfig, GenerateConfig, VerifyConfig};
use digestlock_common::error::{DigestlockError, Result};
use digestlock_image::{
    ComposeImage, DigestResolver, DockerfileImage, FileKind, ImageReference, KubernetesImage,
    Lockfile,
};

use crate::generator::Generator;

/// Lockfile entries compared field by field.
trait Entry {
    fn reference(&self) -> &ImageReference;
    /// Format-specific fields that must also agree.
    fn owner(&self) -> String;
}

impl Entry for DockerfileImage {
    fn reference(&self) -> &ImageReference {
        &self.image
    }

    fn owner(&self) -> String {
        String::new()
    }
}

impl Entry for ComposeImage {
    fn reference(&self) -> &ImageReference {
        &self.image
    }

    fn owner(&self) -> String {
        format!("service {} {}", self.service_name, self.dockerfile_path)
    }
}

impl Entry for KubernetesImage {
    fn reference(&self) -> &ImageReference {
        &self.image
    }

    fn owner(&self) -> String {
        format!("container {}", self.container_name)
    }
}

/// Regenerates the files listed in the lockfile at `config.lockfile_path`
/// and compares the result against it.
///
/// # Errors
///
/// Returns [`DigestlockError::Consistency`] describing the first
/// difference, or any error from reading or regenerating.
pub async fn verify(config: &VerifyConfig, resolver: Arc<dyn DigestResolver>) -> Result<()> {
    let existing = Lockfile::read(&config.lockfile_path)?;
    let generate = GenerateConfig {
        base_dir: base_dir(&existing),
        lockfile_path: config.lockfile_path.clone(),
        dockerfiles: listed(existing.dockerfiles.keys()),
        composefiles: listed(existing.composefiles.keys()),
        kubernetesfiles: listed(existing.kubernetesfiles.keys()),
    };
    let fresh = Generator::new(generate, resolver)?.generate().await?;
    compare(&existing, &fresh, config)?;
    tracing::info!(
        lockfile = %config.lockfile_path.display(),
        images = existing.image_count(),
        "lockfile verified"
    );
    Ok(())
}

/// Lockfile keys are relative to the working directory, or all absolute
/// when the lockfile was generated from an absolute base directory.
fn base_dir(lockfile: &Lockfile) -> PathBuf {
    let mut keys = lockfile
        .dockerfiles
        .keys()
        .chain(lockfile.composefiles.keys())
        .chain(lockfile.kubernetesfiles.keys())
        .peekable();
    if keys.peek().is_some() && keys.all(|key| Path::new(key).is_absolute()) {
        PathBuf::from(MAIN_SEPARATOR_STR)
    } else {
        PathBuf::from(".")
    }
}

/// A collector that reads exactly `paths`, disabled when there are none.
fn listed<'a>(paths: impl Iterator<Item = &'a String>) -> CollectorConfig {
    let paths: Vec<PathBuf> = paths.map(PathBuf::from).collect();
    CollectorConfig {
        enabled: !paths.is_empty(),
        paths,
        globs: Vec::new(),
        recursive: false,
        default_names: Vec::new(),
    }
}

/// Compares two lockfiles under the verify options.
///
/// # Errors
///
/// Returns [`DigestlockError::Consistency`] on the first difference.
pub fn compare(existing: &Lockfile, fresh: &Lockfile, config: &VerifyConfig) -> Result<()> {
    compare_kind(FileKind::Dockerfile, &existing.dockerfiles, &fresh.dockerfiles, config)?;
    compare_kind(FileKind::Composefile, &existing.composefiles, &fresh.composefiles, config)?;
    compare_kind(
        FileKind::Kubernetesfile,
        &existing.kubernetesfiles,
        &fresh.kubernetesfiles,
        config,
    )
}

fn compare_kind<T: Entry>(
    kind: FileKind,
    existing: &BTreeMap<String, Vec<T>>,
    fresh: &BTreeMap<String, Vec<T>>,
    config: &VerifyConfig,
) -> Result<()> {
    let mismatch = |message: String| DigestlockError::Consistency { message };

    if let Some(path) = fresh.keys().find(|path| !existing.contains_key(*path)) {
        return Err(mismatch(format!("{kind}: {path} is not in the lockfile")));
    }
    for (path, recorded) in existing {
        let Some(current) = fresh.get(path) else {
            return Err(mismatch(format!("{kind}: {path} produced no images")));
        };
        if recorded.len() != current.len() {
            return Err(mismatch(format!(
                "{kind}: {path} has {} image(s) but the lockfile records {}",
                current.len(),
                recorded.len()
            )));
        }
        for (index, (want, got)) in recorded.iter().zip(current).enumerate() {
            if want.owner() != got.owner() || !same_image(want.reference(), got.reference(), config)
            {
                return Err(mismatch(format!(
                    "{kind}: {path} image {index} is {} ({}) but the lockfile records {} ({})",
                    got.reference(),
                    got.owner().trim(),
                    want.reference(),
                    want.owner().trim()
                )));
            }
        }
    }
    Ok(())
}

fn same_image(want: &ImageReference, got: &ImageReference, config: &VerifyConfig) -> bool {
    let tags_match = config.exclude_tags || want.tag == got.tag;
    let digests_match =
        (config.ignore_missing_digests && want.digest.is_empty()) || want.digest == got.digest;
    want.name == got.name && tags_match && digests_match
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lockfile(entries: &[(&str, &str, &str)]) -> Lockfile {
        let mut lockfile = Lockfile::default();
        let images = entries
            .iter()
            .enumerate()
            .map(|(position, (name, tag, digest))| DockerfileImage {
                image: ImageReference::new(*name, *tag, *digest),
                path: "Dockerfile".into(),
                position,
            })
            .collect();
        let _ = lockfile.dockerfiles.insert("Dockerfile".into(), images);
        lockfile
    }

    #[test]
    fn identical_lockfiles_match() {
        let a = lockfile(&[("node", "20", "aa")]);
        assert!(compare(&a, &a.clone(), &VerifyConfig::default()).is_ok());
    }

    #[test]
    fn digest_drift_is_reported() {
        let existing = lockfile(&[("node", "20", "aa")]);
        let fresh = lockfile(&[("node", "20", "bb")]);
        let err = compare(&existing, &fresh, &VerifyConfig::default()).unwrap_err();
        assert!(err.to_string().contains("node:20@sha256:bb"), "got {err}");
    }

    #[test]
    fn missing_digest_can_be_ignored() {
        let existing = lockfile(&[("node", "20", "")]);
        let fresh = lockfile(&[("node", "20", "bb")]);
        assert!(compare(&existing, &fresh, &VerifyConfig::default()).is_err());
        let config = VerifyConfig {
            ignore_missing_digests: true,
            ..VerifyConfig::default()
        };
        assert!(compare(&existing, &fresh, &config).is_ok());
    }

    #[test]
    fn tags_can_be_excluded() {
        let existing = lockfile(&[("node", "", "aa")]);
        let fresh = lockfile(&[("node", "20", "aa")]);
        let config = VerifyConfig {
            exclude_tags: true,
            ..VerifyConfig::default()
        };
        assert!(compare(&existing, &fresh, &config).is_ok());
    }

    #[test]
    fn image_count_difference_is_reported() {
        let existing = lockfile(&[("node", "20", "aa")]);
        let fresh = lockfile(&[("node", "20", "aa"), ("alpine", "3", "cc")]);
        let err = compare(&existing, &fresh, &VerifyConfig::default()).unwrap_err();
        assert!(err.to_string().contains("2 image(s)"), "got {err}");
    }
}
