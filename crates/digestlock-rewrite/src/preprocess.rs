//! Lockfile preprocessing before rewriting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use digestlock_common::paths;
use digestlock_image::Lockfile;

/// Normalizes a lockfile path relative to `working_dir`.
fn normalize(path: &str, working_dir: &Path) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        paths::relative_to(path, working_dir)
    } else {
        paths::clean(path)
    }
}

/// Drops build files that compose services also reference.
///
/// Such a build file is rewritten through its compose service only, with
/// that service's build arguments, so it is never targeted twice.
/// Returns the number of dropped entries.
pub fn preprocess(lockfile: &mut Lockfile, working_dir: &Path) -> usize {
    let referenced: HashSet<PathBuf> = lockfile
        .composefiles
        .values()
        .flatten()
        .filter(|image| !image.dockerfile_path.is_empty())
        .map(|image| normalize(&image.dockerfile_path, working_dir))
        .collect();

    let before = lockfile.dockerfiles.len();
    lockfile.dockerfiles.retain(|path, _| {
        let keep = !referenced.contains(&normalize(path, working_dir));
        if !keep {
            tracing::debug!(path = %path, "build file is rewritten through compose");
        }
        keep
    });
    before - lockfile.dockerfiles.len()
}
