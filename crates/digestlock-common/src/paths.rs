//! Lexical path helpers shared by discovery, parsing, and rewriting.

use std::path::{Component, Path, PathBuf};

/// Normalizes a path without touching the filesystem.
///
/// Drops `.` components and folds `..` into a preceding normal component.
/// Leading `..` components of a relative path are kept.
#[must_use]
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    let _ = out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Renders a path with forward slashes, as recorded in the lockfile.
#[must_use]
pub fn to_slash(path: &Path) -> String {
    let rendered = path.to_string_lossy().into_owned();
    if cfg!(windows) {
        rendered.replace('\\', "/")
    } else {
        rendered
    }
}

/// Expresses `path` relative to `base` when it lies under it.
///
/// Both sides are cleaned first; a path outside `base` is returned cleaned
/// but otherwise unchanged.
#[must_use]
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = clean(path);
    let base = clean(base);
    path.strip_prefix(&base)
        .map_or_else(|_| path.clone(), clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_drops_current_dir() {
        assert_eq!(clean(Path::new("./a/./b")), PathBuf::from("a/b"));
    }

    #[test]
    fn clean_folds_parent_dir() {
        assert_eq!(clean(Path::new("a/b/../c")), PathBuf::from("a/c"));
        assert_eq!(clean(Path::new("a/..")), PathBuf::from("."));
    }

    #[test]
    fn clean_keeps_leading_parent_dir() {
        assert_eq!(clean(Path::new("../a")), PathBuf::from("../a"));
        assert_eq!(clean(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn clean_never_climbs_above_root() {
        assert_eq!(clean(Path::new("/../a")), PathBuf::from("/a"));
    }

    #[test]
    fn relative_to_strips_base() {
        assert_eq!(
            relative_to(Path::new("/work/app/Dockerfile"), Path::new("/work")),
            PathBuf::from("app/Dockerfile")
        );
        assert_eq!(
            relative_to(Path::new("/other/Dockerfile"), Path::new("/work")),
            PathBuf::from("/other/Dockerfile")
        );
    }

    #[test]
    fn to_slash_keeps_unix_separators() {
        assert_eq!(to_slash(Path::new("a/b/Dockerfile")), "a/b/Dockerfile");
    }
}
