//! Per-format writers.
//!
//! A writer renders the new content of one file and stores it in a
//! temporary file. Originals are never touched here; the renamer commits
//! temporary files only after the whole batch has been written.

pub mod compose;
pub mod dockerfile;
pub mod kubernetes;

use std::io::Write;
use std::path::{Path, PathBuf};

use digestlock_common::error::{DigestlockError, Result};
use digestlock_image::ImageReference;
use digestlock_parse::dockerfile::BuildArgs;

/// A rewritten file waiting to be renamed over its original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    /// File being replaced.
    pub original_path: PathBuf,
    /// Temporary file holding the new content.
    pub temp_path: PathBuf,
}

impl WrittenFile {
    /// Deletes the temporary file, ignoring a file that is already gone.
    pub fn discard(&self) {
        if let Err(e) = std::fs::remove_file(&self.temp_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.temp_path.display(), error = %e, "failed to remove temporary file");
            }
        }
    }
}

/// One file to rewrite, with everything needed to render it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteJob {
    /// A build file and its ordered target images.
    Dockerfile {
        /// Build file path.
        path: PathBuf,
        /// Targets, one per genuine image slot.
        targets: Vec<ImageReference>,
        /// Arguments used to tell stage references from images.
        build_args: BuildArgs,
    },
    /// A compose file and the targets of its literal-image services.
    Compose {
        /// Compose file path.
        path: PathBuf,
        /// Service name and target, in declaration order.
        targets: Vec<(String, ImageReference)>,
    },
    /// A manifest and its ordered container targets.
    Kubernetes {
        /// Manifest path.
        path: PathBuf,
        /// Targets in document then container order.
        targets: Vec<ImageReference>,
    },
}

impl WriteJob {
    /// Path of the file this job replaces.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Dockerfile { path, .. }
            | Self::Compose { path, .. }
            | Self::Kubernetes { path, .. } => path,
        }
    }

    /// Renders the new content and stores it in a temporary file.
    ///
    /// # Errors
    ///
    /// Returns an error if the original cannot be read, does not match the
    /// targets, or the temporary file cannot be written.
    pub fn run(&self, temp_dir: Option<&Path>, exclude_tags: bool) -> Result<WrittenFile> {
        let path = self.path();
        let content = std::fs::read_to_string(path).map_err(|e| DigestlockError::io(path, e))?;
        let rendered = match self {
            Self::Dockerfile {
                targets, build_args, ..
            } => dockerfile::render(path, &content, targets, build_args, exclude_tags)?,
            Self::Compose { targets, .. } => compose::render(path, &content, targets, exclude_tags)?,
            Self::Kubernetes { targets, .. } => {
                kubernetes::render(path, &content, targets, exclude_tags)?
            }
        };
        let written = write_temp(path, temp_dir, &rendered)?;
        tracing::debug!(
            path = %path.display(),
            temp = %written.temp_path.display(),
            "wrote temporary file"
        );
        Ok(written)
    }
}

/// Writes `content` to a new temporary file for `original`.
///
/// The file lands in `temp_dir`, or next to `original` when unset, and
/// takes over the original's permissions.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created or written.
pub fn write_temp(original: &Path, temp_dir: Option<&Path>, content: &str) -> Result<WrittenFile> {
    let dir = match temp_dir {
        Some(dir) => dir.to_path_buf(),
        None => match original.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    };
    let mut file = tempfile::Builder::new()
        .prefix(".digestlock-")
        .tempfile_in(&dir)
        .map_err(|e| DigestlockError::io(&dir, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| DigestlockError::io(file.path(), e))?;
    if let Ok(metadata) = std::fs::metadata(original) {
        std::fs::set_permissions(file.path(), metadata.permissions())
            .map_err(|e| DigestlockError::io(file.path(), e))?;
    }
    let (_, temp_path) = file
        .keep()
        .map_err(|e| DigestlockError::io(&dir, e.error))?;
    Ok(WrittenFile {
        original_path: original.to_path_buf(),
        temp_path,
    })
}

/// Fails unless a file has exactly as many slots as targets.
pub(crate) fn check_slots(path: &Path, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(DigestlockError::SlotMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        })
    }
}
