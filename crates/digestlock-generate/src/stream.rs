//! Concurrent parsing of collected paths.
//!
//! One blocking parse task runs per path. Every task sends its images into
//! the shared output channel; a file-level error ends that file's branch
//! and cancels the pipeline.

use std::path::{Path, PathBuf};

use digestlock_common::cancel::{CancelSignal, send_error_and_cancel, send_or_cancelled};
use digestlock_common::error::Result;
use digestlock_image::{AnnotatedImage, FileKind};
use digestlock_parse::dockerfile::BuildArgs;
use digestlock_parse::{compose, dockerfile, kubernetes};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Parses one file of the given format.
///
/// # Errors
///
/// Returns the parser's error for a malformed or unreadable file.
pub fn parse_path(kind: FileKind, path: &Path) -> Result<Vec<AnnotatedImage>> {
    let images = match kind {
        FileKind::Dockerfile => dockerfile::parse_file(path, &BuildArgs::new())?
            .into_iter()
            .map(AnnotatedImage::Dockerfile)
            .collect(),
        FileKind::Composefile => compose::parse_file(path)?
            .into_iter()
            .map(AnnotatedImage::Compose)
            .collect(),
        FileKind::Kubernetesfile => kubernetes::parse_file(path)?
            .into_iter()
            .map(AnnotatedImage::Kubernetes)
            .collect(),
    };
    Ok(images)
}

/// Spawns the parse stage for one format.
///
/// The returned handle completes once every path has been parsed or
/// skipped and all per-file tasks have finished, so `out` is only closed
/// when nothing more can arrive.
pub fn spawn_parsers(
    kind: FileKind,
    mut paths: mpsc::Receiver<Result<PathBuf>>,
    out: mpsc::Sender<Result<AnnotatedImage>>,
    cancel: CancelSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut files = JoinSet::new();
        while let Some(item) = paths.recv().await {
            match item {
                Ok(_) if cancel.is_cancelled() => {}
                Ok(path) => {
                    let _ = files.spawn(parse_one(kind, path, out.clone(), cancel.clone()));
                }
                Err(err) => send_error_and_cancel(&out, err, &cancel).await,
            }
        }
        while let Some(joined) = files.join_next().await {
            if let Err(join) = joined {
                send_error_and_cancel(&out, join.into(), &cancel).await;
            }
        }
        tracing::debug!(kind = %kind, "parse stage finished");
    })
}

async fn parse_one(
    kind: FileKind,
    path: PathBuf,
    out: mpsc::Sender<Result<AnnotatedImage>>,
    cancel: CancelSignal,
) {
    let path_display = path.display().to_string();
    let parsed = tokio::task::spawn_blocking(move || parse_path(kind, &path)).await;
    let parsed = match parsed {
        Ok(result) => result,
        Err(join) => Err(join.into()),
    };
    match parsed {
        Ok(images) => {
            tracing::debug!(kind = %kind, path = %path_display, images = images.len(), "parsed file");
            for image in images {
                if !send_or_cancelled(&out, Ok(image), &cancel).await {
                    return;
                }
            }
        }
        Err(err) => send_error_and_cancel(&out, err, &cancel).await,
    }
}
