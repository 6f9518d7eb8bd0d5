//! Committing temporary files over their originals.
//!
//! Renames start only after every writer of the batch has succeeded. Once
//! started they are best-effort: a failed rename is reported, but renames
//! that already happened are not rolled back.

use std::path::PathBuf;

use digestlock_common::cancel::CancelSignal;
use digestlock_common::error::{DigestlockError, Result};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::writer::WrittenFile;

/// Collects writer results, then renames every temporary file.
///
/// On the first writer error the batch is cancelled, every temporary file
/// already written (or still arriving) is removed, and nothing is renamed.
///
/// # Errors
///
/// Returns the first writer error, or the first rename failure.
pub async fn commit(
    mut results: mpsc::Receiver<Result<WrittenFile>>,
    cancel: &CancelSignal,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    let mut failure = None;
    while let Some(result) = results.recv().await {
        match result {
            Ok(file) if failure.is_some() => file.discard(),
            Ok(file) => written.push(file),
            Err(err) => {
                cancel.cancel();
                if failure.is_none() {
                    failure = Some(err);
                }
            }
        }
    }
    if let Some(err) = failure {
        for file in &written {
            file.discard();
        }
        tracing::debug!(discarded = written.len(), "rewrite aborted before renaming");
        return Err(err);
    }
    if cancel.is_cancelled() {
        for file in &written {
            file.discard();
        }
        return Err(DigestlockError::Cancelled);
    }

    let mut renames = JoinSet::new();
    for file in written {
        let _ = renames.spawn(async move {
            tokio::fs::rename(&file.temp_path, &file.original_path)
                .await
                .map(|()| file.original_path.clone())
                .map_err(|e| {
                    tracing::warn!(
                        path = %file.original_path.display(),
                        temp = %file.temp_path.display(),
                        error = %e,
                        "rename failed; earlier renames are kept"
                    );
                    DigestlockError::io(&file.original_path, e)
                })
        });
    }

    let mut renamed = Vec::new();
    let mut first_error = None;
    while let Some(joined) = renames.join_next().await {
        match joined.map_err(DigestlockError::from).and_then(|r| r) {
            Ok(path) => renamed.push(path),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    if let Some(err) = first_error {
        return Err(err);
    }
    renamed.sort();
    tracing::info!(files = renamed.len(), "renamed rewritten files");
    Ok(renamed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::write_temp;

    #[tokio::test]
    async fn successful_batch_replaces_originals() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, "old a").expect("write");
        std::fs::write(&b, "old b").expect("write");

        let (tx, rx) = mpsc::channel(4);
        tx.send(write_temp(&a, None, "new a")).await.expect("send");
        tx.send(write_temp(&b, None, "new b")).await.expect("send");
        drop(tx);

        let renamed = commit(rx, &CancelSignal::new()).await.expect("commit");
        assert_eq!(renamed, vec![a.clone(), b.clone()]);
        assert_eq!(std::fs::read_to_string(&a).expect("read"), "new a");
        assert_eq!(std::fs::read_to_string(&b).expect("read"), "new b");
        assert_eq!(std::fs::read_dir(dir.path()).expect("ls").count(), 2);
    }

    #[tokio::test]
    async fn failed_batch_renames_nothing_and_cleans_up() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a");
        std::fs::write(&a, "old a").expect("write");

        let (tx, rx) = mpsc::channel(4);
        tx.send(write_temp(&a, None, "new a")).await.expect("send");
        tx.send(Err(DigestlockError::SlotMismatch {
            path: "b".into(),
            expected: 1,
            actual: 2,
        }))
        .await
        .expect("send");
        drop(tx);

        let cancel = CancelSignal::new();
        let err = commit(rx, &cancel).await.unwrap_err();
        assert!(matches!(err, DigestlockError::SlotMismatch { .. }));
        assert!(cancel.is_cancelled());
        assert_eq!(std::fs::read_to_string(&a).expect("read"), "old a");
        assert_eq!(std::fs::read_dir(dir.path()).expect("ls").count(), 1);
    }
}
