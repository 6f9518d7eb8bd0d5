//! Candidate path discovery for one file format.
//!
//! Each discovery method runs as its own task. Results flow into a single
//! aggregating task that owns the deduplication set and forwards every
//! distinct path downstream.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use digestlock_common::cancel::{CancelSignal, send_error_and_cancel, send_or_cancelled};
use digestlock_common::config::CollectorConfig;
use digestlock_common::constants::CHANNEL_CAPACITY;
use digestlock_common::error::{DigestlockError, Result};
use digestlock_common::paths;
use digestlock_image::FileKind;
use tokio::sync::mpsc;
use walkdir::WalkDir;

/// A discovered path and its canonical form, used as the dedup key.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    path: PathBuf,
    canonical: PathBuf,
}

/// One way of finding candidate paths.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Method {
    Manual(Vec<PathBuf>),
    Glob(Vec<String>),
    Recursive(Vec<String>),
    Default(Vec<String>),
}

impl Method {
    const fn label(&self) -> &'static str {
        match self {
            Self::Manual(_) => "manual",
            Self::Glob(_) => "glob",
            Self::Recursive(_) => "recursive",
            Self::Default(_) => "default",
        }
    }

    /// Runs the method to completion. Blocking; call from a blocking task.
    fn discover(&self, base_dir: &Path, cancel: &CancelSignal) -> Result<Vec<Candidate>> {
        let canonical_base = base_dir
            .canonicalize()
            .map_err(|e| DigestlockError::io(base_dir, e))?;
        let found: Vec<PathBuf> = match self {
            Self::Manual(paths) => paths.iter().map(|p| base_dir.join(p)).collect(),
            Self::Glob(patterns) => expand_globs(base_dir, patterns)?,
            Self::Recursive(names) => walk(base_dir, names, cancel)?,
            Self::Default(names) => names
                .iter()
                .map(|name| base_dir.join(name))
                .filter(|path| path.is_file())
                .collect(),
        };
        found
            .into_iter()
            .map(|path| validate(&path, base_dir, &canonical_base))
            .collect()
    }
}

/// Ensures `path` lies within the base directory once symlinks and `..`
/// are resolved.
fn validate(path: &Path, base_dir: &Path, canonical_base: &Path) -> Result<Candidate> {
    let path = paths::clean(path);
    let canonical = path
        .canonicalize()
        .map_err(|e| DigestlockError::io(&path, e))?;
    if !canonical.starts_with(canonical_base) {
        return Err(DigestlockError::OutsideBaseDir {
            path,
            base_dir: base_dir.to_path_buf(),
        });
    }
    Ok(Candidate { path, canonical })
}

/// Patterns are relative to `base_dir`, whose own name is matched literally.
fn expand_globs(base_dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let base = glob::Pattern::escape(&paths::to_slash(base_dir));
    let mut found = Vec::new();
    for pattern in patterns {
        let joined = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            format!("{}/{pattern}", base.trim_end_matches('/'))
        };
        let entries = glob::glob(&joined).map_err(|e| DigestlockError::Glob {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        for entry in entries {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                DigestlockError::io(path, e.into_error())
            })?;
            if path.is_file() {
                found.push(path);
            }
        }
    }
    Ok(found)
}

fn walk(base_dir: &Path, names: &[String], cancel: &CancelSignal) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(base_dir).sort_by_file_name() {
        if cancel.is_cancelled() {
            break;
        }
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| base_dir.to_path_buf(), Path::to_path_buf);
            DigestlockError::io(path, e.into())
        })?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|file| names.iter().any(|name| name.as_str() == file));
        if matches && entry.file_type().is_file() {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// Discovers the paths of one format inside a base directory.
#[derive(Debug, Clone)]
pub struct PathCollector {
    kind: FileKind,
    base_dir: PathBuf,
    methods: Vec<Method>,
}

impl PathCollector {
    /// Chooses discovery methods from `config`.
    ///
    /// Explicit paths and globs win; recursion is only used without them,
    /// and the default-name check only when recursion is off too.
    #[must_use]
    pub fn new(kind: FileKind, base_dir: impl Into<PathBuf>, config: &CollectorConfig) -> Self {
        let methods = if config.has_explicit_paths() {
            let mut methods = Vec::new();
            if !config.paths.is_empty() {
                methods.push(Method::Manual(config.paths.clone()));
            }
            if !config.globs.is_empty() {
                methods.push(Method::Glob(config.globs.clone()));
            }
            methods
        } else if config.recursive {
            vec![Method::Recursive(config.default_names.clone())]
        } else {
            vec![Method::Default(config.default_names.clone())]
        };
        Self {
            kind,
            base_dir: base_dir.into(),
            methods,
        }
    }

    /// Starts discovery and returns the stream of distinct paths.
    ///
    /// A discovery error is delivered as the stream's last item and trips
    /// `cancel`; a tripped signal stops every method task.
    pub fn spawn(self, cancel: &CancelSignal) -> mpsc::Receiver<Result<PathBuf>> {
        let (found_tx, found_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);

        for method in self.methods {
            let tx = found_tx.clone();
            let cancel = cancel.clone();
            let base_dir = self.base_dir.clone();
            let kind = self.kind;
            drop(tokio::spawn(async move {
                tracing::debug!(kind = %kind, method = method.label(), "discovering paths");
                let blocking_cancel = cancel.clone();
                let result =
                    tokio::task::spawn_blocking(move || method.discover(&base_dir, &blocking_cancel))
                        .await;
                let result = match result {
                    Ok(result) => result,
                    Err(join) => Err(join.into()),
                };
                match result {
                    Ok(candidates) => {
                        for candidate in candidates {
                            if !send_or_cancelled(&tx, Ok(candidate), &cancel).await {
                                return;
                            }
                        }
                    }
                    Err(err) => send_error_and_cancel(&tx, err, &cancel).await,
                }
            }));
        }
        drop(found_tx);

        drop(tokio::spawn(aggregate(self.kind, found_rx, out_tx, cancel.clone())));
        out_rx
    }
}

async fn aggregate(
    kind: FileKind,
    mut found: mpsc::Receiver<Result<Candidate>>,
    out: mpsc::Sender<Result<PathBuf>>,
    cancel: CancelSignal,
) {
    let mut seen = HashSet::new();
    while let Some(item) = found.recv().await {
        match item {
            Ok(candidate) => {
                if cancel.is_cancelled() || !seen.insert(candidate.canonical) {
                    continue;
                }
                tracing::debug!(kind = %kind, path = %candidate.path.display(), "collected path");
                let _ = send_or_cancelled(&out, Ok(candidate.path), &cancel).await;
            }
            Err(err) => send_error_and_cancel(&out, err, &cancel).await,
        }
    }
    tracing::debug!(kind = %kind, paths = seen.len(), "path collection finished");
}
