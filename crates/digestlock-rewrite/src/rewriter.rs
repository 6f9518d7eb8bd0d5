//! The rewrite pipeline façade.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use digestlock_common::cancel::{CancelSignal, send_error_and_cancel, send_or_cancelled};
use digestlock_common::config::RewriteConfig;
use digestlock_common::constants::CHANNEL_CAPACITY;
use digestlock_common::error::{DigestlockError, Result};
use digestlock_common::paths;
use digestlock_image::Lockfile;
use digestlock_parse::dockerfile::BuildArgs;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::preprocess::preprocess;
use crate::rename::commit;
use crate::writer::compose::{self, ComposePlan};
use crate::writer::{WriteJob, WrittenFile};

/// Rewrites the files named in a lockfile to pin their images.
#[derive(Debug, Clone)]
pub struct Rewriter {
    config: RewriteConfig,
}

impl Rewriter {
    /// Creates a rewriter.
    #[must_use]
    pub const fn new(config: RewriteConfig) -> Self {
        Self { config }
    }

    /// Reads the configured lockfile and rewrites every file it lists.
    ///
    /// # Errors
    ///
    /// Returns the first read, consistency, write, or rename error.
    pub async fn rewrite(&self) -> Result<Vec<PathBuf>> {
        let lockfile = Lockfile::read(&self.config.lockfile_path)?;
        self.rewrite_lockfile(lockfile).await
    }

    /// Rewrites every file listed in `lockfile`.
    ///
    /// Either every file is replaced or, when any writer fails, none is.
    /// Returns the replaced paths, sorted.
    ///
    /// # Errors
    ///
    /// Returns the first consistency, write, or rename error.
    pub async fn rewrite_lockfile(&self, mut lockfile: Lockfile) -> Result<Vec<PathBuf>> {
        let working_dir =
            std::env::current_dir().map_err(|e| DigestlockError::io(PathBuf::from("."), e))?;
        let dropped = preprocess(&mut lockfile, &working_dir);
        tracing::info!(
            lockfile = %self.config.lockfile_path.display(),
            images = lockfile.image_count(),
            dropped,
            "rewriting files"
        );

        let jobs = plan(lockfile).await?;
        let cancel = CancelSignal::new();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        for job in jobs {
            drop(tokio::spawn(run_job(
                job,
                self.config.temp_dir.clone(),
                self.config.exclude_tags,
                tx.clone(),
                cancel.clone(),
            )));
        }
        drop(tx);

        commit(rx, &cancel).await
    }
}

/// Turns a preprocessed lockfile into write jobs.
///
/// Compose files are planned concurrently; their build files are then
/// merged by one owner so conflicting targets are caught before anything
/// is written.
async fn plan(lockfile: Lockfile) -> Result<Vec<WriteJob>> {
    let mut jobs: Vec<WriteJob> = lockfile
        .dockerfiles
        .into_iter()
        .map(|(path, images)| WriteJob::Dockerfile {
            path: PathBuf::from(path),
            targets: images.into_iter().map(|i| i.image).collect(),
            build_args: BuildArgs::new(),
        })
        .collect();
    jobs.extend(lockfile.kubernetesfiles.into_iter().map(|(path, images)| {
        WriteJob::Kubernetes {
            path: PathBuf::from(path),
            targets: images.into_iter().map(|i| i.image).collect(),
        }
    }));

    let mut planners = JoinSet::new();
    for (path, images) in lockfile.composefiles {
        let _ = planners.spawn_blocking(move || compose::plan(Path::new(&path), &images));
    }
    let mut plans: Vec<ComposePlan> = Vec::new();
    while let Some(joined) = planners.join_next().await {
        plans.push(joined??);
    }
    // Join order is arbitrary; merge in path order so errors are stable.
    plans.sort_by(|a, b| a.job.path().cmp(b.job.path()));

    let mut service_dockerfiles = Vec::new();
    for plan in plans {
        jobs.push(plan.job);
        service_dockerfiles.extend(plan.dockerfiles);
    }
    jobs.extend(compose::merge_dockerfiles(service_dockerfiles)?);

    let mut seen = HashSet::new();
    for job in &jobs {
        if !seen.insert(paths::clean(job.path())) {
            return Err(DigestlockError::Consistency {
                message: format!("{} would be rewritten twice", job.path().display()),
            });
        }
    }
    Ok(jobs)
}

async fn run_job(
    job: WriteJob,
    temp_dir: Option<PathBuf>,
    exclude_tags: bool,
    tx: mpsc::Sender<Result<WrittenFile>>,
    cancel: CancelSignal,
) {
    if cancel.is_cancelled() {
        return;
    }
    let written =
        tokio::task::spawn_blocking(move || job.run(temp_dir.as_deref(), exclude_tags)).await;
    let written = match written {
        Ok(result) => result,
        Err(join) => Err(join.into()),
    };
    match written {
        Ok(file) => {
            if !send_or_cancelled(&tx, Ok(file.clone()), &cancel).await {
                file.discard();
            }
        }
        Err(err) => send_error_and_cancel(&tx, err, &cancel).await,
    }
}
