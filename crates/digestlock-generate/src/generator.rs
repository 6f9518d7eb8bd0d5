//! The generate pipeline façade.

use std::sync::Arc;

use digestlock_common::cancel::CancelSignal;
use digestlock_common::config::{CollectorConfig, GenerateConfig};
use digestlock_common::constants::CHANNEL_CAPACITY;
use digestlock_common::error::{DigestlockError, Result};
use digestlock_image::{DigestResolver, FileKind, Lockfile};
use tokio::sync::mpsc;

use crate::assemble::assemble;
use crate::collect::PathCollector;
use crate::engine::ResolutionEngine;
use crate::stream::spawn_parsers;

/// Collects, parses, resolves, and assembles a lockfile.
#[derive(Debug, Clone)]
pub struct Generator {
    config: GenerateConfig,
    formats: Vec<(FileKind, CollectorConfig)>,
    engine: ResolutionEngine,
}

impl Generator {
    /// Creates a generator. Disabled formats are dropped here, once.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory is not a directory.
    pub fn new(config: GenerateConfig, resolver: Arc<dyn DigestResolver>) -> Result<Self> {
        if !config.base_dir.is_dir() {
            return Err(DigestlockError::Config {
                message: format!("base directory {} does not exist", config.base_dir.display()),
            });
        }
        let formats = [
            (FileKind::Dockerfile, &config.dockerfiles),
            (FileKind::Composefile, &config.composefiles),
            (FileKind::Kubernetesfile, &config.kubernetesfiles),
        ]
        .into_iter()
        .filter(|(_, collector)| collector.enabled)
        .map(|(kind, collector)| (kind, collector.clone()))
        .collect();
        Ok(Self {
            formats,
            engine: ResolutionEngine::new(resolver),
            config,
        })
    }

    /// Returns the configuration the generator was built with.
    #[must_use]
    pub const fn config(&self) -> &GenerateConfig {
        &self.config
    }

    /// Runs the pipeline and returns the lockfile without writing it.
    ///
    /// # Errors
    ///
    /// Returns the first discovery, parse, or resolution error.
    pub async fn generate(&self) -> Result<Lockfile> {
        tracing::info!(
            base_dir = %self.config.base_dir.display(),
            formats = self.formats.len(),
            "generating lockfile"
        );
        let cancel = CancelSignal::new();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let stages: Vec<_> = self
            .formats
            .iter()
            .map(|(kind, collector)| {
                let paths =
                    PathCollector::new(*kind, &self.config.base_dir, collector).spawn(&cancel);
                spawn_parsers(*kind, paths, tx.clone(), cancel.clone())
            })
            .collect();
        drop(tx);

        let resolved = self.engine.run(rx, &cancel).await;
        for stage in stages {
            let joined = stage.await;
            if resolved.is_ok() {
                joined?;
            }
        }
        let lockfile = assemble(resolved?);
        tracing::info!(images = lockfile.image_count(), "lockfile generated");
        Ok(lockfile)
    }

    /// Runs the pipeline and writes the lockfile to the configured path.
    ///
    /// Nothing is written when the pipeline fails.
    ///
    /// # Errors
    ///
    /// Returns the pipeline error or a write failure.
    pub async fn generate_to_file(&self) -> Result<Lockfile> {
        let lockfile = self.generate().await?;
        lockfile.write(&self.config.lockfile_path)?;
        Ok(lockfile)
    }
}
