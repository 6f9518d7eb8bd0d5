//! Digest resolution with per-key deduplication.
//!
//! The engine owns the waiting lists. Images already carrying a digest pass
//! straight through. For the rest, the first image seen for a `(name, tag)`
//! key starts exactly one resolver lookup and every image sharing that key
//! waits for its result. Digests are written back once all lookups have
//! finished.

use std::collections::HashMap;
use std::sync::Arc;

use digestlock_common::cancel::CancelSignal;
use digestlock_common::error::{DigestlockError, Result};
use digestlock_image::{AnnotatedImage, DigestResolver};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Deduplication key of an image lacking a digest.
type Key = (String, String);

/// Resolves the digests of a stream of parsed images.
#[derive(Clone)]
pub struct ResolutionEngine {
    resolver: Arc<dyn DigestResolver>,
}

impl std::fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionEngine").finish_non_exhaustive()
    }
}

impl ResolutionEngine {
    /// Creates an engine backed by `resolver`.
    #[must_use]
    pub fn new(resolver: Arc<dyn DigestResolver>) -> Self {
        Self { resolver }
    }

    /// Drains `images`, resolves every missing digest, and returns all
    /// images with digests filled in. Order is not meaningful.
    ///
    /// # Errors
    ///
    /// Fails fast on the first upstream or resolver error, tripping
    /// `cancel`; no partial result is returned.
    pub async fn run(
        &self,
        mut images: mpsc::Receiver<Result<AnnotatedImage>>,
        cancel: &CancelSignal,
    ) -> Result<Vec<AnnotatedImage>> {
        let mut done = Vec::new();
        let mut waiting: HashMap<Key, Vec<AnnotatedImage>> = HashMap::new();
        let mut resolved: HashMap<Key, String> = HashMap::new();
        let mut lookups: JoinSet<(Key, Result<String>)> = JoinSet::new();
        let mut input_open = true;

        while input_open || !lookups.is_empty() {
            tokio::select! {
                item = images.recv(), if input_open => match item {
                    Some(Ok(image)) => self.admit(image, &mut done, &mut waiting, &mut lookups),
                    Some(Err(err)) => {
                        cancel.cancel();
                        return Err(err);
                    }
                    None => input_open = false,
                },
                Some(joined) = lookups.join_next(), if !lookups.is_empty() => {
                    let (key, digest) = joined.inspect_err(|_| cancel.cancel())?;
                    match digest {
                        Ok(digest) => {
                            tracing::debug!(name = %key.0, tag = %key.1, digest = %digest, "resolved digest");
                            let _ = resolved.insert(key, digest);
                        }
                        Err(err) => {
                            cancel.cancel();
                            return Err(err);
                        }
                    }
                }
                else => break,
            }
        }

        // The input closed because a consumer downstream of us vanished or
        // a producer gave up without reporting an error.
        if cancel.is_cancelled() {
            return Err(DigestlockError::Cancelled);
        }

        tracing::info!(
            passthrough = done.len(),
            unique = resolved.len(),
            "digest resolution finished"
        );
        for (key, mut group) in waiting {
            let digest = resolved.remove(&key).ok_or_else(|| DigestlockError::Consistency {
                message: format!("no digest was resolved for {}:{}", key.0, key.1),
            })?;
            for image in &mut group {
                image.image_mut().digest.clone_from(&digest);
            }
            done.append(&mut group);
        }
        Ok(done)
    }

    fn admit(
        &self,
        image: AnnotatedImage,
        done: &mut Vec<AnnotatedImage>,
        waiting: &mut HashMap<Key, Vec<AnnotatedImage>>,
        lookups: &mut JoinSet<(Key, Result<String>)>,
    ) {
        if !image.image().needs_digest() {
            done.push(image);
            return;
        }
        let key = (image.image().name.clone(), image.image().tag.clone());
        let group = waiting.entry(key.clone()).or_insert_with(|| {
            tracing::debug!(name = %key.0, tag = %key.1, "resolving digest");
            let resolver = Arc::clone(&self.resolver);
            let lookup = key.clone();
            let _ = lookups.spawn(async move {
                let digest = resolver.resolve(&lookup.0, &lookup.1).await;
                (lookup, digest)
            });
            Vec::new()
        });
        group.push(image);
    }
}
