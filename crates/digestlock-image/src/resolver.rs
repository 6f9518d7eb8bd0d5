//! The injected digest-resolution capability.

use std::sync::Arc;

use async_trait::async_trait;
use digestlock_common::error::Result;

/// Resolves an image name and tag to the digest it currently points at.
///
/// Implementations return the hex digest without the `sha256:` prefix.
/// Any retry policy belongs to the implementation; callers never retry.
#[async_trait]
pub trait DigestResolver: Send + Sync {
    /// Resolves `name:tag` to a digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the digest cannot be determined.
    async fn resolve(&self, name: &str, tag: &str) -> Result<String>;
}

#[async_trait]
impl<R: DigestResolver + ?Sized> DigestResolver for Arc<R> {
    async fn resolve(&self, name: &str, tag: &str) -> Result<String> {
        (**self).resolve(name, tag).await
    }
}
