//! # digestlock-image
//!
//! Image-level primitives shared by the generate and rewrite pipelines.
//!
//! Handles:
//! - **Reference**: Parsing and formatting of `name[:tag][@digest]` strings.
//! - **Annotated**: Image references carrying per-format positional metadata.
//! - **Lockfile**: The persisted, pinned-digest output and its JSON codec.
//! - **Resolver**: The injected name+tag to digest capability.
//! - **Registry**: A registry-backed implementation of that capability.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod annotated;
pub mod lockfile;
pub mod reference;
pub mod registry;
pub mod resolver;

pub use annotated::{AnnotatedImage, ComposeImage, DockerfileImage, FileKind, KubernetesImage};
pub use lockfile::Lockfile;
pub use reference::ImageReference;
pub use resolver::DigestResolver;
