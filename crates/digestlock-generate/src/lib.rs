//! # digestlock-generate
//!
//! The generate pipeline: from a base directory to a pinned lockfile.
//!
//! Handles:
//! - **Collect**: Per-format path discovery (manual, glob, recursive, default).
//! - **Stream**: One concurrent parse task per discovered file.
//! - **Engine**: Digest resolution, at most one lookup per `(name, tag)`.
//! - **Assemble**: Deterministic grouping and ordering into a [`Lockfile`].
//! - **Verify**: Regeneration of an existing lockfile and comparison.
//!
//! Stages are connected by bounded channels and share one cancellation
//! signal per run. The first fatal error cancels every sibling task and is
//! the only error returned.
//!
//! [`Lockfile`]: digestlock_image::Lockfile

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod assemble;
pub mod collect;
pub mod engine;
pub mod generator;
pub mod stream;
pub mod verify;

pub use generator::Generator;
pub use verify::verify;
