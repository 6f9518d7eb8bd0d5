//! # digestlock-rewrite
//!
//! The rewrite pipeline: from a lockfile back to pinned descriptor files.
//!
//! Handles:
//! - **Preprocess**: Drops build files that compose services rewrite instead.
//! - **Writers**: Per-format substitution into temporary files.
//! - **Rename**: All-or-nothing commit of the batch, best-effort once started.
//!
//! Writers run concurrently and share one cancellation signal. A failing
//! writer aborts the batch before any original is replaced.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod preprocess;
pub mod rename;
pub mod rewriter;
pub mod writer;

pub use rewriter::Rewriter;
pub use writer::WrittenFile;
