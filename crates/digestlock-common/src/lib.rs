//! # digestlock-common
//!
//! Shared error definitions, configuration models, constants, and the
//! pipeline cancellation signal used across the entire digestlock workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the foundational primitives that all other
//! crates build upon.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cancel;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
