//! # digestlock-parse
//!
//! Locates image references in the three supported descriptor formats.
//!
//! Handles:
//! - **Dockerfile**: Lexing, instruction model, and stage-aware image slots.
//! - **Compose**: `.env` loading, interpolation, services, and build files.
//! - **Kubernetes**: Multi-document decoding and container discovery.
//!
//! The parsers are synchronous and side-effect free apart from reading the
//! files they are pointed at; the generate pipeline drives them concurrently.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod compose;
pub mod dockerfile;
pub mod interpolate;
pub mod kubernetes;
