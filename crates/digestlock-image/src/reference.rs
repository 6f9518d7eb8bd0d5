//! Image reference grammar.
//!
//! An image line has the shape `name[:tag][@sha256:digest]`. The name may
//! carry a registry host with a port (`localhost:5000/app`), so a `:` only
//! counts as the tag separator when no `/` follows it.

use std::fmt;

use digestlock_common::constants::{DEFAULT_TAG, DIGEST_PREFIX, SCRATCH};
use serde::{Deserialize, Serialize};

/// A parsed image reference.
///
/// Empty strings mean "absent"; this matches the lockfile wire format where
/// `scratch` is recorded as `{"name": "scratch", "tag": "", "digest": ""}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageReference {
    /// Repository name, including any registry host.
    pub name: String,
    /// Tag, or empty.
    #[serde(default)]
    pub tag: String,
    /// Hex digest without the `sha256:` prefix, or empty.
    #[serde(default)]
    pub digest: String,
}

impl ImageReference {
    /// Creates a reference from its parts, enforcing the `scratch` invariant.
    pub fn new(name: impl Into<String>, tag: impl Into<String>, digest: impl Into<String>) -> Self {
        let name = name.into();
        if name == SCRATCH {
            return Self::scratch();
        }
        Self {
            name,
            tag: tag.into(),
            digest: strip_digest_prefix(&digest.into()).to_string(),
        }
    }

    /// The empty base image.
    #[must_use]
    pub fn scratch() -> Self {
        Self {
            name: SCRATCH.to_string(),
            tag: String::new(),
            digest: String::new(),
        }
    }

    /// Parses an image line.
    ///
    /// Scans left to right: each `:` moves the candidate tag separator, each
    /// `/` clears it, and the first `@` ends the scan as the digest separator.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        let mut tag_sep = None;
        let mut digest_sep = None;

        for (idx, ch) in line.char_indices() {
            match ch {
                ':' => tag_sep = Some(idx),
                '/' => tag_sep = None,
                '@' => {
                    digest_sep = Some(idx);
                    break;
                }
                _ => {}
            }
        }

        let reference = match (tag_sep, digest_sep) {
            (Some(t), Some(d)) => Self {
                name: line[..t].to_string(),
                tag: line[t + 1..d].to_string(),
                digest: strip_digest_prefix(&line[d + 1..]).to_string(),
            },
            (Some(t), None) => Self {
                name: line[..t].to_string(),
                tag: line[t + 1..].to_string(),
                digest: String::new(),
            },
            (None, Some(d)) => Self {
                name: line[..d].to_string(),
                tag: String::new(),
                digest: strip_digest_prefix(&line[d + 1..]).to_string(),
            },
            (None, None) => Self {
                name: line.to_string(),
                tag: DEFAULT_TAG.to_string(),
                digest: String::new(),
            },
        };

        if reference.name == SCRATCH {
            return Self::scratch();
        }
        reference
    }

    /// Returns whether this is the `scratch` base image.
    #[must_use]
    pub fn is_scratch(&self) -> bool {
        self.name == SCRATCH
    }

    /// Returns whether the reference still needs a digest from a resolver.
    #[must_use]
    pub fn needs_digest(&self) -> bool {
        self.digest.is_empty() && !self.is_scratch()
    }

    /// Formats the reference, optionally dropping the tag when pinned by digest.
    #[must_use]
    pub fn to_image_line(&self, exclude_tag: bool) -> String {
        let mut line = self.name.clone();
        if !self.tag.is_empty() && !(exclude_tag && !self.digest.is_empty()) {
            line.push(':');
            line.push_str(&self.tag);
        }
        if !self.digest.is_empty() {
            line.push('@');
            if !self.digest.contains(':') {
                line.push_str(DIGEST_PREFIX);
            }
            line.push_str(&self.digest);
        }
        line
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_image_line(false))
    }
}

fn strip_digest_prefix(digest: &str) -> &str {
    digest.strip_prefix(DIGEST_PREFIX).unwrap_or(digest)
}
