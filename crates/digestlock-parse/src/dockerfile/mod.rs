//! Dockerfile instruction model and image discovery.
//!
//! Only `ARG` (before the first stage) and `FROM` matter for image
//! discovery. A `FROM` naming an earlier stage is a stage reference, not an
//! image to pull, and does not produce a slot.

pub mod lexer;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;
use std::path::Path;

use digestlock_common::error::{DigestlockError, Result};
use digestlock_common::paths;
use digestlock_image::{DockerfileImage, ImageReference};

use self::lexer::RawInstruction;
use crate::interpolate;

/// Build arguments supplied by a caller, e.g. a compose service.
pub type BuildArgs = BTreeMap<String, String>;

/// A genuine image reference inside a Dockerfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSlot {
    /// The reference after build-argument expansion.
    pub image: ImageReference,
    /// Byte range of the unexpanded image word in the source.
    pub span: Range<usize>,
    /// One-based line of the `FROM` instruction.
    pub line: usize,
}

/// A tokenized Dockerfile.
#[derive(Debug, Clone)]
pub struct Dockerfile {
    instructions: Vec<RawInstruction>,
}

impl Dockerfile {
    /// Tokenizes Dockerfile source text.
    #[must_use]
    pub fn parse(content: &str) -> Self {
        Self {
            instructions: lexer::tokenize(content),
        }
    }

    /// Locates every genuine image reference, in order of appearance.
    ///
    /// `${VAR}` references resolve against `build_args` first, then against
    /// `ARG` defaults declared before the first `FROM`, else to empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a `FROM` has no image or expands to nothing.
    pub fn image_slots(&self, path: &Path, build_args: &BuildArgs) -> Result<Vec<ImageSlot>> {
        let mut global_args: HashMap<String, String> = HashMap::new();
        let mut stages: HashSet<String> = HashSet::new();
        let mut seen_from = false;
        let mut slots = Vec::new();

        for instruction in &self.instructions {
            match instruction.keyword.as_str() {
                "ARG" if !seen_from => {
                    for word in &instruction.args {
                        if let (key, Some(value)) = split_arg(&word.text) {
                            let _ = global_args.insert(key.to_string(), value);
                        }
                    }
                }
                "FROM" => {
                    seen_from = true;
                    let mut words = instruction
                        .args
                        .iter()
                        .skip_while(|w| w.text.starts_with("--"));
                    let image_word = words.next().ok_or_else(|| {
                        DigestlockError::parse(
                            path,
                            format!("line {}: FROM has no image", instruction.line),
                        )
                    })?;
                    let stage_name = match (words.next(), words.next()) {
                        (Some(keyword), Some(name)) if keyword.text.eq_ignore_ascii_case("as") => {
                            Some(name.text.to_ascii_lowercase())
                        }
                        _ => None,
                    };

                    let lookup = |key: &str| {
                        build_args
                            .get(key)
                            .or_else(|| global_args.get(key))
                            .cloned()
                    };
                    let resolved = interpolate::expand(unquote(&image_word.text), &lookup, false);
                    if resolved.trim().is_empty() {
                        return Err(DigestlockError::parse(
                            path,
                            format!(
                                "line {}: FROM {} expands to an empty image",
                                instruction.line, image_word.text
                            ),
                        ));
                    }

                    if stages.contains(&resolved.to_ascii_lowercase()) {
                        tracing::trace!(stage = %resolved, "skipping reference to earlier stage");
                    } else {
                        slots.push(ImageSlot {
                            image: ImageReference::parse(&resolved),
                            span: image_word.span.clone(),
                            line: instruction.line,
                        });
                    }
                    if let Some(name) = stage_name {
                        let _ = stages.insert(name);
                    }
                }
                _ => {}
            }
        }

        Ok(slots)
    }
}

/// Splits an `ARG` word into its key and optional unquoted default.
fn split_arg(word: &str) -> (&str, Option<String>) {
    match word.split_once('=') {
        Some((key, value)) => (key, Some(unquote(value).to_string())),
        None => (word, None),
    }
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Extracts the images of Dockerfile source text.
///
/// # Errors
///
/// Returns an error if an image instruction is malformed.
pub fn images_from_str(
    path: &Path,
    content: &str,
    build_args: &BuildArgs,
) -> Result<Vec<DockerfileImage>> {
    let path_str = paths::to_slash(path);
    let images = Dockerfile::parse(content)
        .image_slots(path, build_args)?
        .into_iter()
        .enumerate()
        .map(|(position, slot)| DockerfileImage {
            image: slot.image,
            path: path_str.clone(),
            position,
        })
        .collect();
    Ok(images)
}

/// Reads a Dockerfile and extracts its images.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is malformed.
pub fn parse_file(path: &Path, build_args: &BuildArgs) -> Result<Vec<DockerfileImage>> {
    tracing::debug!(path = %path.display(), "parsing Dockerfile");
    let content = std::fs::read_to_string(path).map_err(|e| DigestlockError::io(path, e))?;
    images_from_str(path, &content, build_args)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(images: &[DockerfileImage]) -> Vec<String> {
        images.iter().map(|i| i.image.to_string()).collect()
    }

    fn parse(content: &str) -> Vec<DockerfileImage> {
        images_from_str(Path::new("Dockerfile"), content, &BuildArgs::new()).expect("parse")
    }

    #[test]
    fn two_images_in_declared_order() {
        let images = parse("FROM ubuntu:bionic\nFROM node\n");
        assert_eq!(names(&images), vec!["ubuntu:bionic", "node:latest"]);
        assert_eq!(images[0].position, 0);
        assert_eq!(images[1].position, 1);
        assert_eq!(images[1].path, "Dockerfile");
    }

    #[test]
    fn earlier_stage_reference_is_not_an_image() {
        let images = parse("FROM busybox AS base\nFROM base\nFROM golang\n");
        assert_eq!(names(&images), vec!["busybox:latest", "golang:latest"]);
        assert_eq!(images[1].position, 1);
    }

    #[test]
    fn stage_names_compare_case_insensitively() {
        let images = parse("FROM alpine AS Builder\nFROM builder\n");
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn later_stage_name_does_not_hide_earlier_image() {
        let images = parse("FROM golang\nFROM alpine AS golang\n");
        assert_eq!(names(&images), vec!["golang:latest", "alpine:latest"]);
    }

    #[test]
    fn global_arg_defaults_expand() {
        let images = parse("ARG IMAGE=\"python\"\nARG TAG=3.12\nFROM ${IMAGE}:$TAG\n");
        assert_eq!(names(&images), vec!["python:3.12"]);
    }

    #[test]
    fn build_args_take_precedence_over_defaults() {
        let mut args = BuildArgs::new();
        let _ = args.insert("TAG".into(), "3.11".into());
        let images = images_from_str(
            Path::new("Dockerfile"),
            "ARG TAG=3.12\nFROM python:${TAG}\n",
            &args,
        )
        .expect("parse");
        assert_eq!(names(&images), vec!["python:3.11"]);
    }

    #[test]
    fn args_after_first_from_are_not_global() {
        let images = parse("FROM alpine\nARG TAG=1\nFROM node:${TAG:-lts}\n");
        assert_eq!(names(&images), vec!["alpine:latest", "node:lts"]);
    }

    #[test]
    fn stage_reference_through_build_arg_is_skipped() {
        let mut args = BuildArgs::new();
        let _ = args.insert("BASE".into(), "build".into());
        let images = images_from_str(
            Path::new("Dockerfile"),
            "FROM golang AS build\nFROM ${BASE}\n",
            &args,
        )
        .expect("parse");
        assert_eq!(images.len(), 1);
    }

    #[test]
    fn platform_flag_is_skipped() {
        let images = parse("FROM --platform=$BUILDPLATFORM golang:1.21 AS build\n");
        assert_eq!(names(&images), vec!["golang:1.21"]);
    }

    #[test]
    fn scratch_has_no_tag() {
        let images = parse("FROM scratch\n");
        assert_eq!(images[0].image, ImageReference::scratch());
    }

    #[test]
    fn from_without_image_is_an_error() {
        let err = images_from_str(Path::new("Dockerfile"), "FROM\n", &BuildArgs::new())
            .unwrap_err();
        assert!(err.to_string().contains("FROM has no image"), "got: {err}");
    }

    #[test]
    fn from_expanding_to_nothing_is_an_error() {
        let result = images_from_str(Path::new("Dockerfile"), "FROM ${NOPE}\n", &BuildArgs::new());
        assert!(result.is_err());
    }

    #[test]
    fn slot_spans_cover_the_raw_word() {
        let src = "ARG T=1\nFROM node:${T} AS app\n";
        let slots = Dockerfile::parse(src)
            .image_slots(Path::new("Dockerfile"), &BuildArgs::new())
            .expect("slots");
        assert_eq!(&src[slots[0].span.clone()], "node:${T}");
        assert_eq!(slots[0].image.tag, "1");
        assert_eq!(slots[0].line, 2);
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("Dockerfile");
        std::fs::write(&path, "FROM redis:7\n").expect("write");
        let images = parse_file(&path, &BuildArgs::new()).expect("parse");
        assert_eq!(names(&images), vec!["redis:7"]);
    }

    #[test]
    fn parse_file_missing_is_io_error() {
        let err = parse_file(Path::new("/nonexistent/Dockerfile"), &BuildArgs::new()).unwrap_err();
        assert!(matches!(err, DigestlockError::Io { .. }));
    }
}
