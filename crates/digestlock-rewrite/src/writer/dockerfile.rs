//! Build-file rewriting.
//!
//! Slots are located with the same stage tracking the parser uses, then
//! each slot's source bytes are replaced. Everything outside the slots,
//! including comments, flags and continuations, is kept byte for byte.

use std::path::Path;

use digestlock_common::error::Result;
use digestlock_image::ImageReference;
use digestlock_parse::dockerfile::{BuildArgs, Dockerfile};

use super::check_slots;

/// Returns `content` with every genuine image reference replaced by the
/// matching target.
///
/// # Errors
///
/// Returns [`SlotMismatch`] if the file has a different number of image
/// slots than `targets`, or a parse error for a malformed `FROM`.
///
/// [`SlotMismatch`]: digestlock_common::error::DigestlockError::SlotMismatch
pub fn render(
    path: &Path,
    content: &str,
    targets: &[ImageReference],
    build_args: &BuildArgs,
    exclude_tags: bool,
) -> Result<String> {
    let slots = Dockerfile::parse(content).image_slots(path, build_args)?;
    check_slots(path, targets.len(), slots.len())?;

    let mut rendered = content.to_string();
    for (slot, target) in slots.iter().zip(targets).rev() {
        rendered.replace_range(slot.span.clone(), &target.to_image_line(exclude_tags));
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use digestlock_common::error::DigestlockError;

    use super::*;

    fn targets(lines: &[&str]) -> Vec<ImageReference> {
        lines.iter().map(|line| ImageReference::parse(line)).collect()
    }

    fn render_plain(content: &str, lines: &[&str]) -> Result<String> {
        render(
            Path::new("Dockerfile"),
            content,
            &targets(lines),
            &BuildArgs::new(),
            false,
        )
    }

    #[test]
    fn replaces_images_and_keeps_everything_else() {
        let src = "# syntax=docker/dockerfile:1\nFROM --platform=$BUILDPLATFORM golang:1.21 AS build\nRUN go build \\\n  ./...\n\nFROM build AS test\nFROM alpine\nCOPY --from=build /out /out\n";
        let out = render_plain(
            src,
            &["golang:1.21@sha256:aaa", "alpine:latest@sha256:bbb"],
        )
        .expect("render");
        assert_eq!(
            out,
            "# syntax=docker/dockerfile:1\nFROM --platform=$BUILDPLATFORM golang:1.21@sha256:aaa AS build\nRUN go build \\\n  ./...\n\nFROM build AS test\nFROM alpine:latest@sha256:bbb\nCOPY --from=build /out /out\n"
        );
    }

    #[test]
    fn exclude_tags_drops_tag_when_digest_present() {
        let out = render(
            Path::new("Dockerfile"),
            "FROM node:20\nFROM scratch\n",
            &targets(&["node:20@sha256:ccc", "scratch"]),
            &BuildArgs::new(),
            true,
        )
        .expect("render");
        assert_eq!(out, "FROM node@sha256:ccc\nFROM scratch\n");
    }

    #[test]
    fn variable_image_is_replaced_with_resolved_text() {
        let out = render_plain("ARG TAG=3.12\nFROM python:${TAG}\n", &["python:3.12@sha256:ddd"])
            .expect("render");
        assert_eq!(out, "ARG TAG=3.12\nFROM python:3.12@sha256:ddd\n");
    }

    #[test]
    fn build_args_decide_which_slots_are_stages() {
        let mut args = BuildArgs::new();
        let _ = args.insert("BASE".into(), "builder".into());
        let out = render(
            Path::new("Dockerfile"),
            "ARG BASE=debian\nFROM rust AS builder\nFROM ${BASE}\n",
            &targets(&["rust:latest@sha256:eee"]),
            &args,
            false,
        )
        .expect("render");
        assert_eq!(out, "ARG BASE=debian\nFROM rust:latest@sha256:eee AS builder\nFROM ${BASE}\n");
    }

    #[test]
    fn slot_count_mismatch_is_fatal() {
        let err = render_plain("FROM a\nFROM b\n", &["a@sha256:1"]).unwrap_err();
        assert!(matches!(
            err,
            DigestlockError::SlotMismatch {
                expected: 1,
                actual: 2,
                ..
            }
        ));
        assert!(render_plain("FROM a\n", &["a@sha256:1", "b@sha256:2"]).is_err());
    }
}
