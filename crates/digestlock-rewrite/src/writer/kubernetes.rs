//! Manifest rewriting.

use std::path::Path;

use digestlock_common::error::Result;
use digestlock_image::ImageReference;
use digestlock_parse::kubernetes::{decode_documents, encode_documents, visit_containers};

use super::check_slots;

/// Re-encodes a manifest stream with every container image replaced.
///
/// Containers are visited in the parser's order, so the n-th target lands
/// on the n-th container across all documents.
///
/// # Errors
///
/// Returns a YAML error for malformed documents or
/// [`SlotMismatch`](digestlock_common::error::DigestlockError::SlotMismatch)
/// when the container count differs from the target count.
pub fn render(
    path: &Path,
    content: &str,
    targets: &[ImageReference],
    exclude_tags: bool,
) -> Result<String> {
    let mut documents = decode_documents(path, content)?;
    let mut slots = 0;
    for document in &mut documents {
        visit_containers(document, &mut |_, image| {
            if let Some(target) = targets.get(slots) {
                *image = target.to_image_line(exclude_tags);
            }
            slots += 1;
        });
    }
    check_slots(path, targets.len(), slots)?;
    encode_documents(path, &documents)
}

#[cfg(test)]
mod tests {
    use digestlock_common::error::DigestlockError;
    use digestlock_parse::kubernetes::images_from_str;

    use super::*;

    const MANIFEST: &str = "\
apiVersion: v1
kind: Pod
spec:
  initContainers:
  - name: init
    image: busybox
  containers:
  - name: app
    image: nginx:1.25
---
---
kind: Job
spec:
  template:
    spec:
      containers:
      - name: worker
        image: python:3.12
";

    fn targets(lines: &[&str]) -> Vec<ImageReference> {
        lines.iter().map(|line| ImageReference::parse(line)).collect()
    }

    #[test]
    fn substitutes_in_walk_order_across_documents() {
        let path = Path::new("pod.yaml");
        let out = render(
            path,
            MANIFEST,
            &targets(&[
                "busybox:latest@sha256:a1",
                "nginx:1.25@sha256:b2",
                "python:3.12@sha256:c3",
            ]),
            false,
        )
        .expect("render");
        let images = images_from_str(path, &out).expect("reparse");
        let lines: Vec<_> = images.iter().map(|i| i.image.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "busybox:latest@sha256:a1",
                "nginx:1.25@sha256:b2",
                "python:3.12@sha256:c3"
            ]
        );
        assert_eq!(images[2].doc_position, 1);
        assert_eq!(out.matches("---\n").count(), 1);
    }

    #[test]
    fn exclude_tags_writes_digest_only() {
        let out = render(
            Path::new("pod.yaml"),
            "spec:\n  containers:\n  - name: a\n    image: redis:7\n",
            &targets(&["redis:7@sha256:ff"]),
            true,
        )
        .expect("render");
        assert!(out.contains("redis@sha256:ff"), "got {out}");
    }

    #[test]
    fn slot_count_mismatch_is_fatal() {
        let err = render(
            Path::new("pod.yaml"),
            MANIFEST,
            &targets(&["busybox@sha256:a1"]),
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DigestlockError::SlotMismatch {
                expected: 1,
                actual: 3,
                ..
            }
        ));
    }
}
