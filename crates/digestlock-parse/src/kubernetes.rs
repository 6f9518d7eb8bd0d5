//! Orchestrator manifest walking.
//!
//! Manifests are multi-document YAML streams. Any mapping carrying both a
//! string `name` and a string `image` is a container entry, wherever it sits
//! in the tree, so init containers and custom resources are found too.

use std::path::Path;

use digestlock_common::error::{DigestlockError, Result};
use digestlock_common::paths;
use digestlock_image::{ImageReference, KubernetesImage};
use serde::Deserialize;
use serde_yaml::Value;

/// Decodes every non-empty document of a YAML stream.
///
/// # Errors
///
/// Returns [`DigestlockError::Yaml`] if any document is malformed.
pub fn decode_documents(path: &Path, content: &str) -> Result<Vec<Value>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(document).map_err(|source| DigestlockError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

/// Re-encodes documents in order, separated by the document marker.
///
/// # Errors
///
/// Returns [`DigestlockError::Yaml`] if a document cannot be serialized.
pub fn encode_documents(path: &Path, documents: &[Value]) -> Result<String> {
    let encoded = documents
        .iter()
        .map(|doc| {
            serde_yaml::to_string(doc).map_err(|source| DigestlockError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(encoded.join("---\n"))
}

/// Calls `visit(container_name, image)` for every container entry, depth
/// first in document order. The image may be rewritten in place.
pub fn visit_containers<F>(value: &mut Value, visit: &mut F)
where
    F: FnMut(&str, &mut String),
{
    match value {
        Value::Mapping(map) => {
            let name = map.get("name").and_then(Value::as_str).map(str::to_string);
            if let (Some(name), Some(Value::String(image))) = (name, map.get_mut("image")) {
                visit(name.as_str(), image);
            }
            for (_, child) in map.iter_mut() {
                visit_containers(child, visit);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                visit_containers(item, visit);
            }
        }
        Value::Tagged(tagged) => visit_containers(&mut tagged.value, visit),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

/// Extracts the container images of manifest text.
///
/// # Errors
///
/// Returns an error if a document is malformed.
pub fn images_from_str(path: &Path, content: &str) -> Result<Vec<KubernetesImage>> {
    let path_str = paths::to_slash(path);
    let mut images = Vec::new();
    for (doc_position, mut document) in decode_documents(path, content)?.into_iter().enumerate() {
        let mut image_position = 0;
        visit_containers(&mut document, &mut |container, image| {
            images.push(KubernetesImage {
                image: ImageReference::parse(image),
                container_name: container.to_string(),
                path: path_str.clone(),
                doc_position,
                image_position,
            });
            image_position += 1;
        });
    }
    Ok(images)
}

/// Reads a manifest file and extracts its container images.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is malformed.
pub fn parse_file(path: &Path) -> Result<Vec<KubernetesImage>> {
    tracing::debug!(path = %path.display(), "parsing manifest");
    let content = std::fs::read_to_string(path).map_err(|e| DigestlockError::io(path, e))?;
    images_from_str(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DOCS: &str = "\
apiVersion: v1
kind: Pod
metadata:
  name: first
spec:
  initContainers:
    - name: init
      image: busybox
  containers:
    - name: app
      image: nginx:1.25
---
apiVersion: apps/v1
kind: Deployment
spec:
  template:
    spec:
      containers:
        - name: web
          image: redis@sha256:abc
        - name: sidecar
          image: envoyproxy/envoy:v1.29
";

    fn parse(content: &str) -> Vec<KubernetesImage> {
        images_from_str(Path::new("pod.yaml"), content).expect("parse")
    }

    #[test]
    fn positions_reset_per_document() {
        let images = parse(TWO_DOCS);
        let positions: Vec<_> = images
            .iter()
            .map(|i| (i.doc_position, i.image_position, i.container_name.as_str()))
            .collect();
        assert_eq!(
            positions,
            vec![(0, 0, "init"), (0, 1, "app"), (1, 0, "web"), (1, 1, "sidecar")]
        );
        assert_eq!(images[2].image.digest, "abc");
        assert!(images[2].image.tag.is_empty());
    }

    #[test]
    fn metadata_name_without_image_is_not_a_container() {
        let images = parse("metadata:\n  name: x\nspec:\n  image: y\n");
        assert!(images.is_empty());
    }

    #[test]
    fn empty_documents_do_not_consume_positions() {
        let images = parse("---\n---\nspec:\n  containers:\n    - name: a\n      image: alpine\n---\n");
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].doc_position, 0);
    }

    #[test]
    fn visitor_can_rewrite_images() {
        let path = Path::new("pod.yaml");
        let mut docs = decode_documents(path, TWO_DOCS).expect("decode");
        for doc in &mut docs {
            visit_containers(doc, &mut |_, image| *image = format!("{image}-x"));
        }
        let encoded = encode_documents(path, &docs).expect("encode");
        let images = parse(&encoded);
        assert_eq!(images.len(), 4);
        assert_eq!(images[1].image.tag, "1.25-x");
        assert!(encoded.contains("---\n"));
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let result = images_from_str(Path::new("pod.yaml"), "spec: [\n");
        assert!(matches!(result, Err(DigestlockError::Yaml { .. })));
    }
}
