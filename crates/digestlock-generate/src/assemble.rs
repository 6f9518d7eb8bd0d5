//! Grouping and ordering of resolved images into a lockfile.

use digestlock_image::{AnnotatedImage, Lockfile};

/// Builds a lockfile from resolved images in any order.
///
/// Images are grouped by kind and path, then each group is sorted by its
/// positional keys so the result does not depend on resolution order.
#[must_use]
pub fn assemble(images: Vec<AnnotatedImage>) -> Lockfile {
    let mut lockfile = Lockfile::default();
    for image in images {
        match image {
            AnnotatedImage::Dockerfile(image) => lockfile
                .dockerfiles
                .entry(image.path.clone())
                .or_default()
                .push(image),
            AnnotatedImage::Compose(image) => lockfile
                .composefiles
                .entry(image.path.clone())
                .or_default()
                .push(image),
            AnnotatedImage::Kubernetes(image) => lockfile
                .kubernetesfiles
                .entry(image.path.clone())
                .or_default()
                .push(image),
        }
    }

    for images in lockfile.dockerfiles.values_mut() {
        images.sort_by_key(|i| i.position);
    }
    for images in lockfile.composefiles.values_mut() {
        // Literal images (no build file) sort after build-file images.
        images.sort_by(|a, b| {
            a.service_name
                .cmp(&b.service_name)
                .then_with(|| a.dockerfile_path.is_empty().cmp(&b.dockerfile_path.is_empty()))
                .then_with(|| a.dockerfile_path.cmp(&b.dockerfile_path))
                .then_with(|| a.position.cmp(&b.position))
        });
    }
    for images in lockfile.kubernetesfiles.values_mut() {
        images.sort_by_key(|i| (i.doc_position, i.image_position));
    }

    tracing::debug!(
        dockerfiles = lockfile.dockerfiles.len(),
        composefiles = lockfile.composefiles.len(),
        kubernetesfiles = lockfile.kubernetesfiles.len(),
        "assembled lockfile"
    );
    lockfile
}

#[cfg(test)]
mod tests {
    use digestlock_image::{ComposeImage, DockerfileImage, ImageReference, KubernetesImage};

    use super::*;

    fn dockerfile(path: &str, position: usize, name: &str) -> AnnotatedImage {
        AnnotatedImage::Dockerfile(DockerfileImage {
            image: ImageReference::new(name, "latest", "d"),
            path: path.into(),
            position,
        })
    }

    fn compose(service: &str, dockerfile: &str, position: usize, name: &str) -> AnnotatedImage {
        AnnotatedImage::Compose(ComposeImage {
            image: ImageReference::new(name, "latest", "d"),
            dockerfile_path: dockerfile.into(),
            service_name: service.into(),
            path: "docker-compose.yml".into(),
            position,
        })
    }

    fn manifest(doc: usize, pos: usize, name: &str) -> AnnotatedImage {
        AnnotatedImage::Kubernetes(KubernetesImage {
            image: ImageReference::new(name, "latest", "d"),
            container_name: name.into(),
            path: "pod.yaml".into(),
            doc_position: doc,
            image_position: pos,
        })
    }

    #[test]
    fn dockerfile_groups_follow_declared_order() {
        let lockfile = assemble(vec![
            dockerfile("Dockerfile", 2, "c"),
            dockerfile("other/Dockerfile", 0, "x"),
            dockerfile("Dockerfile", 0, "a"),
            dockerfile("Dockerfile", 1, "b"),
        ]);
        let names: Vec<_> = lockfile.dockerfiles["Dockerfile"]
            .iter()
            .map(|i| i.image.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(lockfile.dockerfiles.len(), 2);
        assert!(lockfile.composefiles.is_empty());
    }

    #[test]
    fn compose_sorts_by_service_then_dockerfile_then_position() {
        let lockfile = assemble(vec![
            compose("web", "", 0, "literal"),
            compose("web", "web/Dockerfile", 1, "second"),
            compose("api", "", 0, "api"),
            compose("web", "web/Dockerfile", 0, "first"),
        ]);
        let names: Vec<_> = lockfile.composefiles["docker-compose.yml"]
            .iter()
            .map(|i| i.image.name.as_str())
            .collect();
        assert_eq!(names, vec!["api", "first", "second", "literal"]);
    }

    #[test]
    fn manifests_sort_by_document_then_position() {
        let lockfile = assemble(vec![
            manifest(1, 1, "d"),
            manifest(0, 1, "b"),
            manifest(1, 0, "c"),
            manifest(0, 0, "a"),
        ]);
        let names: Vec<_> = lockfile.kubernetesfiles["pod.yaml"]
            .iter()
            .map(|i| i.image.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn no_images_yields_empty_lockfile() {
        let lockfile = assemble(Vec::new());
        assert!(lockfile.is_empty());
        assert_eq!(lockfile.to_json().expect("json").trim(), "{}");
    }
}
