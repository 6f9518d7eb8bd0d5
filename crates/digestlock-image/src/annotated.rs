//! Image references annotated with where they were found.
//!
//! Positional fields are internal ordering keys. They are never serialized;
//! the lockfile records them implicitly as list order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reference::ImageReference;

/// The three supported descriptor formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileKind {
    /// Image build files.
    Dockerfile,
    /// Multi-service compose manifests.
    Composefile,
    /// Orchestrator workload manifests.
    Kubernetesfile,
}

impl FileKind {
    /// Key of this kind's group in the lockfile.
    #[must_use]
    pub const fn lockfile_key(self) -> &'static str {
        match self {
            Self::Dockerfile => "dockerfiles",
            Self::Composefile => "composefiles",
            Self::Kubernetesfile => "kubernetesfiles",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lockfile_key())
    }
}

/// An image found in a build file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerfileImage {
    /// The image reference.
    #[serde(flatten)]
    pub image: ImageReference,
    /// Build file the image was found in.
    #[serde(skip)]
    pub path: String,
    /// Order among the file's genuine image references.
    #[serde(skip)]
    pub position: usize,
}

/// An image used by a compose service, literally or through its build file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeImage {
    /// The image reference.
    #[serde(flatten)]
    pub image: ImageReference,
    /// Build file the service builds from, empty for literal images.
    #[serde(
        rename = "dockerfile",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub dockerfile_path: String,
    /// Owning service.
    #[serde(rename = "service")]
    pub service_name: String,
    /// Compose file the service is declared in.
    #[serde(skip)]
    pub path: String,
    /// Order within the service's build file, zero for literal images.
    #[serde(skip)]
    pub position: usize,
}

/// An image used by a container entry of an orchestrator manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubernetesImage {
    /// The image reference.
    #[serde(flatten)]
    pub image: ImageReference,
    /// Name of the container entry.
    #[serde(rename = "container")]
    pub container_name: String,
    /// Manifest file the container is declared in.
    #[serde(skip)]
    pub path: String,
    /// Index of the YAML document within the stream.
    #[serde(skip)]
    pub doc_position: usize,
    /// Index of the container within its document.
    #[serde(skip)]
    pub image_position: usize,
}

/// An image reference from any supported format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotatedImage {
    /// From a build file.
    Dockerfile(DockerfileImage),
    /// From a compose service.
    Compose(ComposeImage),
    /// From an orchestrator manifest.
    Kubernetes(KubernetesImage),
}

impl AnnotatedImage {
    /// Returns the image reference.
    #[must_use]
    pub const fn image(&self) -> &ImageReference {
        match self {
            Self::Dockerfile(i) => &i.image,
            Self::Compose(i) => &i.image,
            Self::Kubernetes(i) => &i.image,
        }
    }

    /// Returns the image reference for digest backfill.
    pub fn image_mut(&mut self) -> &mut ImageReference {
        match self {
            Self::Dockerfile(i) => &mut i.image,
            Self::Compose(i) => &mut i.image,
            Self::Kubernetes(i) => &mut i.image,
        }
    }

    /// Returns the path of the file the image was found in.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Dockerfile(i) => &i.path,
            Self::Compose(i) => &i.path,
            Self::Kubernetes(i) => &i.path,
        }
    }

    /// Returns the format the image was found in.
    #[must_use]
    pub const fn kind(&self) -> FileKind {
        match self {
            Self::Dockerfile(_) => FileKind::Dockerfile,
            Self::Compose(_) => FileKind::Composefile,
            Self::Kubernetes(_) => FileKind::Kubernetesfile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_image_serializes_without_positions() {
        let image = ComposeImage {
            image: ImageReference::new("golang", "1.21", "abc"),
            dockerfile_path: "web/Dockerfile".into(),
            service_name: "web".into(),
            path: "docker-compose.yml".into(),
            position: 3,
        };
        let json = serde_json::to_value(&image).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "name": "golang",
                "tag": "1.21",
                "digest": "abc",
                "dockerfile": "web/Dockerfile",
                "service": "web",
            })
        );
    }

    #[test]
    fn literal_compose_image_omits_dockerfile() {
        let image = ComposeImage {
            image: ImageReference::scratch(),
            service_name: "empty".into(),
            ..ComposeImage::default()
        };
        let json = serde_json::to_value(&image).expect("serialize");
        assert!(json.get("dockerfile").is_none());
        assert_eq!(json["name"], "scratch");
        assert_eq!(json["tag"], "");
    }

    #[test]
    fn kubernetes_image_deserializes_container() {
        let image: KubernetesImage = serde_json::from_str(
            r#"{"name":"redis","tag":"7","digest":"ff","container":"cache"}"#,
        )
        .expect("deserialize");
        assert_eq!(image.container_name, "cache");
        assert_eq!(image.image.tag, "7");
        assert_eq!(image.doc_position, 0);
    }

    #[test]
    fn annotated_accessors_follow_variant() {
        let mut annotated = AnnotatedImage::Dockerfile(DockerfileImage {
            image: ImageReference::parse("node"),
            path: "Dockerfile".into(),
            position: 0,
        });
        assert_eq!(annotated.kind(), FileKind::Dockerfile);
        assert_eq!(annotated.path(), "Dockerfile");
        annotated.image_mut().digest = "ab".into();
        assert_eq!(annotated.image().digest, "ab");
    }
}
