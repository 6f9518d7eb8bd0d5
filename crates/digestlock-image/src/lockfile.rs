//! The persisted, pinned-digest lockfile.
//!
//! Groups images by kind, then by file path. Paths are kept in a
//! `BTreeMap` so serialization is deterministic; each list is already in
//! positional order when the lockfile is assembled.

use std::collections::BTreeMap;
use std::path::Path;

use digestlock_common::error::{DigestlockError, Result};
use serde::{Deserialize, Serialize};

use crate::annotated::{ComposeImage, DockerfileImage, KubernetesImage};

/// Pinned images for every collected file, grouped by format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    /// Build-file images keyed by build-file path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dockerfiles: BTreeMap<String, Vec<DockerfileImage>>,
    /// Compose-service images keyed by compose-file path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub composefiles: BTreeMap<String, Vec<ComposeImage>>,
    /// Manifest images keyed by manifest path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kubernetesfiles: BTreeMap<String, Vec<KubernetesImage>>,
}

impl Lockfile {
    /// Returns whether no image of any kind is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dockerfiles.is_empty() && self.composefiles.is_empty() && self.kubernetesfiles.is_empty()
    }

    /// Total number of recorded images.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.dockerfiles.values().map(Vec::len).sum::<usize>()
            + self.composefiles.values().map(Vec::len).sum::<usize>()
            + self.kubernetesfiles.values().map(Vec::len).sum::<usize>()
    }

    /// Decodes a lockfile from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid lockfile.
    pub fn from_json(text: &str) -> Result<Self> {
        let mut lockfile: Self = serde_json::from_str(text)?;
        lockfile.restore_annotations();
        Ok(lockfile)
    }

    /// Encodes the lockfile as indented JSON with a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Reads and decodes a lockfile from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn read(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "reading lockfile");
        let text = std::fs::read_to_string(path).map_err(|e| DigestlockError::io(path, e))?;
        Self::from_json(&text)
    }

    /// Encodes and writes the lockfile to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| DigestlockError::io(path, e))?;
        tracing::info!(path = %path.display(), images = self.image_count(), "wrote lockfile");
        Ok(())
    }

    /// Fills the non-serialized path and position fields from map keys and
    /// list order.
    ///
    /// Compose positions count up within each run of one service's build
    /// file images. The lockfile does not record YAML document boundaries,
    /// so manifest entries get `doc_position` zero and an `image_position`
    /// counting across the whole file. Sorting on the pair keeps the
    /// stored order.
    fn restore_annotations(&mut self) {
        for (path, images) in &mut self.dockerfiles {
            for (position, image) in images.iter_mut().enumerate() {
                image.path.clone_from(path);
                image.position = position;
            }
        }
        for (path, images) in &mut self.composefiles {
            let mut previous: Option<(String, String)> = None;
            let mut position = 0;
            for image in images.iter_mut() {
                image.path.clone_from(path);
                let run = (image.service_name.clone(), image.dockerfile_path.clone());
                if previous.as_ref() == Some(&run) {
                    position += 1;
                } else {
                    position = 0;
                }
                image.position = if image.dockerfile_path.is_empty() { 0 } else { position };
                previous = Some(run);
            }
        }
        for (path, images) in &mut self.kubernetesfiles {
            for (position, image) in images.iter_mut().enumerate() {
                image.path.clone_from(path);
                image.doc_position = 0;
                image.image_position = position;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ImageReference;

    fn sample() -> Lockfile {
        let mut lockfile = Lockfile::default();
        let _ = lockfile.dockerfiles.insert(
            "Dockerfile".into(),
            vec![
                DockerfileImage {
                    image: ImageReference::new("ubuntu", "bionic", "aa"),
                    path: "Dockerfile".into(),
                    position: 0,
                },
                DockerfileImage {
                    image: ImageReference::new("node", "latest", "bb"),
                    path: "Dockerfile".into(),
                    position: 1,
                },
            ],
        );
        lockfile
    }

    #[test]
    fn empty_lockfile_serializes_to_empty_object() {
        let json = Lockfile::default().to_json().expect("serialize");
        assert_eq!(json.trim(), "{}");
    }

    #[test]
    fn empty_kinds_are_omitted() {
        let json = sample().to_json().expect("serialize");
        assert!(json.contains("\"dockerfiles\""));
        assert!(!json.contains("composefiles"));
        assert!(!json.contains("kubernetesfiles"));
        assert!(!json.contains("position"));
    }

    #[test]
    fn decode_restores_paths_and_positions() {
        let json = sample().to_json().expect("serialize");
        let decoded = Lockfile::from_json(&json).expect("decode");
        let images = &decoded.dockerfiles["Dockerfile"];
        assert_eq!(images[1].path, "Dockerfile");
        assert_eq!(images[1].position, 1);
        assert_eq!(decoded, sample());
    }

    #[test]
    fn decode_restores_compose_positions_per_service() {
        let compose = |service: &str, dockerfile: &str, name: &str| ComposeImage {
            image: ImageReference::new(name, "latest", "aa"),
            dockerfile_path: dockerfile.into(),
            service_name: service.into(),
            ..ComposeImage::default()
        };
        let mut lockfile = Lockfile::default();
        let _ = lockfile.composefiles.insert(
            "docker-compose.yml".into(),
            vec![
                compose("api", "api/Dockerfile", "golang"),
                compose("api", "api/Dockerfile", "alpine"),
                compose("cache", "", "redis"),
                compose("web", "web/Dockerfile", "node"),
                compose("web", "web/Dockerfile", "nginx"),
                compose("web", "web/Dockerfile", "busybox"),
            ],
        );

        let json = lockfile.to_json().expect("serialize");
        let decoded = Lockfile::from_json(&json).expect("decode");
        let images = &decoded.composefiles["docker-compose.yml"];

        let positions: Vec<usize> = images.iter().map(|i| i.position).collect();
        assert_eq!(positions, vec![0, 1, 0, 0, 1, 2]);
        assert!(images.iter().all(|i| i.path == "docker-compose.yml"));
    }

    #[test]
    fn decode_orders_manifest_entries_across_the_file() {
        let container = |name: &str| KubernetesImage {
            image: ImageReference::new(name, "latest", "aa"),
            container_name: name.into(),
            ..KubernetesImage::default()
        };
        let mut lockfile = Lockfile::default();
        let _ = lockfile.kubernetesfiles.insert(
            "pods.yaml".into(),
            vec![container("web"), container("sidecar"), container("db")],
        );

        let json = lockfile.to_json().expect("serialize");
        let decoded = Lockfile::from_json(&json).expect("decode");
        let images = &decoded.kubernetesfiles["pods.yaml"];

        let order: Vec<(usize, usize)> =
            images.iter().map(|i| (i.doc_position, i.image_position)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2)]);
        assert_eq!(images[2].path, "pods.yaml");
    }

    #[test]
    fn write_then_read_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("digestlock.json");
        sample().write(&path).expect("write");
        let read = Lockfile::read(&path).expect("read");
        assert_eq!(read.image_count(), 2);
    }

    #[test]
    fn read_missing_file_reports_path() {
        let err = Lockfile::read(Path::new("/nonexistent/digestlock.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/digestlock.json"));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        assert!(Lockfile::from_json("{\"dockerfiles\": [}").is_err());
    }
}
