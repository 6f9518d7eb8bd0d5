//! Compose-file rewriting.
//!
//! Planning checks a compose file against its lockfile entries and splits
//! it into a line-oriented rewrite of the literal `image:` lines plus the
//! build files its services reference. Build files are merged across all
//! compose files so one physical file is only written once.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use digestlock_common::error::{DigestlockError, Result};
use digestlock_common::paths;
use digestlock_image::{ComposeImage, ImageReference};
use digestlock_parse::compose::{ComposeFile, ServiceSource};
use digestlock_parse::dockerfile::BuildArgs;

use super::{WriteJob, check_slots};

/// A build file some compose service builds from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDockerfile {
    /// Build file path as resolved from the compose file.
    pub path: PathBuf,
    /// Targets for the build file's image slots.
    pub targets: Vec<ImageReference>,
    /// The service's effective build arguments.
    pub build_args: BuildArgs,
    /// Human-readable owner, used in consistency errors.
    pub owner: String,
}

/// Everything one compose file contributes to a rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposePlan {
    /// Line rewrite of the compose file itself.
    pub job: WriteJob,
    /// Build files referenced by its services.
    pub dockerfiles: Vec<ServiceDockerfile>,
}

/// Loads `path` and matches its services against `images`.
///
/// # Errors
///
/// Returns [`DigestlockError::Consistency`] if the declared services and
/// the lockfile's services differ, or if a service changed between image
/// and build form since the lockfile was generated.
pub fn plan(path: &Path, images: &[ComposeImage]) -> Result<ComposePlan> {
    let file = ComposeFile::load(path)?;

    let declared: BTreeSet<&str> = file.services.iter().map(|s| s.name.as_str()).collect();
    let targeted: BTreeSet<&str> = images.iter().map(|i| i.service_name.as_str()).collect();
    if declared != targeted {
        return Err(DigestlockError::Consistency {
            message: format!(
                "{} declares services {declared:?} but the lockfile has {targeted:?}",
                path.display()
            ),
        });
    }

    let mut targets = Vec::new();
    let mut dockerfiles = Vec::new();
    for service in &file.services {
        let owned: Vec<&ComposeImage> = images
            .iter()
            .filter(|i| i.service_name == service.name)
            .collect();
        match &service.source {
            ServiceSource::Image(_) => {
                check_slots(path, owned.len(), 1)?;
                if !owned[0].dockerfile_path.is_empty() {
                    return Err(form_changed(path, &service.name));
                }
                targets.push((service.name.clone(), owned[0].image.clone()));
            }
            ServiceSource::Build(build) => {
                if owned.iter().any(|i| i.dockerfile_path.is_empty()) {
                    return Err(form_changed(path, &service.name));
                }
                dockerfiles.push(ServiceDockerfile {
                    path: build.dockerfile.clone(),
                    targets: owned.iter().map(|i| i.image.clone()).collect(),
                    build_args: build.args.clone(),
                    owner: format!("service {} in {}", service.name, path.display()),
                });
            }
        }
    }

    Ok(ComposePlan {
        job: WriteJob::Compose {
            path: path.to_path_buf(),
            targets,
        },
        dockerfiles,
    })
}

fn form_changed(path: &Path, service: &str) -> DigestlockError {
    DigestlockError::Consistency {
        message: format!(
            "service {service} in {} switched between image and build since the lockfile was generated",
            path.display()
        ),
    }
}

/// Merges build files referenced by several services into one job each.
///
/// # Errors
///
/// Returns [`DigestlockError::Consistency`] when two services want
/// different images in the same build file.
pub fn merge_dockerfiles(
    dockerfiles: impl IntoIterator<Item = ServiceDockerfile>,
) -> Result<Vec<WriteJob>> {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut merged: HashMap<PathBuf, ServiceDockerfile> = HashMap::new();
    for dockerfile in dockerfiles {
        let key = paths::clean(&dockerfile.path);
        if let Some(existing) = merged.get(&key) {
            if existing.targets != dockerfile.targets {
                return Err(DigestlockError::Consistency {
                    message: format!(
                        "{} is built by {} as [{}] and by {} as [{}]",
                        key.display(),
                        existing.owner,
                        join(&existing.targets),
                        dockerfile.owner,
                        join(&dockerfile.targets)
                    ),
                });
            }
            continue;
        }
        order.push(key.clone());
        let _ = merged.insert(key, dockerfile);
    }

    Ok(order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .map(|dockerfile| WriteJob::Dockerfile {
            path: dockerfile.path,
            targets: dockerfile.targets,
            build_args: dockerfile.build_args,
        })
        .collect())
}

fn join(images: &[ImageReference]) -> String {
    images.iter().fold(String::new(), |mut out, image| {
        if !out.is_empty() {
            out.push_str(", ");
        }
        let _ = write!(out, "{image}");
        out
    })
}

/// Returns the key of a `key:` line that opens a nested block.
fn block_key(trimmed: &str) -> Option<&str> {
    let (key, rest) = trimmed.split_once(':')?;
    let rest = rest.trim();
    if !rest.is_empty() && !rest.starts_with('#') {
        return None;
    }
    let key = key.trim();
    let key = key
        .strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(key);
    Some(key)
}

/// Rewrites the `image:` line directly below each targeted service line.
///
/// `scratch` targets leave their line untouched.
///
/// # Errors
///
/// Returns a parse error if a targeted service is missing or its first
/// line is not its `image:` line.
pub fn render(
    path: &Path,
    content: &str,
    targets: &[(String, ImageReference)],
    exclude_tags: bool,
) -> Result<String> {
    let mut pending: HashMap<&str, &ImageReference> =
        targets.iter().map(|(name, image)| (name.as_str(), image)).collect();
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let mut out = String::with_capacity(content.len());
    let mut in_services = false;
    let mut service_indent = None;
    let mut idx = 0;

    while idx < lines.len() {
        let line = lines[idx];
        idx += 1;
        out.push_str(line);

        let body = line.trim_end_matches(['\n', '\r']);
        let trimmed = body.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = body.len() - trimmed.len();
        if indent == 0 {
            in_services = block_key(trimmed) == Some("services");
            service_indent = None;
            continue;
        }
        if !in_services || *service_indent.get_or_insert(indent) != indent {
            continue;
        }
        let Some(service) = block_key(trimmed) else {
            continue;
        };
        let Some(target) = pending.remove(service) else {
            continue;
        };

        let next = lines.get(idx).copied().unwrap_or_default();
        let next_body = next.trim_end_matches(['\n', '\r']);
        let next_trimmed = next_body.trim_start();
        let next_indent = next_body.len() - next_trimmed.len();
        let Some(value) = next_trimmed.strip_prefix("image:") else {
            let found = if idx >= lines.len() {
                "the end of the file".to_string()
            } else if next_trimmed.is_empty() {
                "a blank line".to_string()
            } else if next_trimmed.starts_with('#') {
                format!("comment `{next_trimmed}`")
            } else {
                format!("`{next_trimmed}`")
            };
            return Err(DigestlockError::parse(
                path,
                format!(
                    "service {service}: `image:` must be the first line of the service, \
                     found {found} on line {}",
                    idx + 1
                ),
            ));
        };
        if next_indent <= indent {
            return Err(DigestlockError::parse(
                path,
                format!("service {service}: `image:` must be nested under the service"),
            ));
        }
        idx += 1;
        if target.is_scratch() {
            out.push_str(next);
            continue;
        }
        let comment = value.find(" #").map_or("", |at| &value[at..]);
        out.push_str(&next_body[..next_indent]);
        out.push_str("image: ");
        out.push_str(&target.to_image_line(exclude_tags));
        out.push_str(comment);
        out.push_str(&next[next_body.len()..]);
    }

    if let Some(service) = pending.keys().next() {
        return Err(DigestlockError::parse(
            path,
            format!("service {service} was not found under `services:`"),
        ));
    }
    Ok(out)
}
