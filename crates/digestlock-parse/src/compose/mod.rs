//! Compose file loading.
//!
//! A service either names a literal `image` or builds from a Dockerfile.
//! Build services are expanded into the images of their Dockerfile, parsed
//! with the service's effective build arguments.

pub mod env;

use std::path::{Path, PathBuf};

use digestlock_common::constants::DEFAULT_DOCKERFILE;
use digestlock_common::error::{DigestlockError, Result};
use digestlock_common::paths;
use digestlock_image::{ComposeImage, ImageReference};
use serde_yaml::Value;

use self::env::Environment;
use crate::dockerfile::{self, BuildArgs};
use crate::interpolate;

/// Where a service's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceSource {
    /// A literal `image:` line, already interpolated.
    Image(String),
    /// A Dockerfile built with the given arguments.
    Build(ServiceBuild),
}

/// Resolved build section of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBuild {
    /// Dockerfile path, relative to the working directory unless absolute.
    pub dockerfile: PathBuf,
    /// Effective build arguments.
    pub args: BuildArgs,
}

/// A service declared in a compose file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeService {
    /// Service name.
    pub name: String,
    /// Image origin.
    pub source: ServiceSource,
}

/// A loaded compose file.
#[derive(Debug, Clone)]
pub struct ComposeFile {
    /// Path the file was loaded from.
    pub path: PathBuf,
    /// Services in declaration order.
    pub services: Vec<ComposeService>,
}

impl ComposeFile {
    /// Reads a compose file, interpolating with `.env` and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading compose file");
        let content = std::fs::read_to_string(path).map_err(|e| DigestlockError::io(path, e))?;
        let env = Environment::load(&compose_dir(path))?;
        Self::parse_str(path, &content, &env)
    }

    /// Parses compose text with an explicit environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or a service is invalid.
    pub fn parse_str(path: &Path, content: &str, env: &Environment) -> Result<Self> {
        let mut doc: Value = serde_yaml::from_str(content).map_err(|source| DigestlockError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        interpolate_strings(&mut doc, env);

        let base = compose_dir(path);
        let services = match doc.get("services") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Mapping(services)) => services
                .iter()
                .map(|(name, body)| {
                    let name = name.as_str().ok_or_else(|| {
                        DigestlockError::parse(path, format!("service name {name:?} is not a string"))
                    })?;
                    parse_service(path, &base, name, body, env)
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(DigestlockError::parse(path, "`services` must be a mapping"));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            services,
        })
    }

    /// Collects the images of every service, parsing build Dockerfiles.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced Dockerfile cannot be read or parsed.
    pub fn images(&self) -> Result<Vec<ComposeImage>> {
        let path = paths::to_slash(&self.path);
        let mut images = Vec::new();
        for service in &self.services {
            match &service.source {
                ServiceSource::Image(line) => images.push(ComposeImage {
                    image: ImageReference::parse(line),
                    dockerfile_path: String::new(),
                    service_name: service.name.clone(),
                    path: path.clone(),
                    position: 0,
                }),
                ServiceSource::Build(build) => {
                    let dockerfile_path = paths::to_slash(&build.dockerfile);
                    let built = dockerfile::parse_file(&build.dockerfile, &build.args)?;
                    images.extend(built.into_iter().map(|image| ComposeImage {
                        image: image.image,
                        dockerfile_path: dockerfile_path.clone(),
                        service_name: service.name.clone(),
                        path: path.clone(),
                        position: image.position,
                    }));
                }
            }
        }
        Ok(images)
    }
}

/// Reads a compose file and returns its images.
///
/// # Errors
///
/// Returns an error if the compose file or a referenced Dockerfile is invalid.
pub fn parse_file(path: &Path) -> Result<Vec<ComposeImage>> {
    ComposeFile::load(path)?.images()
}

/// Directory relative paths inside a compose file are resolved against.
#[must_use]
pub fn compose_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn interpolate_strings(value: &mut Value, env: &Environment) {
    match value {
        Value::String(s) => {
            let lookup = |key: &str| env.get(key).map(str::to_string);
            *s = interpolate::expand(s, &lookup, true);
        }
        Value::Sequence(items) => {
            for item in items {
                interpolate_strings(item, env);
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                interpolate_strings(item, env);
            }
        }
        Value::Tagged(tagged) => interpolate_strings(&mut tagged.value, env),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn parse_service(
    path: &Path,
    base: &Path,
    name: &str,
    body: &Value,
    env: &Environment,
) -> Result<ComposeService> {
    let source = match body.get("build") {
        Some(Value::String(context)) => {
            ServiceSource::Build(resolve_build(base, context, None, BuildArgs::new()))
        }
        Some(Value::Mapping(build)) => {
            let context = build.get("context").and_then(Value::as_str).unwrap_or(".");
            let dockerfile = build.get("dockerfile").and_then(Value::as_str);
            let args = match build.get("args") {
                Some(args) => build_args(path, name, args, env)?,
                None => BuildArgs::new(),
            };
            ServiceSource::Build(resolve_build(base, context, dockerfile, args))
        }
        None | Some(Value::Null) => {
            let image = body
                .get("image")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|image| !image.is_empty())
                .ok_or_else(|| {
                    DigestlockError::parse(
                        path,
                        format!("service {name:?} has neither an image nor a build section"),
                    )
                })?;
            ServiceSource::Image(image.to_string())
        }
        Some(_) => {
            return Err(DigestlockError::parse(
                path,
                format!("service {name:?} has a malformed build section"),
            ));
        }
    };
    Ok(ComposeService {
        name: name.to_string(),
        source,
    })
}

fn resolve_build(base: &Path, context: &str, dockerfile: Option<&str>, args: BuildArgs) -> ServiceBuild {
    let context = Path::new(context);
    let context_dir = if context.is_absolute() {
        context.to_path_buf()
    } else {
        base.join(context)
    };
    let dockerfile = Path::new(dockerfile.unwrap_or(DEFAULT_DOCKERFILE));
    let dockerfile = if dockerfile.is_absolute() {
        dockerfile.to_path_buf()
    } else {
        context_dir.join(dockerfile)
    };
    ServiceBuild {
        dockerfile: paths::clean(&dockerfile),
        args,
    }
}

/// Computes effective build arguments from the map or list form.
///
/// Entries without a value are filled from the environment and dropped
/// when the environment does not define them either.
fn build_args(path: &Path, service: &str, args: &Value, env: &Environment) -> Result<BuildArgs> {
    let from_env = |key: &str| env.get(key).map(str::to_string);
    let mut out = BuildArgs::new();
    match args {
        Value::Mapping(map) => {
            for (key, value) in map {
                let Some(key) = key.as_str() else {
                    return Err(DigestlockError::parse(
                        path,
                        format!("service {service:?} has a non-string build arg key"),
                    ));
                };
                let value = match value {
                    Value::Null => from_env(key),
                    Value::String(s) => Some(s.clone()),
                    Value::Bool(b) => Some(b.to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => {
                        return Err(DigestlockError::parse(
                            path,
                            format!("service {service:?} build arg {key} is not a scalar"),
                        ));
                    }
                };
                if let Some(value) = value {
                    let _ = out.insert(key.to_string(), value);
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                let Some(entry) = item.as_str() else {
                    return Err(DigestlockError::parse(
                        path,
                        format!("service {service:?} has a non-string build arg entry"),
                    ));
                };
                match entry.split_once('=') {
                    Some((key, value)) => {
                        let _ = out.insert(key.to_string(), value.to_string());
                    }
                    None => {
                        if let Some(value) = from_env(entry) {
                            let _ = out.insert(entry.to_string(), value);
                        }
                    }
                }
            }
        }
        Value::Null => {}
        _ => {
            return Err(DigestlockError::parse(
                path,
                format!("service {service:?} build args must be a mapping or a list"),
            ));
        }
    }
    Ok(out)
}
