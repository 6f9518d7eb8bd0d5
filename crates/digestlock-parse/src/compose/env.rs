//! Interpolation environment for compose files.
//!
//! Variables come from an optional `.env` file next to the compose file,
//! overlaid by the process environment, which wins on key collision.

use std::collections::HashMap;
use std::path::Path;

use digestlock_common::constants::DOTENV_FILE;
use digestlock_common::error::{DigestlockError, Result};

/// Variables available to `${VAR}` interpolation and build-arg filling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Merges `.env` values with process values; process values win.
    pub fn from_parts<I>(dotenv: HashMap<String, String>, process: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut vars = dotenv;
        vars.extend(process);
        Self { vars }
    }

    /// Loads `.env` from `dir` (if present) and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing `.env` file cannot be read.
    pub fn load(dir: &Path) -> Result<Self> {
        let dotenv_path = dir.join(DOTENV_FILE);
        let dotenv = if dotenv_path.is_file() {
            let content = std::fs::read_to_string(&dotenv_path)
                .map_err(|e| DigestlockError::io(&dotenv_path, e))?;
            tracing::debug!(path = %dotenv_path.display(), "loaded .env file");
            parse_dotenv(&content)
        } else {
            HashMap::new()
        };
        Ok(Self::from_parts(dotenv, std::env::vars()))
    }

    /// Looks up a variable.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

/// Parses `KEY=VALUE` lines, ignoring comments, blank lines and `export`.
#[must_use]
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), dotenv_value(value.trim())))
        })
        .collect()
}

fn dotenv_value(raw: &str) -> String {
    for quote in ['"', '\''] {
        if let Some(inner) = raw
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    // Unquoted values end at an inline comment.
    raw.split_once(" #")
        .map_or(raw, |(value, _)| value)
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dotenv_handles_quotes_comments_and_export() {
        let vars = parse_dotenv(
            "# comment\nIMAGE=node\nexport TAG=\"20-alpine\"\nQUOTED='a b'\nINLINE=x # note\n\nBROKEN\n",
        );
        assert_eq!(vars.get("IMAGE").map(String::as_str), Some("node"));
        assert_eq!(vars.get("TAG").map(String::as_str), Some("20-alpine"));
        assert_eq!(vars.get("QUOTED").map(String::as_str), Some("a b"));
        assert_eq!(vars.get("INLINE").map(String::as_str), Some("x"));
        assert!(!vars.contains_key("BROKEN"));
    }

    #[test]
    fn process_environment_wins_over_dotenv() {
        let dotenv = HashMap::from([
            ("TAG".to_string(), "from-dotenv".to_string()),
            ("ONLY_DOTENV".to_string(), "yes".to_string()),
        ]);
        let env = Environment::from_parts(
            dotenv,
            vec![("TAG".to_string(), "from-process".to_string())],
        );
        assert_eq!(env.get("TAG"), Some("from-process"));
        assert_eq!(env.get("ONLY_DOTENV"), Some("yes"));
    }

    #[test]
    fn load_reads_dotenv_next_to_compose_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join(".env"),
            "DIGESTLOCK_TEST_ONLY_IN_DOTENV=present\n",
        )
        .expect("write");
        let env = Environment::load(dir.path()).expect("load");
        assert_eq!(env.get("DIGESTLOCK_TEST_ONLY_IN_DOTENV"), Some("present"));
    }

    #[test]
    fn load_without_dotenv_is_fine() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(Environment::load(dir.path()).is_ok());
    }
}
