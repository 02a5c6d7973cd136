//! URL filtering applied by the output stage before anything is written.
//!
//! Owned by the single output consumer, so the seen-set needs no locking.

use std::collections::HashSet;
use url::Url;

/// Rejects blacklisted extensions and paths, and optionally drops URLs whose
/// `host + path` has already been emitted.
#[derive(Debug, Default)]
pub struct UrlFilter {
    extensions: HashSet<String>,
    paths: Vec<String>,
    remove_parameters: bool,
    seen: HashSet<String>,
}

impl UrlFilter {
    /// Build a filter.
    ///
    /// Extensions are compared case-insensitively and may be given with or
    /// without the leading dot. Empty entries are ignored.
    pub fn new<E, P>(extensions: E, paths: P, remove_parameters: bool) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        let paths = paths
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            extensions,
            paths,
            remove_parameters,
            seen: HashSet::new(),
        }
    }

    fn is_passthrough(&self) -> bool {
        self.extensions.is_empty() && self.paths.is_empty() && !self.remove_parameters
    }

    /// Decide whether `raw` should be written.
    ///
    /// With any filter active, URLs that do not parse are rejected.
    pub fn accept(&mut self, raw: &str) -> bool {
        if self.is_passthrough() {
            return true;
        }
        let Ok(url) = Url::parse(raw) else {
            return false;
        };
        let path = url.path();

        if let Some(ext) = extension(path) {
            if self.extensions.contains(&ext) {
                return false;
            }
        }

        if self.paths.iter().any(|p| path.contains(p.as_str())) {
            return false;
        }

        if self.remove_parameters {
            let host = url.host_str().unwrap_or_default();
            let key = match url.port() {
                Some(port) => format!("{host}:{port}{path}"),
                None => format!("{host}{path}"),
            };
            if !self.seen.insert(key) {
                return false;
            }
        }

        true
    }
}

/// Lowercased final dot-suffix of the last non-empty path segment, if any.
fn extension(path: &str) -> Option<String> {
    let base = path.trim_end_matches('/').rsplit('/').next()?;
    let (_, ext) = base.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}
