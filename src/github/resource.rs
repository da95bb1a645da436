// Canonical upstream resource paths.
// Every cached read is keyed by one of these, so parameter order and encoding must be stable.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};

/// An upstream query: a path plus query parameters.
///
/// Parameters are kept sorted so two logically identical queries render to
/// the same string regardless of the order they were added in. Pagination
/// parameters are added by the fetcher and never appear here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourcePath {
    path: String,
    params: BTreeMap<String, String>,
    scope: Option<String>,
}

impl ResourcePath {
    /// Create a resource path with no query parameters.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self {
            path: normalize_path(path.as_ref()),
            params: BTreeMap::new(),
            scope: None,
        }
    }

    /// Add a query parameter. A repeated key replaces the earlier value.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Scope the cache key to a caller token.
    ///
    /// Used for reads made with a user's own token, whose results differ per
    /// user. Only a digest of the token ends up in the key.
    pub fn scoped_to_token(mut self, token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        // 16 hex chars is plenty to separate users without keeping the token around.
        self.scope = Some(hex::encode(&digest[..8]));
        self
    }

    /// The bare path, without query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters in canonical order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render the path and query string, ready to append to the API base URL.
    pub fn request_target(&self) -> String {
        if self.params.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }

    /// The cache key for this resource.
    pub fn cache_key(&self) -> String {
        match &self.scope {
            Some(scope) => format!("{}#{}", self.request_target(), scope),
            None => self.request_target(),
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_key())
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
