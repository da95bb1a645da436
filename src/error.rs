// Error types for octodash.
// Covers transport failures, upstream error payloads, malformed responses and configuration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OctodashError {
    #[error("GitHub API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Authentication failed: invalid or expired token")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },

    #[error("Upstream error (HTTP {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed upstream response: {0}")]
    Malformed(String),

    #[error("Invalid GitHub name: {0}")]
    InvalidName(String),

    #[error("Pagination for {path} exceeded {pages} pages")]
    PageLimit { path: String, pages: u32 },

    #[error("Missing GitHub token: set OCTODASH_GITHUB_TOKEN or GITHUB_TOKEN")]
    MissingToken,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, OctodashError>;
