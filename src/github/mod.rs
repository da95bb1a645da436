// GitHub API module.
// Provides the HTTP client, pagination, resource paths, and record helpers.

pub mod client;
pub mod paginate;
pub mod resource;
pub mod types;

pub use client::{ClientOptions, GitHubClient};
pub use paginate::Paginator;
pub use resource::ResourcePath;
pub use types::*;
