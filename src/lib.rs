// octodash: GitHub aggregation and caching for team dashboards.
// Fetches, merges and caches org-wide GitHub data and keeps dashboard views warm.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod github;
pub mod logging;
pub mod primer;

pub use cache::{ResponseCache, ViewCache};
pub use config::Config;
pub use dashboard::{Dashboard, DashboardView};
pub use error::{OctodashError, Result};
pub use github::{GitHubClient, MyIssuesFilter, NewIssue, PartitionedIssues, ResourcePath};
pub use primer::{PrimeTarget, Primer, PrimerHandle};
