// Configuration loading.
// Reads the org/repo universe, cache bounds, and primer schedule from YAML; secrets come from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{OctodashError, Result};
use crate::github::client::{ClientOptions, GITHUB_API_BASE};
use crate::github::paginate::{DEFAULT_MAX_PAGES, DEFAULT_PER_PAGE};

/// Refresh interval for primer entries that don't set one.
pub const DEFAULT_PRIME_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    /// Organizations whose repos, members and labels are aggregated.
    #[serde(default)]
    pub orgs: Vec<String>,
    /// Repositories outside those orgs, as `owner/name`.
    #[serde(default)]
    pub extra_repos: Vec<String>,
    /// Repository whose milestones drive the milestone views.
    pub milestone_repo: String,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Views kept warm by the primer.
    #[serde(default)]
    pub primer: Vec<PrimerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    /// OAuth app client id, handed to the login flow.
    pub client_id: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Pagination ceiling per resource.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            api_url: default_api_url(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl GitHubConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            base_url: self.api_url.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of upstream responses held in memory.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Age after which a cached upstream response is refetched.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Where view snapshots are written. Unset keeps views in memory only.
    pub persist_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            ttl_secs: default_ttl_secs(),
            persist_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimerEntry {
    /// View path, e.g. `/milestones/current`.
    pub path: String,
    pub interval_secs: Option<u64>,
}

impl PrimerEntry {
    pub fn interval(&self) -> Duration {
        self.interval_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_PRIME_INTERVAL)
    }
}

fn default_api_url() -> String {
    GITHUB_API_BASE.to_string()
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_capacity() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

fn default_ttl_secs() -> u64 {
    crate::cache::DEFAULT_TTL.as_secs()
}

impl Config {
    /// Load configuration from file.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. ./octodash.yaml (current directory)
    /// 3. The platform config directory, e.g. ~/.config/octodash/config.yaml
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = match explicit_path {
            Some(p) if p.exists() => p.to_path_buf(),
            Some(p) => {
                return Err(OctodashError::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            None => Self::find_config_file().ok_or_else(|| {
                OctodashError::Config(
                    "no configuration file found; create ./octodash.yaml or pass --config".into(),
                )
            })?,
        };

        Self::load_from_path(&path)
    }

    fn find_config_file() -> Option<PathBuf> {
        let local = PathBuf::from("octodash.yaml");
        if local.exists() {
            return Some(local);
        }

        ProjectDirs::from("", "", "octodash")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .filter(|path| path.exists())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            OctodashError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.orgs.is_empty() && self.extra_repos.is_empty() {
            return Err(OctodashError::Config(
                "at least one of `orgs` or `extra_repos` must be set".into(),
            ));
        }
        if let Some(repo) = self
            .extra_repos
            .iter()
            .chain(std::iter::once(&self.milestone_repo))
            .find(|r| !is_full_name(r))
        {
            return Err(OctodashError::Config(format!(
                "`{}` is not an owner/name repository",
                repo
            )));
        }
        if self.cache.capacity == 0 {
            return Err(OctodashError::Config("cache.capacity must be positive".into()));
        }
        if self.github.per_page == 0 || self.github.max_pages == 0 {
            return Err(OctodashError::Config(
                "github.per_page and github.max_pages must be positive".into(),
            ));
        }
        if let Some(entry) = self.primer.iter().find(|e| e.interval_secs == Some(0)) {
            return Err(OctodashError::Config(format!(
                "primer interval for {} must be positive",
                entry.path
            )));
        }
        Ok(())
    }

    /// Server-to-server GitHub token.
    ///
    /// Checks OCTODASH_GITHUB_TOKEN first, then GITHUB_TOKEN as fallback.
    pub fn github_token() -> Result<String> {
        token_from(|key| std::env::var(key).ok())
    }
}

fn token_from(lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    ["OCTODASH_GITHUB_TOKEN", "GITHUB_TOKEN"]
        .iter()
        .filter_map(|key| lookup(key))
        .find(|token| !token.trim().is_empty())
        .ok_or(OctodashError::MissingToken)
}

fn is_full_name(repo: &str) -> bool {
    matches!(repo.split_once('/'), Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/'))
}
