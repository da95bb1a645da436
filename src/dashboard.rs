// Dashboard facade.
// Named read and write operations over the GitHub API, backed by the response and view caches.

use std::fmt;
use std::num::NonZeroUsize;

use chrono::Utc;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::aggregate::{self, dedup_by_field, fan_out, partition_priority};
use crate::cache::{ResponseCache, ViewCache};
use crate::config::Config;
use crate::error::{OctodashError, Result};
use crate::github::{
    GitHubClient, MyIssuesFilter, NewIssue, Paginator, PartitionedIssues, RateLimit, Record,
    ResourcePath, milestone_number,
};

/// Aggregate views that can be served from the view cache and kept warm by
/// the primer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DashboardView {
    CurrentMilestone,
    NextMilestone,
    UpcomingMilestones,
    Milestones,
    Repos,
    Members,
    Labels,
}

impl DashboardView {
    pub const ALL: [DashboardView; 7] = [
        DashboardView::CurrentMilestone,
        DashboardView::NextMilestone,
        DashboardView::UpcomingMilestones,
        DashboardView::Milestones,
        DashboardView::Repos,
        DashboardView::Members,
        DashboardView::Labels,
    ];

    /// Canonical request path for the view.
    pub fn path(&self) -> &'static str {
        match self {
            DashboardView::CurrentMilestone => "/milestones/current",
            DashboardView::NextMilestone => "/milestones/next",
            DashboardView::UpcomingMilestones => "/milestones/upcoming",
            DashboardView::Milestones => "/milestones",
            DashboardView::Repos => "/repos",
            DashboardView::Members => "/members",
            DashboardView::Labels => "/labels",
        }
    }

    /// Resolve a request path, ignoring surrounding whitespace and a trailing slash.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.trim();
        let path = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        Self::ALL.into_iter().find(|view| view.path() == path)
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// The dashboard's view of GitHub.
///
/// Every read goes through the response cache. Multi-org and multi-repo
/// reads fan out concurrently and fail as a whole when any member fails.
/// Issue creation always goes straight to GitHub.
pub struct Dashboard {
    client: GitHubClient,
    responses: ResponseCache,
    views: ViewCache,
    orgs: Vec<String>,
    extra_repos: Vec<String>,
    milestone_repo: String,
    per_page: u32,
    max_pages: u32,
}

impl Dashboard {
    /// Build a dashboard from configuration and a server token.
    pub fn new(config: &Config, token: &str) -> Result<Self> {
        let client = GitHubClient::new(token, &config.github.client_options())?;
        let capacity = NonZeroUsize::new(config.cache.capacity)
            .ok_or_else(|| OctodashError::Config("cache.capacity must be positive".into()))?;
        let views = match &config.cache.persist_dir {
            Some(dir) => ViewCache::persistent(dir)?,
            None => ViewCache::new(),
        };

        Ok(Self {
            client,
            responses: ResponseCache::new(capacity, config.cache.ttl()),
            views,
            orgs: config.orgs.clone(),
            extra_repos: config.extra_repos.clone(),
            milestone_repo: config.milestone_repo.clone(),
            per_page: config.github.per_page,
            max_pages: config.github.max_pages,
        })
    }

    /// Build a dashboard using the server token from the environment.
    pub fn from_env(config: &Config) -> Result<Self> {
        let token = Config::github_token()?;
        Self::new(config, &token)
    }

    /// The view cache fed by the primer.
    pub fn views(&self) -> &ViewCache {
        &self.views
    }

    /// Rate limit as of the last upstream response.
    pub fn rate_limit(&self) -> RateLimit {
        self.client.rate_limit()
    }

    // ------------------------------------------------------------------
    // View read path
    // ------------------------------------------------------------------

    /// Serve a view, preferring the view cache.
    ///
    /// A pending bypass flag for the view is consumed here and forces a live
    /// computation.
    pub async fn read(&self, path: &str) -> Result<Value> {
        let view =
            DashboardView::parse(path).ok_or_else(|| OctodashError::NotFound(path.to_string()))?;

        if let Some(cached) = self.views.lookup(view.path()) {
            debug!(%view, "served from view cache");
            return Ok(Value::clone(&cached));
        }
        self.render(view).await
    }

    /// Make the next read of each known view in `paths` recompute.
    ///
    /// Called by webhook handlers when upstream data changes. Unknown paths
    /// are ignored.
    pub fn invalidate_views<'p>(&self, paths: impl IntoIterator<Item = &'p str>) {
        for view in paths.into_iter().filter_map(DashboardView::parse) {
            debug!(%view, "view invalidated");
            self.views.bypass_once(view.path());
        }
    }

    /// Compute a view from upstream data, ignoring the view cache.
    pub async fn render(&self, view: DashboardView) -> Result<Value> {
        match view {
            DashboardView::CurrentMilestone => self.current_milestone().await,
            DashboardView::NextMilestone => self.next_milestone().await,
            DashboardView::UpcomingMilestones => {
                self.upcoming_milestones().await.map(Value::Array)
            }
            DashboardView::Milestones => self.milestones().await.map(Value::Array),
            DashboardView::Repos => self.repos().await.map(Value::Array),
            DashboardView::Members => self.members().await.map(Value::Array),
            DashboardView::Labels => self.labels().await.map(Value::Array),
        }
    }

    // ------------------------------------------------------------------
    // Milestones
    // ------------------------------------------------------------------

    /// Open milestones of the milestone repo, in upstream due-date order.
    pub async fn repo_milestones(&self) -> Result<Vec<Value>> {
        let resource = ResourcePath::new(format!("/repos/{}/milestones", self.milestone_repo))
            .param("state", "open")
            .param("sort", "due_on")
            .param("direction", "asc");
        self.fetch_list(&resource).await
    }

    /// The milestone in progress, or `null` when the repo has none.
    pub async fn current_milestone(&self) -> Result<Value> {
        let milestones = self.repo_milestones().await?;
        Ok(aggregate::current_milestone(&milestones, Utc::now())
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// The milestone after the current one, or `null` when the repo has none.
    pub async fn next_milestone(&self) -> Result<Value> {
        let milestones = self.repo_milestones().await?;
        Ok(aggregate::next_milestone(&milestones, Utc::now())
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// The first few milestones, each with an `issues` array attached.
    pub async fn upcoming_milestones(&self) -> Result<Vec<Value>> {
        let milestones = self.repo_milestones().await?;
        try_join_all(
            aggregate::upcoming(&milestones)
                .iter()
                .map(|milestone| self.with_issues(milestone)),
        )
        .await
    }

    async fn with_issues(&self, milestone: &Value) -> Result<Value> {
        let issues = match milestone_number(milestone) {
            Some(number) => self.milestone_issues(number).await?,
            None => Vec::new(),
        };
        let mut annotated = milestone.clone();
        if let Some(fields) = annotated.as_object_mut() {
            fields.insert("issues".to_string(), Value::Array(issues));
        }
        Ok(annotated)
    }

    /// All issues, open and closed, in a milestone of the milestone repo.
    pub async fn milestone_issues(&self, number: u64) -> Result<Vec<Value>> {
        let resource = ResourcePath::new(format!("/repos/{}/issues", self.milestone_repo))
            .param("milestone", number)
            .param("state", "all");
        self.fetch_list(&resource).await
    }

    pub async fn milestone_issues_by_priority(&self, number: u64) -> Result<PartitionedIssues> {
        self.milestone_issues(number).await.map(partition_priority)
    }

    /// Open milestones across every repo, one per title.
    pub async fn milestones(&self) -> Result<Vec<Value>> {
        let resources = self.repo_names().await?.into_iter().map(|repo| {
            ResourcePath::new(format!("/repos/{}/milestones", repo)).param("state", "open")
        });
        let merged = fan_out(resources, |resource| async move { self.fetch(&resource).await }).await?;
        Ok(dedup_by_field(merged, "title"))
    }

    // ------------------------------------------------------------------
    // Issues
    // ------------------------------------------------------------------

    /// Open issues for the owner of `token`, split by priority.
    ///
    /// Read with the caller's token and cached per token.
    pub async fn my_issues(&self, token: &str, filter: MyIssuesFilter) -> Result<PartitionedIssues> {
        let resource = ResourcePath::new("/issues")
            .param("filter", filter.as_param())
            .param("state", "open")
            .scoped_to_token(token);
        let issues = self.fetch_with(&resource, Some(token)).await?;
        into_list(&resource, issues).map(partition_priority)
    }

    /// Free-text issue search limited to the configured orgs and repos.
    ///
    /// Returns GitHub's search envelope (`total_count`, `items`) untouched.
    pub async fn search_issues(
        &self,
        query: &str,
        sort: Option<&str>,
        order: Option<&str>,
    ) -> Result<Value> {
        let mut resource = ResourcePath::new("/search/issues")
            .param("q", format!("{} {}", query.trim(), self.scope_qualifiers()));
        if let Some(sort) = sort {
            resource = resource.param("sort", sort);
        }
        if let Some(order) = order {
            resource = resource.param("order", order);
        }
        self.fetch(&resource).await
    }

    /// Create an issue as the caller. Never cached.
    pub async fn create_issue(&self, token: &str, repo: &str, issue: &NewIssue) -> Result<Value> {
        if issue.title.trim().is_empty() {
            return Err(OctodashError::Other("issue title is required".into()));
        }
        let repo = repo_path(repo)?;
        let body = serde_json::to_value(issue)?;
        self.client
            .post(&format!("/repos/{}/issues", repo), &body, Some(token))
            .await
    }

    // ------------------------------------------------------------------
    // Repos, members, labels
    // ------------------------------------------------------------------

    /// Repos of every configured org plus the extra repos, one per full name.
    pub async fn repos(&self) -> Result<Vec<Value>> {
        let org_repos = self
            .orgs
            .iter()
            .map(|org| ResourcePath::new(format!("/orgs/{}/repos", org)));
        let extra = self
            .extra_repos
            .iter()
            .map(|repo| ResourcePath::new(format!("/repos/{}", repo)));

        let merged = fan_out(org_repos.chain(extra), |resource| async move {
            self.fetch(&resource).await
        })
        .await?;
        Ok(dedup_by_field(merged, "full_name"))
    }

    /// Full names of [`repos`](Self::repos).
    pub async fn repo_names(&self) -> Result<Vec<String>> {
        Ok(self
            .repos()
            .await?
            .iter()
            .filter_map(|repo| repo.str_field("full_name").map(String::from))
            .collect())
    }

    /// Members of every configured org, one per login.
    pub async fn members(&self) -> Result<Vec<Value>> {
        let resources = self
            .orgs
            .iter()
            .map(|org| ResourcePath::new(format!("/orgs/{}/members", org)));
        let merged = fan_out(resources, |resource| async move { self.fetch(&resource).await }).await?;
        Ok(dedup_by_field(merged, "login"))
    }

    /// Labels across every repo, one per name.
    pub async fn labels(&self) -> Result<Vec<Value>> {
        let resources = self
            .repo_names()
            .await?
            .into_iter()
            .map(|repo| ResourcePath::new(format!("/repos/{}/labels", repo)));
        let merged = fan_out(resources, |resource| async move { self.fetch(&resource).await }).await?;
        Ok(dedup_by_field(merged, "name"))
    }

    // ------------------------------------------------------------------
    // Users and teams
    // ------------------------------------------------------------------

    pub async fn user(&self, login: &str) -> Result<Value> {
        let login = path_segment("login", login)?;
        self.fetch(&ResourcePath::new(format!("/users/{}", login)))
            .await
    }

    /// Full user records for the members of an org team.
    ///
    /// The team is matched by name, case-insensitively. Only the first page
    /// of members is read.
    pub async fn team_members(&self, org: &str, team_name: &str) -> Result<Vec<Value>> {
        let org = path_segment("org", org)?;
        let teams = self
            .fetch_list(&ResourcePath::new(format!("/orgs/{}/teams", org)))
            .await?;
        let wanted = team_name.to_lowercase();
        let team = teams
            .iter()
            .find(|team| {
                team.str_field("name")
                    .is_some_and(|name| name.to_lowercase() == wanted)
            })
            .ok_or_else(|| OctodashError::NotFound(format!("team {} in {}", team_name, org)))?;
        let slug = team
            .str_field("slug")
            .ok_or_else(|| OctodashError::Malformed(format!("team {} has no slug", team_name)))?;
        let slug = path_segment("team slug", slug)?;

        let resource = ResourcePath::new(format!("/orgs/{}/teams/{}/members", org, slug))
            .param("per_page", self.per_page);
        let target = resource.request_target();
        let members = self
            .responses
            .get_or_fetch(&resource.cache_key(), || self.client.get(&target, &[], None))
            .await?;

        let logins: Vec<String> = into_list(&resource, members)?
            .iter()
            .filter_map(|member| member.str_field("login").map(String::from))
            .collect();
        fan_out(logins, |login| async move { self.user(&login).await }).await
    }

    /// Resolve a session token to its GitHub user.
    ///
    /// Missing tokens, rejected tokens and upstream failures all resolve to
    /// `None`; the session layer treats them alike.
    pub async fn session_user(&self, token: Option<&str>) -> Option<Value> {
        let token = token.map(str::trim).filter(|t| !t.is_empty())?;
        let resource = ResourcePath::new("/user").scoped_to_token(token);

        match self.fetch_with(&resource, Some(token)).await {
            Ok(user) if user.str_field("login").is_some() => Some(user),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "session user lookup failed");
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    async fn fetch(&self, resource: &ResourcePath) -> Result<Value> {
        self.fetch_with(resource, None).await
    }

    async fn fetch_with(&self, resource: &ResourcePath, token: Option<&str>) -> Result<Value> {
        self.responses
            .get_or_fetch(&resource.cache_key(), || async {
                Paginator::new(&self.client, self.per_page, self.max_pages)
                    .fetch_all(resource, token)
                    .await
            })
            .await
    }

    async fn fetch_list(&self, resource: &ResourcePath) -> Result<Vec<Value>> {
        let value = self.fetch(resource).await?;
        into_list(resource, value)
    }

    /// Search qualifiers covering the org/repo universe.
    fn scope_qualifiers(&self) -> String {
        self.orgs
            .iter()
            .map(|org| format!("org:{}", org))
            .chain(self.extra_repos.iter().map(|repo| format!("repo:{}", repo)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Reject a login, org or slug that would not stay a single path segment.
fn path_segment<'a>(kind: &str, value: &'a str) -> Result<&'a str> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && !value.chars().any(|c| {
            matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_whitespace() || c.is_control()
        });
    if valid {
        Ok(value)
    } else {
        Err(OctodashError::InvalidName(format!("{} {:?}", kind, value)))
    }
}

/// Validate an `owner/name` repository.
fn repo_path(repo: &str) -> Result<String> {
    let (owner, name) = repo
        .split_once('/')
        .ok_or_else(|| OctodashError::InvalidName(format!("repository {:?}", repo)))?;
    Ok(format!(
        "{}/{}",
        path_segment("repository owner", owner)?,
        path_segment("repository name", name)?
    ))
}

fn into_list(resource: &ResourcePath, value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(OctodashError::Malformed(format!(
            "{} did not return a list",
            resource
        ))),
    }
}
