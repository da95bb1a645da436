// Cache primer.
// Recomputes dashboard views on fixed intervals and stores them in the view cache.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::config::{Config, DEFAULT_PRIME_INTERVAL};
use crate::dashboard::{Dashboard, DashboardView};
use crate::error::{OctodashError, Result};

/// A view and how often to recompute it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimeTarget {
    pub view: DashboardView,
    pub interval: Duration,
}

/// Keeps a fixed set of views warm in the dashboard's view cache.
pub struct Primer {
    dashboard: Arc<Dashboard>,
    targets: Vec<PrimeTarget>,
}

impl Primer {
    pub fn new(dashboard: Arc<Dashboard>, targets: Vec<PrimeTarget>) -> Self {
        Self { dashboard, targets }
    }

    /// Build the schedule from the `primer` config section.
    ///
    /// An empty section primes every view at the default interval.
    pub fn from_config(dashboard: Arc<Dashboard>, config: &Config) -> Result<Self> {
        let targets = if config.primer.is_empty() {
            DashboardView::ALL
                .into_iter()
                .map(|view| PrimeTarget {
                    view,
                    interval: DEFAULT_PRIME_INTERVAL,
                })
                .collect()
        } else {
            config
                .primer
                .iter()
                .map(|entry| {
                    let view = DashboardView::parse(&entry.path).ok_or_else(|| {
                        OctodashError::Config(format!("cannot prime unknown view {}", entry.path))
                    })?;
                    Ok(PrimeTarget {
                        view,
                        interval: entry.interval(),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };
        Ok(Self::new(dashboard, targets))
    }

    pub fn targets(&self) -> &[PrimeTarget] {
        &self.targets
    }

    pub fn dashboard(&self) -> &Arc<Dashboard> {
        &self.dashboard
    }

    /// Recompute one view through the normal read path and store it.
    ///
    /// On failure the previously stored value stays in place. A failed
    /// snapshot write is logged but does not fail the refresh, since readers
    /// already see the new value.
    pub async fn refresh(&self, view: DashboardView) -> Result<Value> {
        let views = self.dashboard.views();
        views.bypass_once(view.path());

        let value = match self.dashboard.read(view.path()).await {
            Ok(value) => value,
            Err(e) => {
                warn!(%view, error = %e, "view refresh failed, keeping previous value");
                return Err(e);
            }
        };

        if let Err(e) = views.store(view.path(), value.clone()) {
            warn!(%view, error = %e, "view primed but snapshot write failed");
        }
        info!(%view, "view primed");
        Ok(value)
    }

    /// Refresh every target once, in order. Returns how many succeeded.
    pub async fn refresh_all(&self) -> usize {
        let mut primed = 0;
        for target in &self.targets {
            if self.refresh(target.view).await.is_ok() {
                primed += 1;
            }
        }
        primed
    }

    /// Spawn one timer per target. Each refreshes immediately, then on its interval.
    ///
    /// The timers stop when the returned handle is dropped or shut down.
    pub fn start(self: Arc<Self>) -> PrimerHandle {
        let mut tasks = JoinSet::new();
        for target in self.targets.iter().copied() {
            let primer = Arc::clone(&self);
            tasks.spawn(async move {
                let mut ticker = interval(target.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    // refresh logs its own failures; the next tick retries.
                    let _ = primer.refresh(target.view).await;
                }
            });
        }
        info!(targets = self.targets.len(), "primer started");
        PrimerHandle { tasks }
    }
}

/// Running primer timers.
pub struct PrimerHandle {
    tasks: JoinSet<()>,
}

impl PrimerHandle {
    /// Number of timers still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every timer and wait for them to wind down.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        info!("primer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer, extra: &str) -> Config {
        Config::from_yaml(&format!(
            "github:\n  api_url: {}\norgs: [acme]\nmilestone_repo: acme/web\n{}",
            server.uri(),
            extra
        ))
        .unwrap()
    }

    fn primer_for(server: &MockServer, extra: &str) -> Primer {
        let config = config_for(server, extra);
        let dashboard = Arc::new(Dashboard::new(&config, "server-token").unwrap());
        Primer::from_config(dashboard, &config).unwrap()
    }

    async fn mount_members(server: &MockServer, logins: Value) {
        Mock::given(path("/orgs/acme/members"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(logins))
            .mount(server)
            .await;
        Mock::given(path("/orgs/acme/members"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
    }

    async fn request_count(server: &MockServer) -> usize {
        server.received_requests().await.unwrap().len()
    }

    #[tokio::test]
    async fn test_from_config_defaults_to_every_view() {
        let server = MockServer::start().await;
        let primer = primer_for(&server, "");

        assert_eq!(primer.targets().len(), DashboardView::ALL.len());
        assert!(
            primer
                .targets()
                .iter()
                .all(|t| t.interval == DEFAULT_PRIME_INTERVAL)
        );
    }

    #[tokio::test]
    async fn test_from_config_reads_entries() {
        let server = MockServer::start().await;
        let primer = primer_for(
            &server,
            "primer:\n  - path: /members\n    interval_secs: 60\n  - path: /repos/\n",
        );

        assert_eq!(
            primer.targets(),
            &[
                PrimeTarget {
                    view: DashboardView::Members,
                    interval: Duration::from_secs(60),
                },
                PrimeTarget {
                    view: DashboardView::Repos,
                    interval: DEFAULT_PRIME_INTERVAL,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_from_config_rejects_unknown_view() {
        let server = MockServer::start().await;
        let config = config_for(&server, "primer:\n  - path: /settings\n");
        let dashboard = Arc::new(Dashboard::new(&config, "server-token").unwrap());

        let result = Primer::from_config(dashboard, &config);

        assert!(matches!(result, Err(OctodashError::Config(_))));
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_view() {
        let server = MockServer::start().await;
        mount_members(&server, json!([{"login": "ann"}])).await;
        let primer = primer_for(&server, "");
        let views = primer.dashboard().views();
        views.store("/members", json!([{"login": "stale"}])).unwrap();

        let value = primer.refresh(DashboardView::Members).await.unwrap();

        assert_eq!(value[0]["login"], "ann");
        assert_eq!(*views.peek("/members").unwrap(), json!([{"login": "ann"}]));
        assert!(!views.is_bypassed("/members"));
    }

    #[tokio::test]
    async fn test_primed_view_is_served_without_upstream_calls() {
        let server = MockServer::start().await;
        mount_members(&server, json!([{"login": "ann"}])).await;
        // A zero TTL turns off the response cache, so only the view cache can
        // answer the second read.
        let primer = primer_for(&server, "cache:\n  ttl_secs: 0\n");
        primer.refresh(DashboardView::Members).await.unwrap();
        let after_prime = request_count(&server).await;

        let value = primer.dashboard().read("/members").await.unwrap();

        assert_eq!(value[0]["login"], "ann");
        assert_eq!(request_count(&server).await, after_prime);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_value() {
        let server = MockServer::start().await;
        Mock::given(path("/orgs/acme/members"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "down"})))
            .mount(&server)
            .await;
        let primer = primer_for(&server, "");
        let views = primer.dashboard().views();
        views.store("/members", json!([{"login": "kept"}])).unwrap();

        let result = primer.refresh(DashboardView::Members).await;

        assert!(result.is_err());
        assert_eq!(*views.peek("/members").unwrap(), json!([{"login": "kept"}]));
        assert!(!views.is_bypassed("/members"));
    }

    #[tokio::test]
    async fn test_refresh_all_counts_successes() {
        let server = MockServer::start().await;
        mount_members(&server, json!([{"login": "ann"}])).await;
        Mock::given(path("/orgs/acme/repos"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let primer = primer_for(&server, "primer:\n  - path: /members\n  - path: /repos\n");

        assert_eq!(primer.refresh_all().await, 1);
        assert!(primer.dashboard().views().peek("/repos").is_none());
    }

    #[tokio::test]
    async fn test_snapshot_failure_still_primes() {
        let server = MockServer::start().await;
        mount_members(&server, json!([{"login": "ann"}])).await;
        let temp_dir = TempDir::new().unwrap();
        let persist_dir = temp_dir.path().join("views");
        let primer = primer_for(
            &server,
            &format!(
                "primer:\n  - path: /members\ncache:\n  persist_dir: {}\n",
                persist_dir.display()
            ),
        );
        // A plain file where the snapshot directory should be.
        std::fs::write(&persist_dir, "not a directory").unwrap();

        let value = primer.refresh(DashboardView::Members).await.unwrap();

        assert_eq!(value, json!([{"login": "ann"}]));
        let views = primer.dashboard().views();
        assert_eq!(*views.peek("/members").unwrap(), json!([{"login": "ann"}]));
        assert_eq!(primer.refresh_all().await, 1);
    }

    /// Primer for `/members` on a short real-time interval, with the
    /// response cache off so every tick reaches the server.
    fn fast_primer(server: &MockServer) -> Arc<Primer> {
        let config = config_for(server, "cache:\n  ttl_secs: 0\n");
        let dashboard = Arc::new(Dashboard::new(&config, "server-token").unwrap());
        Arc::new(Primer::new(
            dashboard,
            vec![PrimeTarget {
                view: DashboardView::Members,
                interval: Duration::from_millis(100),
            }],
        ))
    }

    async fn first_page_requests(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.query_pairs().any(|(k, v)| k == "page" && v == "1"))
            .count()
    }

    /// Page 1 answers `ann` once, then `bob`; page 2 is always empty.
    async fn mount_changing_members(server: &MockServer) {
        Mock::given(path("/orgs/acme/members"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"login": "ann"}])))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(server)
            .await;
        mount_members(server, json!([{"login": "bob"}])).await;
    }

    async fn wait_for_login(views: &crate::cache::ViewCache, login: &str) {
        for _ in 0..500 {
            if views
                .peek("/members")
                .is_some_and(|v| v[0]["login"] == login)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("/members never became {}", login);
    }

    #[tokio::test]
    async fn test_timer_repeats_until_shutdown() {
        let server = MockServer::start().await;
        mount_changing_members(&server).await;
        let primer = fast_primer(&server);

        let handle = Arc::clone(&primer).start();
        let views = primer.dashboard().views();
        wait_for_login(views, "bob").await;
        assert!(first_page_requests(&server).await >= 2);

        handle.shutdown().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stopped_at = first_page_requests(&server).await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(first_page_requests(&server).await, stopped_at);
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_timers() {
        let server = MockServer::start().await;
        mount_changing_members(&server).await;
        let primer = fast_primer(&server);

        let handle = Arc::clone(&primer).start();
        wait_for_login(primer.dashboard().views(), "bob").await;

        drop(handle);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stopped_at = first_page_requests(&server).await;
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(first_page_requests(&server).await, stopped_at);
    }

    #[tokio::test]
    async fn test_start_primes_immediately() {
        let server = MockServer::start().await;
        mount_members(&server, json!([{"login": "ann"}])).await;
        let primer = Arc::new(primer_for(&server, "primer:\n  - path: /members\n"));

        let handle = Arc::clone(&primer).start();
        assert_eq!(handle.len(), 1);

        let views = primer.dashboard().views();
        for _ in 0..500 {
            if views.peek("/members").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*views.peek("/members").unwrap(), json!([{"login": "ann"}]));

        handle.shutdown().await;
    }
}
