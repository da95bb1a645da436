// Paginated fetching of GitHub list endpoints.
// Follows `page` until an empty array comes back and flattens the result.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{OctodashError, Result};

use super::client::GitHubClient;
use super::resource::ResourcePath;
use super::types::error_indicator;

/// GitHub pages are 1-based; `page=0` is served as page 1.
pub const FIRST_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// Walks every page of a list endpoint.
pub struct Paginator<'a> {
    client: &'a GitHubClient,
    per_page: u32,
    max_pages: u32,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a GitHubClient, per_page: u32, max_pages: u32) -> Self {
        Self {
            client,
            per_page,
            max_pages,
        }
    }

    /// Fetch every page of `resource`.
    ///
    /// List endpoints come back as one flattened JSON array. An endpoint that
    /// answers the first page with an object is a single-record resource and
    /// that object is returned as-is, unless it is an error body. Any failure
    /// on any page fails the whole fetch.
    pub async fn fetch_all(&self, resource: &ResourcePath, token: Option<&str>) -> Result<Value> {
        let target = resource.request_target();
        let mut items: Vec<Value> = Vec::new();
        let mut page = FIRST_PAGE;
        let mut filled_pages = 0u32;

        loop {
            let query = [
                ("page", page.to_string()),
                ("per_page", self.per_page.to_string()),
            ];
            let payload = self.client.get(&target, &query, token).await?;

            match payload {
                Value::Array(batch) if batch.is_empty() => {
                    debug!(%target, pages = filled_pages, items = items.len(), "pagination complete");
                    return Ok(Value::Array(items));
                }
                Value::Array(batch) => {
                    debug!(%target, page, count = batch.len(), "fetched page");
                    items.extend(batch);
                    filled_pages += 1;
                    if filled_pages > self.max_pages {
                        warn!(%target, max_pages = self.max_pages, "page ceiling reached");
                        return Err(OctodashError::PageLimit {
                            path: target,
                            pages: self.max_pages,
                        });
                    }
                }
                other => {
                    if let Some(message) = error_indicator(&other) {
                        return Err(OctodashError::Upstream {
                            status: 200,
                            message: message.to_string(),
                        });
                    }
                    if page == FIRST_PAGE {
                        return Ok(other);
                    }
                    return Err(OctodashError::Malformed(format!(
                        "{} page {} was not a list",
                        target, page
                    )));
                }
            }

            page += 1;
        }
    }
}
