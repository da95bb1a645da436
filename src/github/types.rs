// GitHub API record types.
// Upstream records stay as JSON; these helpers read the few fields the dashboard depends on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Label that marks an issue as top priority.
pub const PRIORITY_LABEL: &str = "p1";

/// Field access on an upstream record.
///
/// Missing or wrong-typed fields read as `None`/`false` so that a sparse or
/// odd record never aborts an aggregation.
pub trait Record {
    /// A string field at the top level of the record.
    fn str_field(&self, key: &str) -> Option<&str>;

    /// Names of the record's labels.
    fn label_names(&self) -> Vec<&str>;

    /// Whether the record carries a label with exactly this name.
    fn has_label(&self, name: &str) -> bool {
        self.label_names().iter().any(|label| *label == name)
    }

    /// Milestone due date, if present and parseable.
    fn due_on(&self) -> Option<DateTime<Utc>> {
        self.str_field("due_on")
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Record for Value {
    fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn label_names(&self) -> Vec<&str> {
        self.get("labels")
            .and_then(Value::as_array)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|label| label.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Milestone `number` as an integer.
pub fn milestone_number(milestone: &Value) -> Option<u64> {
    milestone.get("number").and_then(Value::as_u64)
}

/// Whether a non-array payload is GitHub's error shape (`{"message": ...}`).
pub fn error_indicator(payload: &Value) -> Option<&str> {
    let object = payload.as_object()?;
    let message = object.get("message")?.as_str()?;
    // Error bodies carry message and documentation_url, nothing else.
    let only_error_keys = object
        .keys()
        .all(|k| matches!(k.as_str(), "message" | "documentation_url" | "errors" | "status"));
    only_error_keys.then_some(message)
}

/// Issues split by priority label, each half keeping input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionedIssues {
    pub priority: Vec<Value>,
    pub other: Vec<Value>,
}

/// Which of the authenticated user's issues to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MyIssuesFilter {
    Assigned,
    Created,
    Mentioned,
    Subscribed,
}

impl MyIssuesFilter {
    /// Value of GitHub's `filter` query parameter.
    pub fn as_param(&self) -> &'static str {
        match self {
            MyIssuesFilter::Assigned => "assigned",
            MyIssuesFilter::Created => "created",
            MyIssuesFilter::Mentioned => "mentioned",
            MyIssuesFilter::Subscribed => "subscribed",
        }
    }
}

/// Body for creating an issue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}

/// Rate limit information from response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    pub reset: u64,
}
