// Cross-resource aggregation.
// Concurrent fan-out with fail-fast joins, identity dedup, priority partitioning, milestone selection.

use std::collections::HashSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use futures::stream::FuturesUnordered;
use serde_json::Value;

use crate::error::Result;
use crate::github::types::{PRIORITY_LABEL, PartitionedIssues, Record};

/// How many milestones the upcoming view covers.
pub const UPCOMING_MILESTONES: usize = 6;

/// Run `fetch` for every target concurrently and flatten the results.
///
/// Array results are spliced in, anything else is appended as one element.
/// Results are merged in completion order. The first failure fails the whole
/// fan-out and the remaining requests are dropped.
pub async fn fan_out<T, F, Fut>(targets: impl IntoIterator<Item = T>, fetch: F) -> Result<Vec<Value>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut pending: FuturesUnordered<Fut> = targets.into_iter().map(fetch).collect();
    let mut merged = Vec::new();

    while let Some(value) = pending.try_next().await? {
        match value {
            Value::Array(items) => merged.extend(items),
            other => merged.push(other),
        }
    }
    Ok(merged)
}

/// Drop records whose identity was already seen; the first occurrence wins.
///
/// Records without an identity never match anything and are kept.
pub fn dedup_by<F>(records: Vec<Value>, identity: F) -> Vec<Value>
where
    F: Fn(&Value) -> Option<String>,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match identity(record) {
            Some(key) => seen.insert(key),
            None => true,
        })
        .collect()
}

/// Dedup records by a top-level string field.
pub fn dedup_by_field(records: Vec<Value>, field: &str) -> Vec<Value> {
    dedup_by(records, |record| record.str_field(field).map(String::from))
}

/// Split issues into those labelled `p1` and the rest.
pub fn partition_priority(issues: Vec<Value>) -> PartitionedIssues {
    let (priority, other): (Vec<Value>, Vec<Value>) = issues
        .into_iter()
        .partition(|issue| issue.has_label(PRIORITY_LABEL));
    PartitionedIssues { priority, other }
}

/// Index of the first milestone due after `now`.
fn first_future(milestones: &[Value], now: DateTime<Utc>) -> Option<usize> {
    milestones
        .iter()
        .position(|m| m.due_on().is_some_and(|due| due > now))
}

/// The milestone currently being worked on.
///
/// That is the first one, in upstream order, whose due date is still ahead.
/// When none is, this falls back to the last milestone listed.
pub fn current_milestone(milestones: &[Value], now: DateTime<Utc>) -> Option<&Value> {
    match first_future(milestones, now) {
        Some(index) => milestones.get(index),
        None => milestones.last(),
    }
}

/// The milestone after the current one, clamped to the last listed.
pub fn next_milestone(milestones: &[Value], now: DateTime<Utc>) -> Option<&Value> {
    let last = milestones.len().checked_sub(1)?;
    let index = first_future(milestones, now).map_or(last, |i| (i + 1).min(last));
    milestones.get(index)
}

/// The first milestones as upstream returned them, unsorted.
pub fn upcoming(milestones: &[Value]) -> &[Value] {
    &milestones[..milestones.len().min(UPCOMING_MILESTONES)]
}
