//! Incremental change feed
//!
//! The health platform hands out an opaque token marking a position in its
//! change log. Pulling changes with that token yields the records upserted or
//! deleted since, plus the token for the next position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::record::RawRecord;

/// Opaque cursor into the platform change log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(String);

impl ChangeToken {
    pub fn new(token: impl Into<String>) -> Self {
        ChangeToken(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single entry of the change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    Upsertion { record: RawRecord },
    Deletion { record_id: String },
}

/// One page of the change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
    /// Token marking the position after this page
    pub next_token: ChangeToken,
    /// Whether more pages are available after `next_token`
    #[serde(default)]
    pub has_more: bool,
}

impl ChangeSet {
    /// An empty page positioned at `token`
    pub fn empty(token: ChangeToken) -> Self {
        ChangeSet {
            changes: Vec::new(),
            next_token: token,
            has_more: false,
        }
    }

    /// Upserted records, in feed order
    pub fn upsertions(&self) -> impl Iterator<Item = &RawRecord> {
        self.changes.iter().filter_map(|change| match change {
            Change::Upsertion { record } => Some(record),
            Change::Deletion { .. } => None,
        })
    }

    pub fn deletion_count(&self) -> usize {
        self.changes
            .iter()
            .filter(|change| matches!(change, Change::Deletion { .. }))
            .count()
    }

    /// Append a following page, taking over its continuation token
    pub fn extend(&mut self, next: ChangeSet) {
        self.changes.extend(next.changes);
        self.next_token = next.next_token;
        self.has_more = next.has_more;
    }

    /// Earliest start and latest end across upserted records
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.upsertions().fold(None, |span, record| match span {
            None => Some((record.start_time, record.end_time)),
            Some((start, end)) => Some((start.min(record.start_time), end.max(record.end_time))),
        })
    }
}
