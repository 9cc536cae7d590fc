//! In-memory record source
//!
//! Holds records, a granted-permission set and a sequential change log. Used by
//! the CLI to replay JSON fixtures and by tests as a stand-in platform.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::RecordSource;
use crate::error::{Result, SyncError};
use crate::schema::{Change, ChangeSet, ChangeToken, RawRecord, RecordKind};
use crate::types::{AggregateMetric, TimeWindow};

/// Default number of changes returned per change-feed page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// JSON fixture describing a source's contents
#[derive(Debug, Default, Deserialize)]
pub struct SourceFixture {
    /// Granted record kinds; all kinds when omitted
    #[serde(default)]
    pub granted: Option<Vec<RecordKind>>,
    #[serde(default)]
    pub records: Vec<RawRecord>,
}

struct MemoryState {
    records: Vec<RawRecord>,
    granted: HashSet<RecordKind>,
    log: Vec<Change>,
}

/// In-memory [`RecordSource`]
pub struct MemorySource {
    state: Mutex<MemoryState>,
    page_size: usize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    /// Create an empty source with every permission granted
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                records: Vec::new(),
                granted: RecordKind::ALL.into_iter().collect(),
                log: Vec::new(),
            }),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Limit the number of changes returned per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Build a source from a fixture, validating every record
    pub fn from_fixture(fixture: SourceFixture) -> Result<Self> {
        let source = Self::new();
        if let Some(granted) = fixture.granted {
            source.set_granted(granted);
        }
        for record in fixture.records {
            record.validate()?;
            source.upsert(record);
        }
        Ok(source)
    }

    /// Parse a JSON fixture
    pub fn from_fixture_json(json: &str) -> Result<Self> {
        let fixture: SourceFixture = serde_json::from_str(json)?;
        Self::from_fixture(fixture)
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the granted permission set
    pub fn set_granted(&self, kinds: impl IntoIterator<Item = RecordKind>) {
        self.state().granted = kinds.into_iter().collect();
    }

    /// Insert or replace a record (matched by id) and log the upsertion
    pub fn upsert(&self, record: RawRecord) {
        let mut state = self.state();
        match state.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => state.records.push(record.clone()),
        }
        state.log.push(Change::Upsertion { record });
    }

    /// Remove a record and log the deletion
    pub fn delete(&self, record_id: &str) {
        let mut state = self.state();
        state.records.retain(|r| r.id != record_id);
        state.log.push(Change::Deletion {
            record_id: record_id.to_string(),
        });
    }

    pub fn record_count(&self) -> usize {
        self.state().records.len()
    }
}

fn parse_position(token: &ChangeToken) -> Result<usize> {
    token
        .as_str()
        .strip_prefix("mem:")
        .and_then(|seq| seq.parse().ok())
        .ok_or_else(|| SyncError::ChangeFeed(format!("unrecognized change token: {}", token)))
}

fn position_token(position: usize) -> ChangeToken {
    ChangeToken::new(format!("mem:{}", position))
}

#[async_trait]
impl RecordSource for MemorySource {
    async fn read_records(&self, kind: RecordKind, window: TimeWindow) -> Result<Vec<RawRecord>> {
        let state = self.state();
        if !state.granted.contains(&kind) {
            return Err(SyncError::PermissionDenied { kind });
        }

        // Overlap query; callers apply their own window semantics on top.
        Ok(state
            .records
            .iter()
            .filter(|r| r.kind == kind && r.start_time < window.end && r.end_time >= window.start)
            .cloned()
            .collect())
    }

    async fn granted_permissions(&self) -> Result<HashSet<RecordKind>> {
        Ok(self.state().granted.clone())
    }

    async fn aggregate(
        &self,
        window: TimeWindow,
        metrics: &HashSet<AggregateMetric>,
    ) -> Result<HashMap<AggregateMetric, f64>> {
        let state = self.state();
        let mut totals = HashMap::new();

        for metric in metrics {
            let kind = metric.owning_kind();
            if !state.granted.contains(&kind) {
                return Err(SyncError::PermissionDenied { kind });
            }

            let mut matched = false;
            let mut total = 0.0;
            for record in state
                .records
                .iter()
                .filter(|r| r.kind == kind && window.contains(r.start_time))
            {
                let value = match metric {
                    AggregateMetric::ExerciseDurationTotal => {
                        record.duration().num_seconds() as f64 / 60.0
                    }
                    _ => match record.quantity() {
                        Some((value, unit)) => unit.to_canonical(value).0,
                        None => continue,
                    },
                };
                matched = true;
                total += value;
            }

            if matched {
                totals.insert(*metric, total);
            }
        }

        Ok(totals)
    }

    async fn changes_token(&self, _kinds: &[RecordKind]) -> Result<ChangeToken> {
        Ok(position_token(self.state().log.len()))
    }

    async fn changes(&self, token: &ChangeToken) -> Result<ChangeSet> {
        let position = parse_position(token)?;
        let state = self.state();
        if position > state.log.len() {
            return Err(SyncError::ChangeFeed(format!(
                "change token {} is ahead of the log",
                token
            )));
        }

        let end = (position + self.page_size).min(state.log.len());
        Ok(ChangeSet {
            changes: state.log[position..end].to_vec(),
            next_token: position_token(end),
            has_more: end < state.log.len(),
        })
    }
}
