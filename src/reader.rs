//! Record reading
//!
//! Thin query layer over a [`RecordSource`]. Applies the half-open window rule
//! on top of the source's own query, orders results, and degrades missing read
//! permission to an empty result.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::schema::{RawRecord, RecordKind};
use crate::source::RecordSource;
use crate::types::TimeWindow;

/// Raw records grouped by kind, each list ordered by start time then id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordBatch {
    by_kind: HashMap<RecordKind, Vec<RawRecord>>,
}

impl RecordBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group records by kind
    pub fn from_records(records: impl IntoIterator<Item = RawRecord>) -> Self {
        let mut batch = Self::new();
        for record in records {
            batch.by_kind.entry(record.kind).or_default().push(record);
        }
        for list in batch.by_kind.values_mut() {
            sort_records(list);
        }
        batch
    }

    /// Set the records of one kind, replacing any already present
    pub fn insert(&mut self, kind: RecordKind, mut records: Vec<RawRecord>) {
        sort_records(&mut records);
        self.by_kind.insert(kind, records);
    }

    /// Records of `kind`, empty when none were read
    pub fn get(&self, kind: RecordKind) -> &[RawRecord] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Keep only records for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&RawRecord) -> bool) {
        for list in self.by_kind.values_mut() {
            list.retain(|record| keep(record));
        }
    }

    /// Drop every kind not listed in `kinds`, returning the dropped kinds
    pub fn restrict_to(&mut self, kinds: &[RecordKind]) -> Vec<RecordKind> {
        let mut dropped: Vec<RecordKind> = self
            .by_kind
            .keys()
            .filter(|kind| !kinds.contains(kind))
            .copied()
            .collect();
        dropped.sort();
        for kind in &dropped {
            self.by_kind.remove(kind);
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sort_records(records: &mut [RawRecord]) {
    records.sort_by(|a, b| {
        a.start_time
            .cmp(&b.start_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Reads raw records from a source
#[derive(Clone)]
pub struct RecordReader {
    source: Arc<dyn RecordSource>,
}

impl RecordReader {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self { source }
    }

    /// Read records of one kind whose point in time lies in `[start, end)`.
    ///
    /// Propagates [`SyncError::PermissionDenied`]; use [`RecordReader::read_batch`]
    /// for the degrading variant.
    pub async fn read(&self, kind: RecordKind, window: TimeWindow) -> Result<Vec<RawRecord>> {
        let mut records = self.source.read_records(kind, window).await?;
        records.retain(|record| window.contains(record.point_in_time()));
        sort_records(&mut records);
        Ok(records)
    }

    /// Read several kinds into one batch. Kinds without read permission
    /// contribute no records.
    pub async fn read_batch(&self, kinds: &[RecordKind], window: TimeWindow) -> Result<RecordBatch> {
        let mut batch = RecordBatch::new();
        for &kind in kinds {
            let records = self.read_permitted(kind, window).await?;
            tracing::debug!(%kind, count = records.len(), "read records");
            batch.insert(kind, records);
        }
        Ok(batch)
    }

    /// Stage segments making up a sleep session: segments lying within the
    /// session's bounds, both ends inclusive.
    pub async fn read_sleep_stages(&self, session: &RawRecord) -> Result<Vec<RawRecord>> {
        let window = TimeWindow::new(session.start_time, session.end_time);
        let mut stages = self
            .source
            .read_records(RecordKind::SleepStage, window)
            .await
            .or_else(permission_as_empty)?;
        stages.retain(|stage| {
            stage.start_time >= session.start_time && stage.end_time <= session.end_time
        });
        sort_records(&mut stages);
        Ok(stages)
    }

    async fn read_permitted(&self, kind: RecordKind, window: TimeWindow) -> Result<Vec<RawRecord>> {
        self.read(kind, window).await.or_else(permission_as_empty)
    }
}

fn permission_as_empty(err: SyncError) -> Result<Vec<RawRecord>> {
    match err {
        SyncError::PermissionDenied { kind } => {
            tracing::warn!(%kind, "read permission missing; treating as no records");
            Ok(Vec::new())
        }
        other => Err(other),
    }
}
