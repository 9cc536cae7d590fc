//! Change reconciliation
//!
//! Turns a drained change feed into the same [`ProcessedResourceData`] a full
//! read of the affected records would have produced:
//! - Only the latest upsertion of each record id is kept
//! - Upserted records are grouped by record kind
//! - Sub-resource targets fold onto their parent resource
//! - Records ending at or after the cutoff are held back, and platform
//!   aggregates stop at the cutoff too
//! - The filtered batch goes through the shared [`ResourcePipeline`]

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::Result;
use crate::pipeline::{resource_kinds, ResourcePipeline};
use crate::reader::RecordBatch;
use crate::schema::{ChangeSet, RawRecord};
use crate::types::{ProcessedResourceData, Resource};

/// Reconciles change-feed upsertions into normalized resources
#[derive(Clone)]
pub struct ChangeReconciler {
    pipeline: ResourcePipeline,
}

impl ChangeReconciler {
    pub fn new(pipeline: ResourcePipeline) -> Self {
        Self { pipeline }
    }

    /// Reconcile `changes` for `resource`.
    ///
    /// With no `cutoff` every upserted record is kept.
    pub async fn reconcile(
        &self,
        resource: Resource,
        changes: &ChangeSet,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<ProcessedResourceData> {
        let target = resource.remapped();
        let batch = Self::select(target, changes, cutoff);
        self.pipeline.normalize_until(target, &batch, cutoff).await
    }

    /// Group, restrict and cutoff-filter the upsertions relevant to `resource`
    fn select(
        resource: Resource,
        changes: &ChangeSet,
        cutoff: Option<DateTime<Utc>>,
    ) -> RecordBatch {
        // An edited record appears once per write; the last write is current.
        let mut latest: HashMap<&str, &RawRecord> = HashMap::new();
        for record in changes.upsertions() {
            latest.insert(record.id.as_str(), record);
        }
        let mut batch = RecordBatch::from_records(latest.into_values().cloned());

        let dropped = batch.restrict_to(resource_kinds(resource));
        if !dropped.is_empty() {
            tracing::debug!(%resource, ?dropped, "ignoring change kinds outside resource");
        }

        let deletions = changes.deletion_count();
        if deletions > 0 {
            tracing::debug!(%resource, deletions, "ignoring deletions");
        }

        if let Some(cutoff) = cutoff {
            batch.retain(|record| record.point_in_time() < cutoff);
        }

        batch
    }
}
