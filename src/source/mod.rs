//! Health platform record sources
//!
//! This module defines the capability interface the sync engine reads from.
//! Each target platform provides one implementation; the normalization core
//! depends only on this trait, never on concrete platform types.

mod memory;

pub use memory::{MemorySource, SourceFixture, DEFAULT_PAGE_SIZE};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::schema::{ChangeSet, ChangeToken, RawRecord, RecordKind};
use crate::types::{AggregateMetric, TimeWindow};

/// Trait for on-device health record sources
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Query raw records of one kind for a window.
    ///
    /// Returns an empty list when nothing matches. Fails with
    /// [`SyncError::PermissionDenied`](crate::SyncError::PermissionDenied) only
    /// when read access to `kind` was never granted.
    async fn read_records(&self, kind: RecordKind, window: TimeWindow) -> Result<Vec<RawRecord>>;

    /// Record kinds the user currently allows reading
    async fn granted_permissions(&self) -> Result<HashSet<RecordKind>>;

    /// Compute totals over `[window.start, window.end)` with the platform's
    /// native aggregation. Metrics with no underlying data are omitted.
    async fn aggregate(
        &self,
        window: TimeWindow,
        metrics: &HashSet<AggregateMetric>,
    ) -> Result<HashMap<AggregateMetric, f64>>;

    /// Issue a token marking the current head of the change log for `kinds`
    async fn changes_token(&self, kinds: &[RecordKind]) -> Result<ChangeToken>;

    /// Fetch the page of changes following `token`
    async fn changes(&self, token: &ChangeToken) -> Result<ChangeSet>;
}
