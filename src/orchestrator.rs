//! Sync orchestration
//!
//! Drives one sync attempt over a requested set of resources. Each resource is
//! visited once, strictly in sequence:
//! 1. Emit `syncing`
//! 2. Read (backfill) or reconcile (incremental) and normalize
//! 3. Empty result: emit `nothingToSync`, skip the upload
//! 4. Otherwise upload, then emit `synced`
//!
//! Any error aborts the remaining resources and leaves the persisted change
//! token untouched, so a retry starts again from the last good cursor.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::encoder::PayloadEncoder;
use crate::error::{Result, SyncError};
use crate::pipeline::{resource_kinds, ResourcePipeline};
use crate::reconciler::ChangeReconciler;
use crate::schema::{ChangeSet, ChangeToken, RecordKind};
use crate::source::RecordSource;
use crate::status::StatusSink;
use crate::token::ChangeTokenStore;
use crate::types::{ProcessedResourceData, Resource, StatusEvent, SyncStatus, TimeWindow};
use crate::uploader::{UploadContext, Uploader};

/// Full historical sync over an explicit window
#[derive(Debug, Clone)]
pub struct BackfillRequest {
    pub account_id: String,
    pub window: TimeWindow,
    pub resources: Vec<Resource>,
}

/// Sync of everything changed since the persisted token
#[derive(Debug, Clone)]
pub struct IncrementalRequest {
    pub account_id: String,
    pub resources: Vec<Resource>,
    /// Records ending at or after this instant are held back
    pub cutoff: Option<DateTime<Utc>>,
}

/// Final status of one resource in a successful attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceOutcome {
    pub resource: Resource,
    pub status: SyncStatus,
}

/// Result of a successful sync attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub attempt_id: Uuid,
    pub outcomes: Vec<ResourceOutcome>,
    /// Token persisted at the end of the attempt
    pub token: ChangeToken,
}

/// Fold aliases onto their parent resource and drop duplicates
pub fn normalize_resources(requested: &[Resource]) -> Vec<Resource> {
    requested
        .iter()
        .map(|resource| resource.remapped())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Record kinds whose changes a set of resources depends on
fn tracked_kinds(resources: &[Resource]) -> Vec<RecordKind> {
    let mut kinds: BTreeSet<RecordKind> = resources
        .iter()
        .flat_map(|resource| resource_kinds(*resource).iter().copied())
        .collect();
    if resources.contains(&Resource::Sleep) {
        kinds.insert(RecordKind::SleepStage);
    }
    kinds.into_iter().collect()
}

/// Runs sync attempts against injected collaborators
pub struct SyncOrchestrator {
    source: Arc<dyn RecordSource>,
    pipeline: ResourcePipeline,
    reconciler: ChangeReconciler,
    uploader: Arc<dyn Uploader>,
    status: Arc<dyn StatusSink>,
    tokens: Arc<dyn ChangeTokenStore>,
    time_zone_id: String,
    status_delay: Duration,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn RecordSource>,
        uploader: Arc<dyn Uploader>,
        status: Arc<dyn StatusSink>,
        tokens: Arc<dyn ChangeTokenStore>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let tz = config.time_zone()?;
        let pipeline = ResourcePipeline::new(source.clone(), tz, config.fallback_device_model.clone())
            .with_platform_aggregates(config.use_platform_aggregates);

        Ok(Self {
            source,
            reconciler: ChangeReconciler::new(pipeline.clone()),
            pipeline,
            uploader,
            status,
            tokens,
            time_zone_id: tz.name().to_string(),
            status_delay: config.status_delay(),
        })
    }

    /// Sync every requested resource over `request.window` from direct reads.
    ///
    /// The change token is taken before reading and persisted only once all
    /// resources have completed.
    pub async fn backfill(&self, request: &BackfillRequest) -> Result<SyncReport> {
        let attempt_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_attempt", %attempt_id, mode = "backfill");
        self.run_backfill(attempt_id, request)
            .instrument(span)
            .await
            .inspect_err(log_failure)
    }

    /// Sync every requested resource from the change feed since the persisted token
    pub async fn sync_changes(&self, request: &IncrementalRequest) -> Result<SyncReport> {
        let attempt_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_attempt", %attempt_id, mode = "incremental");
        self.run_incremental(attempt_id, request)
            .instrument(span)
            .await
            .inspect_err(log_failure)
    }

    async fn run_backfill(&self, attempt_id: Uuid, request: &BackfillRequest) -> Result<SyncReport> {
        let resources = normalize_resources(&request.resources);
        let window = request.window;
        tracing::info!(?resources, start = %window.start, end = %window.end, "starting backfill");

        let token = self.source.changes_token(&tracked_kinds(&resources)).await?;
        let ctx = self.context(&request.account_id, window.start, window.end);

        let mut outcomes = Vec::with_capacity(resources.len());
        for resource in resources {
            let status = self
                .run_resource(resource, &ctx, self.pipeline.process(resource, window))
                .await?;
            outcomes.push(ResourceOutcome { resource, status });
        }

        self.tokens.save(&token)?;
        tracing::info!(%token, "backfill complete; change token saved");

        Ok(SyncReport {
            attempt_id,
            outcomes,
            token,
        })
    }

    async fn run_incremental(
        &self,
        attempt_id: Uuid,
        request: &IncrementalRequest,
    ) -> Result<SyncReport> {
        let resources = normalize_resources(&request.resources);
        let token = self.tokens.load()?.ok_or(SyncError::MissingChangeToken)?;
        tracing::info!(?resources, %token, "starting incremental sync");

        let changes = self.drain_changes(token).await?;
        tracing::debug!(
            changes = changes.changes.len(),
            deletions = changes.deletion_count(),
            "drained change feed"
        );

        let (start, end) = changes.time_span().unwrap_or_else(|| {
            let now = request.cutoff.unwrap_or_else(Utc::now);
            (now, now)
        });
        let ctx = self.context(&request.account_id, start, end);

        let mut outcomes = Vec::with_capacity(resources.len());
        for resource in resources {
            let reconciled = self.reconciler.reconcile(resource, &changes, request.cutoff);
            let status = self.run_resource(resource, &ctx, reconciled).await?;
            outcomes.push(ResourceOutcome { resource, status });
        }

        let token = changes.next_token;
        self.tokens.save(&token)?;
        tracing::info!(%token, "incremental sync complete; change token saved");

        Ok(SyncReport {
            attempt_id,
            outcomes,
            token,
        })
    }

    /// Pull pages until the feed reports no more
    async fn drain_changes(&self, token: ChangeToken) -> Result<ChangeSet> {
        let mut changes = self.source.changes(&token).await?;
        while changes.has_more {
            let next = self.source.changes(&changes.next_token).await?;
            changes.extend(next);
        }
        Ok(changes)
    }

    async fn run_resource(
        &self,
        resource: Resource,
        ctx: &UploadContext,
        process: impl Future<Output = Result<ProcessedResourceData>>,
    ) -> Result<SyncStatus> {
        self.emit(resource, SyncStatus::Syncing).await;

        let data = process.await?;
        let status = if data.is_empty() {
            SyncStatus::NothingToSync
        } else {
            let payload = PayloadEncoder::encode(data);
            self.uploader.upload(ctx, &payload).await?;
            SyncStatus::Synced
        };

        self.emit(resource, status).await;
        Ok(status)
    }

    async fn emit(&self, resource: Resource, status: SyncStatus) {
        tracing::info!(%resource, %status, "resource status");
        self.status.report(StatusEvent::new(resource, status));
        if !self.status_delay.is_zero() {
            tokio::time::sleep(self.status_delay).await;
        }
    }

    fn context(&self, account_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> UploadContext {
        UploadContext {
            account_id: account_id.to_string(),
            window_start: start,
            window_end: end,
            time_zone_id: self.time_zone_id.clone(),
        }
    }
}

fn log_failure(err: &SyncError) {
    tracing::error!(
        error = %err,
        retryable = err.is_retryable(),
        fatal = err.is_fatal(),
        "sync attempt failed; change token not advanced"
    );
}
