//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use synheart_sync::encoder::{BloodPressureSamplePayload, QuantitySamplePayload, UploadPayload};
use synheart_sync::status::CollectingStatusSink;
use synheart_sync::token::MemoryTokenStore;
use synheart_sync::types::{ActivityDay, BodySummary, ProfileSummary, Sleep, Workout};
use synheart_sync::{
    ChangeTokenStore, MemorySource, Resource, SyncConfig, SyncError, SyncOrchestrator,
    UploadContext, Uploader,
};

/// Uploader keeping every payload it receives
#[derive(Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<(UploadContext, UploadPayload)>>,
    failing: AtomicBool,
}

impl RecordingUploader {
    /// Make every following upload fail
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn uploads(&self) -> Vec<(UploadContext, UploadPayload)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn resources(&self) -> Vec<Resource> {
        self.uploads()
            .iter()
            .map(|(_, payload)| payload.resource())
            .collect()
    }

    fn keep(&self, ctx: &UploadContext, payload: UploadPayload) -> synheart_sync::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SyncError::Upload {
                resource: payload.resource(),
                message: "connection reset".to_string(),
            });
        }
        self.uploads.lock().unwrap().push((ctx.clone(), payload));
        Ok(())
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload_profile(
        &self,
        ctx: &UploadContext,
        profile: &ProfileSummary,
    ) -> synheart_sync::Result<()> {
        self.keep(ctx, UploadPayload::Profile(profile.clone()))
    }

    async fn upload_body(&self, ctx: &UploadContext, body: &BodySummary) -> synheart_sync::Result<()> {
        self.keep(ctx, UploadPayload::Body(body.clone()))
    }

    async fn upload_workouts(
        &self,
        ctx: &UploadContext,
        workouts: &[Workout],
    ) -> synheart_sync::Result<()> {
        self.keep(ctx, UploadPayload::Workouts(workouts.to_vec()))
    }

    async fn upload_activity(
        &self,
        ctx: &UploadContext,
        days: &[ActivityDay],
    ) -> synheart_sync::Result<()> {
        self.keep(ctx, UploadPayload::Activity(days.to_vec()))
    }

    async fn upload_sleep(&self, ctx: &UploadContext, sleeps: &[Sleep]) -> synheart_sync::Result<()> {
        self.keep(ctx, UploadPayload::Sleep(sleeps.to_vec()))
    }

    async fn upload_blood_pressure(
        &self,
        ctx: &UploadContext,
        samples: &[BloodPressureSamplePayload],
    ) -> synheart_sync::Result<()> {
        self.keep(ctx, UploadPayload::BloodPressure(samples.to_vec()))
    }

    async fn upload_quantity_samples(
        &self,
        ctx: &UploadContext,
        resource: Resource,
        samples: &[QuantitySamplePayload],
    ) -> synheart_sync::Result<()> {
        let samples = samples.to_vec();
        let payload = match resource {
            Resource::Glucose => UploadPayload::Glucose(samples),
            Resource::HeartRate => UploadPayload::HeartRate(samples),
            Resource::HeartRateVariability => UploadPayload::HeartRateVariability(samples),
            Resource::Water => UploadPayload::Water(samples),
            other => panic!("{} is not a scalar time series", other),
        };
        self.keep(ctx, payload)
    }
}

/// Collaborators wired into one orchestrator
pub struct Harness {
    pub source: Arc<MemorySource>,
    pub uploader: Arc<RecordingUploader>,
    pub status: Arc<CollectingStatusSink>,
    pub tokens: Arc<dyn ChangeTokenStore>,
    pub orchestrator: SyncOrchestrator,
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        status_delay_ms: 0,
        ..SyncConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with_tokens(Arc::new(MemoryTokenStore::new()))
}

pub fn harness_with_tokens(tokens: Arc<dyn ChangeTokenStore>) -> Harness {
    let source = Arc::new(MemorySource::new());
    let uploader = Arc::new(RecordingUploader::default());
    let status = Arc::new(CollectingStatusSink::new());
    let orchestrator = SyncOrchestrator::new(
        source.clone(),
        uploader.clone(),
        status.clone(),
        tokens.clone(),
        &test_config(),
    )
    .unwrap();

    Harness {
        source,
        uploader,
        status,
        tokens,
        orchestrator,
    }
}

/// 2024-01-15 at `hour`:00 UTC
pub fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
}
