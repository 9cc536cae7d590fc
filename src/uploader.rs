//! Uploader interface
//!
//! The network write is an external collaborator. Each resource has its own
//! upload operation taking the account, the synced window, the user's time
//! zone and the resource's payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;
use std::sync::Mutex;

use crate::encoder::{BloodPressureSamplePayload, PayloadEncoder, QuantitySamplePayload, UploadPayload};
use crate::error::{Result, SyncError};
use crate::types::{ActivityDay, BodySummary, ProfileSummary, Resource, Sleep, Workout};

/// Arguments shared by every upload operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadContext {
    pub account_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub time_zone_id: String,
}

/// Trait for remote upload targets
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload_profile(&self, ctx: &UploadContext, profile: &ProfileSummary) -> Result<()>;

    async fn upload_body(&self, ctx: &UploadContext, body: &BodySummary) -> Result<()>;

    async fn upload_workouts(&self, ctx: &UploadContext, workouts: &[Workout]) -> Result<()>;

    async fn upload_activity(&self, ctx: &UploadContext, days: &[ActivityDay]) -> Result<()>;

    async fn upload_sleep(&self, ctx: &UploadContext, sleeps: &[Sleep]) -> Result<()>;

    async fn upload_blood_pressure(
        &self,
        ctx: &UploadContext,
        samples: &[BloodPressureSamplePayload],
    ) -> Result<()>;

    /// Upload scalar samples of a time-series resource
    async fn upload_quantity_samples(
        &self,
        ctx: &UploadContext,
        resource: Resource,
        samples: &[QuantitySamplePayload],
    ) -> Result<()>;

    async fn upload_glucose(&self, ctx: &UploadContext, samples: &[QuantitySamplePayload]) -> Result<()> {
        self.upload_quantity_samples(ctx, Resource::Glucose, samples).await
    }

    async fn upload_heart_rate(&self, ctx: &UploadContext, samples: &[QuantitySamplePayload]) -> Result<()> {
        self.upload_quantity_samples(ctx, Resource::HeartRate, samples).await
    }

    async fn upload_heart_rate_variability(
        &self,
        ctx: &UploadContext,
        samples: &[QuantitySamplePayload],
    ) -> Result<()> {
        self.upload_quantity_samples(ctx, Resource::HeartRateVariability, samples)
            .await
    }

    async fn upload_water(&self, ctx: &UploadContext, samples: &[QuantitySamplePayload]) -> Result<()> {
        self.upload_quantity_samples(ctx, Resource::Water, samples).await
    }

    /// Route a payload to its resource's upload operation
    async fn upload(&self, ctx: &UploadContext, payload: &UploadPayload) -> Result<()> {
        match payload {
            UploadPayload::Profile(profile) => self.upload_profile(ctx, profile).await,
            UploadPayload::Body(body) => self.upload_body(ctx, body).await,
            UploadPayload::Workouts(workouts) => self.upload_workouts(ctx, workouts).await,
            UploadPayload::Activity(days) => self.upload_activity(ctx, days).await,
            UploadPayload::Sleep(sleeps) => self.upload_sleep(ctx, sleeps).await,
            UploadPayload::Glucose(samples) => self.upload_glucose(ctx, samples).await,
            UploadPayload::BloodPressure(samples) => self.upload_blood_pressure(ctx, samples).await,
            UploadPayload::HeartRate(samples) => self.upload_heart_rate(ctx, samples).await,
            UploadPayload::HeartRateVariability(samples) => {
                self.upload_heart_rate_variability(ctx, samples).await
            }
            UploadPayload::Water(samples) => self.upload_water(ctx, samples).await,
        }
    }
}

/// Uploader writing one JSON envelope per upload to a writer
pub struct JsonLinesUploader {
    encoder: PayloadEncoder,
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesUploader {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            encoder: PayloadEncoder::new(),
            out: Mutex::new(out),
        }
    }

    /// Write to standard output
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write(&self, ctx: &UploadContext, payload: UploadPayload) -> Result<()> {
        let resource = payload.resource();
        let line = self.encoder.encode_to_json(ctx, payload)?;

        let mut out = self.out.lock().map_err(|_| SyncError::Upload {
            resource,
            message: "output writer poisoned".to_string(),
        })?;
        writeln!(out, "{}", line)
            .and_then(|_| out.flush())
            .map_err(|e| SyncError::Upload {
                resource,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Uploader for JsonLinesUploader {
    async fn upload_profile(&self, ctx: &UploadContext, profile: &ProfileSummary) -> Result<()> {
        self.write(ctx, UploadPayload::Profile(profile.clone()))
    }

    async fn upload_body(&self, ctx: &UploadContext, body: &BodySummary) -> Result<()> {
        self.write(ctx, UploadPayload::Body(body.clone()))
    }

    async fn upload_workouts(&self, ctx: &UploadContext, workouts: &[Workout]) -> Result<()> {
        self.write(ctx, UploadPayload::Workouts(workouts.to_vec()))
    }

    async fn upload_activity(&self, ctx: &UploadContext, days: &[ActivityDay]) -> Result<()> {
        self.write(ctx, UploadPayload::Activity(days.to_vec()))
    }

    async fn upload_sleep(&self, ctx: &UploadContext, sleeps: &[Sleep]) -> Result<()> {
        self.write(ctx, UploadPayload::Sleep(sleeps.to_vec()))
    }

    async fn upload_blood_pressure(
        &self,
        ctx: &UploadContext,
        samples: &[BloodPressureSamplePayload],
    ) -> Result<()> {
        self.write(ctx, UploadPayload::BloodPressure(samples.to_vec()))
    }

    async fn upload_quantity_samples(
        &self,
        ctx: &UploadContext,
        resource: Resource,
        samples: &[QuantitySamplePayload],
    ) -> Result<()> {
        let samples = samples.to_vec();
        let payload = match resource {
            Resource::Glucose => UploadPayload::Glucose(samples),
            Resource::HeartRate => UploadPayload::HeartRate(samples),
            Resource::HeartRateVariability => UploadPayload::HeartRateVariability(samples),
            Resource::Water => UploadPayload::Water(samples),
            other => {
                return Err(SyncError::InvalidResourceState(format!(
                    "{} is not a scalar time series",
                    other
                )))
            }
        };
        self.write(ctx, payload)
    }
}
