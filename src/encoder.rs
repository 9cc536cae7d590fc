//! Upload payload encoding
//!
//! This module maps processed resource data onto the payload shapes the
//! uploader accepts, and wraps payloads in a producer envelope for line-based
//! output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    ActivityDay, BloodPressureSample, BodySummary, NormalizedSample, ProcessedResourceData,
    ProfileSummary, Resource, Sleep, SummaryData, TimeSeriesData, Workout,
};
use crate::uploader::UploadContext;
use crate::{PRODUCER_NAME, SYNC_VERSION};

/// One scalar sample as uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantitySamplePayload {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub value: f64,
    pub unit: String,
    pub source_device: String,
}

impl From<&NormalizedSample> for QuantitySamplePayload {
    fn from(sample: &NormalizedSample) -> Self {
        Self {
            start_date: sample.timestamp,
            end_date: sample.end.unwrap_or(sample.timestamp),
            value: sample.value,
            unit: sample.unit.clone(),
            source_device: sample.source_device.clone(),
        }
    }
}

/// One systolic/diastolic pair as uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodPressureSamplePayload {
    pub systolic: QuantitySamplePayload,
    pub diastolic: QuantitySamplePayload,
}

impl From<&BloodPressureSample> for BloodPressureSamplePayload {
    fn from(sample: &BloodPressureSample) -> Self {
        let component = |value| QuantitySamplePayload {
            start_date: sample.timestamp,
            end_date: sample.timestamp,
            value,
            unit: sample.unit.clone(),
            source_device: sample.source_device.clone(),
        };
        Self {
            systolic: component(sample.systolic),
            diastolic: component(sample.diastolic),
        }
    }
}

/// Payload for one resource, in the shape its upload operation accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", content = "payload", rename_all = "snake_case")]
pub enum UploadPayload {
    Profile(ProfileSummary),
    Body(BodySummary),
    Workouts(Vec<Workout>),
    Activity(Vec<ActivityDay>),
    Sleep(Vec<Sleep>),
    Glucose(Vec<QuantitySamplePayload>),
    BloodPressure(Vec<BloodPressureSamplePayload>),
    HeartRate(Vec<QuantitySamplePayload>),
    HeartRateVariability(Vec<QuantitySamplePayload>),
    Water(Vec<QuantitySamplePayload>),
}

impl UploadPayload {
    pub fn resource(&self) -> Resource {
        match self {
            UploadPayload::Profile(_) => Resource::Profile,
            UploadPayload::Body(_) => Resource::Body,
            UploadPayload::Workouts(_) => Resource::Workout,
            UploadPayload::Activity(_) => Resource::Activity,
            UploadPayload::Sleep(_) => Resource::Sleep,
            UploadPayload::Glucose(_) => Resource::Glucose,
            UploadPayload::BloodPressure(_) => Resource::BloodPressure,
            UploadPayload::HeartRate(_) => Resource::HeartRate,
            UploadPayload::HeartRateVariability(_) => Resource::HeartRateVariability,
            UploadPayload::Water(_) => Resource::Water,
        }
    }
}

/// Producer metadata stamped on every envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// A payload with its upload context, as written by line-based uploaders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadEnvelope {
    pub producer: Producer,
    pub account_id: String,
    pub window_start_utc: String,
    pub window_end_utc: String,
    pub time_zone_id: String,
    pub computed_at_utc: String,
    #[serde(flatten)]
    pub payload: UploadPayload,
}

/// Encoder for upload payloads
pub struct PayloadEncoder {
    instance_id: String,
}

impl Default for PayloadEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// Map processed data to its upload payload
    pub fn encode(data: ProcessedResourceData) -> UploadPayload {
        fn quantities(samples: Vec<NormalizedSample>) -> Vec<QuantitySamplePayload> {
            samples.iter().map(QuantitySamplePayload::from).collect()
        }

        match data {
            ProcessedResourceData::Summary(summary) => match summary {
                SummaryData::Profile(profile) => UploadPayload::Profile(profile),
                SummaryData::Body(body) => UploadPayload::Body(body),
                SummaryData::Workouts(workouts) => UploadPayload::Workouts(workouts),
                SummaryData::Activity(days) => UploadPayload::Activity(days),
                SummaryData::Sleep(sleeps) => UploadPayload::Sleep(sleeps),
            },
            ProcessedResourceData::TimeSeries(series) => match series {
                TimeSeriesData::Glucose(samples) => UploadPayload::Glucose(quantities(samples)),
                TimeSeriesData::BloodPressure(samples) => UploadPayload::BloodPressure(
                    samples.iter().map(BloodPressureSamplePayload::from).collect(),
                ),
                TimeSeriesData::HeartRate(samples) => UploadPayload::HeartRate(quantities(samples)),
                TimeSeriesData::HeartRateVariability(samples) => {
                    UploadPayload::HeartRateVariability(quantities(samples))
                }
                TimeSeriesData::Water(samples) => UploadPayload::Water(quantities(samples)),
            },
        }
    }

    /// Wrap a payload with producer metadata and its upload context
    pub fn envelope(&self, ctx: &UploadContext, payload: UploadPayload) -> PayloadEnvelope {
        PayloadEnvelope {
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: SYNC_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            account_id: ctx.account_id.clone(),
            window_start_utc: ctx.window_start.to_rfc3339(),
            window_end_utc: ctx.window_end.to_rfc3339(),
            time_zone_id: ctx.time_zone_id.clone(),
            computed_at_utc: Utc::now().to_rfc3339(),
            payload,
        }
    }

    /// Encode an envelope as a single JSON line
    pub fn encode_to_json(&self, ctx: &UploadContext, payload: UploadPayload) -> Result<String> {
        Ok(serde_json::to_string(&self.envelope(ctx, payload))?)
    }
}
