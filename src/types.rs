//! Core types for the Synheart Sync pipeline
//!
//! This module defines the data structures that flow through each stage of a
//! sync attempt: resources and windows, aggregate summaries, normalized samples,
//! resource summaries, and the processed result handed to the uploader.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::schema::{RecordKind, SleepStage};

/// Logical health resource synced as a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Profile,
    Body,
    Workout,
    Activity,
    Sleep,
    Glucose,
    BloodPressure,
    HeartRate,
    HeartRateVariability,
    Water,
    /// Alias of [`Resource::Activity`]
    ActiveEnergyBurned,
    /// Alias of [`Resource::Activity`]
    BasalEnergyBurned,
    /// Alias of [`Resource::Activity`]
    Steps,
}

impl Resource {
    pub const ALL: [Resource; 13] = [
        Resource::Profile,
        Resource::Body,
        Resource::Workout,
        Resource::Activity,
        Resource::Sleep,
        Resource::Glucose,
        Resource::BloodPressure,
        Resource::HeartRate,
        Resource::HeartRateVariability,
        Resource::Water,
        Resource::ActiveEnergyBurned,
        Resource::BasalEnergyBurned,
        Resource::Steps,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Profile => "profile",
            Resource::Body => "body",
            Resource::Workout => "workout",
            Resource::Activity => "activity",
            Resource::Sleep => "sleep",
            Resource::Glucose => "glucose",
            Resource::BloodPressure => "blood_pressure",
            Resource::HeartRate => "heart_rate",
            Resource::HeartRateVariability => "heart_rate_variability",
            Resource::Water => "water",
            Resource::ActiveEnergyBurned => "active_energy_burned",
            Resource::BasalEnergyBurned => "basal_energy_burned",
            Resource::Steps => "steps",
        }
    }

    /// Whether this resource only exists as a part of [`Resource::Activity`]
    pub fn is_sub_resource(&self) -> bool {
        matches!(
            self,
            Resource::ActiveEnergyBurned | Resource::BasalEnergyBurned | Resource::Steps
        )
    }

    /// Fold sub-resource aliases onto their parent resource
    pub fn remapped(self) -> Resource {
        if self.is_sub_resource() {
            Resource::Activity
        } else {
            self
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .iter()
            .copied()
            .find(|resource| resource.as_str() == s)
            .ok_or_else(|| format!("unknown resource: {}", s))
    }
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `instant` lies in `[start, end)`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Per-resource progress state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    NothingToSync,
    Syncing,
    Synced,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::NothingToSync => "nothingToSync",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress event emitted around each resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub resource: Resource,
    pub status: SyncStatus,
}

impl StatusEvent {
    pub fn new(resource: Resource, status: SyncStatus) -> Self {
        Self { resource, status }
    }
}

/// Metric computed by the platform's native aggregation facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateMetric {
    DistanceTotal,
    ActiveCaloriesTotal,
    BasalCaloriesTotal,
    TotalCaloriesTotal,
    StepsCountTotal,
    FloorsClimbedTotal,
    ExerciseDurationTotal,
}

impl AggregateMetric {
    /// Record kind whose read permission gates this metric
    pub fn owning_kind(&self) -> RecordKind {
        match self {
            AggregateMetric::DistanceTotal => RecordKind::Distance,
            AggregateMetric::ActiveCaloriesTotal => RecordKind::ActiveCaloriesBurned,
            AggregateMetric::BasalCaloriesTotal => RecordKind::BasalMetabolicRate,
            AggregateMetric::TotalCaloriesTotal => RecordKind::TotalCaloriesBurned,
            AggregateMetric::StepsCountTotal => RecordKind::Steps,
            AggregateMetric::FloorsClimbedTotal => RecordKind::FloorsClimbed,
            AggregateMetric::ExerciseDurationTotal => RecordKind::ExerciseSession,
        }
    }
}

/// Platform-computed totals for a window
///
/// Each field is present only if its metric was permitted and reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub distance_meters: Option<f64>,
    pub active_calories: Option<f64>,
    pub basal_calories: Option<f64>,
    pub total_calories: Option<f64>,
    pub steps: Option<i64>,
    pub floors_climbed: Option<f64>,
    pub exercise_minutes: Option<i64>,
}

impl AggregateSummary {
    pub fn is_empty(&self) -> bool {
        *self == AggregateSummary::default()
    }
}

/// One normalized scalar measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedSample {
    pub timestamp: DateTime<Utc>,
    /// End of the measured interval; absent for point readings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub value: f64,
    pub unit: String,
    pub source_device: String,
}

/// One blood pressure reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BloodPressureSample {
    pub timestamp: DateTime<Utc>,
    pub systolic: f64,
    pub diastolic: f64,
    pub unit: String,
    pub source_device: String,
}

/// Profile summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    /// Most recent height (cm)
    pub height_cm: Option<f64>,
}

/// Body composition summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodySummary {
    /// Most recent body mass (kg)
    pub body_mass_kg: Option<f64>,
    /// Most recent body fat (%)
    pub body_fat_percentage: Option<f64>,
    pub body_mass: Vec<NormalizedSample>,
    pub body_fat: Vec<NormalizedSample>,
}

/// One exercise session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub exercise_type: String,
    pub title: Option<String>,
    pub distance_meters: Option<f64>,
    pub active_calories: Option<f64>,
    pub source_device: String,
}

/// Per-metric samples backing an activity day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySamples {
    pub active_energy: Vec<NormalizedSample>,
    pub basal_energy: Vec<NormalizedSample>,
    pub steps: Vec<NormalizedSample>,
    pub distance: Vec<NormalizedSample>,
    pub floors_climbed: Vec<NormalizedSample>,
    pub vo2_max: Vec<NormalizedSample>,
}

/// Day-level activity summary in the user's time zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDay {
    pub date: NaiveDate,
    pub active_calories: Option<f64>,
    pub basal_calories: Option<f64>,
    pub total_calories: Option<f64>,
    pub steps: Option<i64>,
    pub distance_meters: Option<f64>,
    pub floors_climbed: Option<f64>,
    pub exercise_minutes: Option<i64>,
    pub vo2_max: Option<f64>,
    pub samples: ActivitySamples,
}

impl ActivityDay {
    /// Build a day purely from platform aggregates, with no backing samples
    pub fn from_aggregate(date: NaiveDate, summary: &AggregateSummary) -> Self {
        ActivityDay {
            date,
            active_calories: summary.active_calories,
            basal_calories: summary.basal_calories,
            total_calories: summary.total_calories,
            steps: summary.steps,
            distance_meters: summary.distance_meters,
            floors_climbed: summary.floors_climbed,
            exercise_minutes: summary.exercise_minutes,
            vo2_max: None,
            samples: ActivitySamples::default(),
        }
    }
}

/// Minutes spent in each sleep stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SleepStageMinutes {
    pub awake: f64,
    pub light: f64,
    pub deep: f64,
    pub rem: f64,
    pub unknown: f64,
}

impl SleepStageMinutes {
    pub fn add(&mut self, stage: SleepStage, minutes: f64) {
        match stage {
            SleepStage::Awake => self.awake += minutes,
            SleepStage::Light => self.light += minutes,
            SleepStage::Deep => self.deep += minutes,
            SleepStage::Rem => self.rem += minutes,
            SleepStage::Unknown => self.unknown += minutes,
        }
    }
}

/// Stage segment inside a sleep session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub stage: SleepStage,
}

/// One sleep session with its stage breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sleep {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    pub title: Option<String>,
    pub stages: SleepStageMinutes,
    pub segments: Vec<SleepSegment>,
    pub source_device: String,
}

/// Resources with independently timestamped readings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", content = "samples", rename_all = "snake_case")]
pub enum TimeSeriesData {
    Glucose(Vec<NormalizedSample>),
    BloodPressure(Vec<BloodPressureSample>),
    HeartRate(Vec<NormalizedSample>),
    HeartRateVariability(Vec<NormalizedSample>),
    Water(Vec<NormalizedSample>),
}

impl TimeSeriesData {
    pub fn len(&self) -> usize {
        match self {
            TimeSeriesData::Glucose(samples)
            | TimeSeriesData::HeartRate(samples)
            | TimeSeriesData::HeartRateVariability(samples)
            | TimeSeriesData::Water(samples) => samples.len(),
            TimeSeriesData::BloodPressure(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resources that are one value (or one list of items) per window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resource", content = "summary", rename_all = "snake_case")]
pub enum SummaryData {
    Profile(ProfileSummary),
    Body(BodySummary),
    Workouts(Vec<Workout>),
    Activity(Vec<ActivityDay>),
    Sleep(Vec<Sleep>),
}

impl SummaryData {
    /// Whether there is nothing to upload.
    ///
    /// Profile and body summaries are never empty: they are uploaded even when sparse.
    pub fn is_empty(&self) -> bool {
        match self {
            SummaryData::Profile(_) | SummaryData::Body(_) => false,
            SummaryData::Workouts(items) => items.is_empty(),
            SummaryData::Activity(days) => days.is_empty(),
            SummaryData::Sleep(items) => items.is_empty(),
        }
    }
}

/// Normalized result of processing one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum ProcessedResourceData {
    TimeSeries(TimeSeriesData),
    Summary(SummaryData),
}

impl ProcessedResourceData {
    pub fn is_empty(&self) -> bool {
        match self {
            ProcessedResourceData::TimeSeries(data) => data.is_empty(),
            ProcessedResourceData::Summary(data) => data.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_sub_resources_remap_to_activity() {
        for resource in [
            Resource::ActiveEnergyBurned,
            Resource::BasalEnergyBurned,
            Resource::Steps,
        ] {
            assert!(resource.is_sub_resource());
            assert_eq!(resource.remapped(), Resource::Activity);
        }
        assert_eq!(Resource::Water.remapped(), Resource::Water);
        assert!(!Resource::Activity.is_sub_resource());
    }

    #[test]
    fn test_resource_names_parse() {
        for resource in Resource::ALL {
            assert_eq!(resource.as_str().parse::<Resource>().unwrap(), resource);
        }
        assert_eq!(
            serde_json::to_string(&Resource::HeartRateVariability).unwrap(),
            "\"heart_rate_variability\""
        );
        assert!("calories".parse::<Resource>().is_err());
    }

    #[test]
    fn test_window_is_half_open() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();
        let end = start + Duration::days(1);
        let window = TimeWindow::new(start, end);

        assert!(window.contains(start));
        assert!(window.contains(end - Duration::milliseconds(1)));
        assert!(!window.contains(end));
        assert!(!window.contains(start - Duration::milliseconds(1)));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::NothingToSync).unwrap(),
            "\"nothingToSync\""
        );
    }

    #[test]
    fn test_emptiness_rules() {
        assert!(ProcessedResourceData::TimeSeries(TimeSeriesData::Water(vec![])).is_empty());
        assert!(ProcessedResourceData::Summary(SummaryData::Workouts(vec![])).is_empty());
        assert!(!ProcessedResourceData::Summary(SummaryData::Body(BodySummary::default())).is_empty());
        assert!(
            !ProcessedResourceData::Summary(SummaryData::Profile(ProfileSummary::default()))
                .is_empty()
        );
    }
}
