//! Resource pipeline
//!
//! Maps each resource to the record kinds it is built from, reads them for a
//! window, prefetches the platform aggregates and sleep stages a resource
//! needs, and hands everything to the [`RecordProcessor`].
//!
//! Pipeline stages:
//! 1. RecordReader - Read raw records per kind, half-open on end time
//! 2. Aggregator - Per-session and per-day platform totals
//! 3. RecordProcessor - Normalize into the resource's shape
//!
//! Backfill and change reconciliation both end in [`ResourcePipeline::normalize`],
//! so identical records produce identical results on either path.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::error::{Result, SyncError};
use crate::processor::{ActivityInputs, RecordProcessor};
use crate::reader::{RecordBatch, RecordReader};
use crate::schema::{RawRecord, RecordKind};
use crate::source::RecordSource;
use crate::types::{
    AggregateSummary, ProcessedResourceData, Resource, SummaryData, TimeSeriesData, TimeWindow,
};

const ACTIVITY_KINDS: [RecordKind; 6] = [
    RecordKind::ActiveCaloriesBurned,
    RecordKind::BasalMetabolicRate,
    RecordKind::FloorsClimbed,
    RecordKind::Distance,
    RecordKind::Steps,
    RecordKind::Vo2Max,
];

/// Record kinds a resource is built from.
///
/// Sub-resources resolve to the activity kinds. Sleep stages are not listed:
/// they are looked up per session.
pub fn resource_kinds(resource: Resource) -> &'static [RecordKind] {
    match resource {
        Resource::Profile => &[RecordKind::Height],
        Resource::Body => &[RecordKind::Weight, RecordKind::BodyFat],
        Resource::Workout => &[RecordKind::ExerciseSession],
        Resource::Activity
        | Resource::ActiveEnergyBurned
        | Resource::BasalEnergyBurned
        | Resource::Steps => &ACTIVITY_KINDS,
        Resource::Sleep => &[RecordKind::SleepSession],
        Resource::Glucose => &[RecordKind::BloodGlucose],
        Resource::BloodPressure => &[RecordKind::BloodPressure],
        Resource::HeartRate => &[RecordKind::HeartRate],
        Resource::HeartRateVariability => &[RecordKind::HeartRateVariabilityRmssd],
        Resource::Water => &[RecordKind::Hydration],
    }
}

/// Reads and normalizes resources from one record source
#[derive(Clone)]
pub struct ResourcePipeline {
    reader: RecordReader,
    aggregator: Aggregator,
    processor: RecordProcessor,
    tz: Tz,
    use_platform_aggregates: bool,
}

impl ResourcePipeline {
    /// Create a pipeline bucketing days in `tz`
    pub fn new(source: Arc<dyn RecordSource>, tz: Tz, fallback_device: impl Into<String>) -> Self {
        Self {
            reader: RecordReader::new(source.clone()),
            aggregator: Aggregator::new(source),
            processor: RecordProcessor::new(fallback_device),
            tz,
            use_platform_aggregates: true,
        }
    }

    /// Toggle platform aggregation for workout and activity totals.
    ///
    /// When disabled, totals are derived from raw records only.
    pub fn with_platform_aggregates(mut self, enabled: bool) -> Self {
        self.use_platform_aggregates = enabled;
        self
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    /// Read every record kind `resource` is built from
    pub async fn read(&self, resource: Resource, window: TimeWindow) -> Result<RecordBatch> {
        self.reader
            .read_batch(resource_kinds(resource), window)
            .await
    }

    /// Read and normalize `resource` over `window`
    pub async fn process(
        &self,
        resource: Resource,
        window: TimeWindow,
    ) -> Result<ProcessedResourceData> {
        let batch = self.read(resource, window).await?;
        self.normalize(resource, &batch).await
    }

    /// Normalize an already-read batch.
    ///
    /// Sub-resources must be remapped by the caller; passing one here is an
    /// [`SyncError::InvalidResourceState`].
    pub async fn normalize(
        &self,
        resource: Resource,
        batch: &RecordBatch,
    ) -> Result<ProcessedResourceData> {
        self.normalize_until(resource, batch, None).await
    }

    /// Normalize a batch whose records all end before `cutoff`.
    ///
    /// Platform aggregates are queried up to `cutoff` as well, so totals never
    /// count records the batch held back.
    pub async fn normalize_until(
        &self,
        resource: Resource,
        batch: &RecordBatch,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<ProcessedResourceData> {
        let processor = &self.processor;

        let data = match resource {
            Resource::Profile => ProcessedResourceData::Summary(SummaryData::Profile(
                processor.profile(batch.get(RecordKind::Height)),
            )),
            Resource::Body => ProcessedResourceData::Summary(SummaryData::Body(processor.body(
                batch.get(RecordKind::Weight),
                batch.get(RecordKind::BodyFat),
            ))),
            Resource::Workout => {
                let sessions = batch.get(RecordKind::ExerciseSession);
                let totals = self.workout_totals(sessions, cutoff).await?;
                ProcessedResourceData::Summary(SummaryData::Workouts(
                    processor.workouts(sessions, &totals),
                ))
            }
            Resource::Activity => {
                let inputs = ActivityInputs {
                    active_energy: batch.get(RecordKind::ActiveCaloriesBurned),
                    basal_metabolic_rate: batch.get(RecordKind::BasalMetabolicRate),
                    floors_climbed: batch.get(RecordKind::FloorsClimbed),
                    distance: batch.get(RecordKind::Distance),
                    steps: batch.get(RecordKind::Steps),
                    vo2_max: batch.get(RecordKind::Vo2Max),
                };
                let totals = self.day_totals(&inputs, cutoff).await?;
                ProcessedResourceData::Summary(SummaryData::Activity(
                    processor.activity(self.tz, inputs, &totals),
                ))
            }
            Resource::Sleep => {
                let sessions = batch.get(RecordKind::SleepSession);
                let mut stages = HashMap::new();
                for session in sessions {
                    let segments = self.reader.read_sleep_stages(session).await?;
                    stages.insert(session.id.clone(), segments);
                }
                ProcessedResourceData::Summary(SummaryData::Sleep(
                    processor.sleep(sessions, &stages),
                ))
            }
            Resource::Glucose => ProcessedResourceData::TimeSeries(TimeSeriesData::Glucose(
                processor.glucose(batch.get(RecordKind::BloodGlucose)),
            )),
            Resource::BloodPressure => ProcessedResourceData::TimeSeries(
                TimeSeriesData::BloodPressure(
                    processor.blood_pressure(batch.get(RecordKind::BloodPressure)),
                ),
            ),
            Resource::HeartRate => ProcessedResourceData::TimeSeries(TimeSeriesData::HeartRate(
                processor.heart_rate(batch.get(RecordKind::HeartRate)),
            )),
            Resource::HeartRateVariability => ProcessedResourceData::TimeSeries(
                TimeSeriesData::HeartRateVariability(
                    processor.heart_rate_variability(
                        batch.get(RecordKind::HeartRateVariabilityRmssd),
                    ),
                ),
            ),
            Resource::Water => ProcessedResourceData::TimeSeries(TimeSeriesData::Water(
                processor.water(batch.get(RecordKind::Hydration)),
            )),
            Resource::ActiveEnergyBurned | Resource::BasalEnergyBurned | Resource::Steps => {
                return Err(SyncError::InvalidResourceState(format!(
                    "{} is part of activity and cannot be processed on its own",
                    resource
                )));
            }
        };

        Ok(data)
    }

    async fn workout_totals(
        &self,
        sessions: &[RawRecord],
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<HashMap<String, AggregateSummary>> {
        let mut totals = HashMap::new();
        if !self.use_platform_aggregates {
            return Ok(totals);
        }
        for session in sessions {
            let end = cutoff.map_or(session.end_time, |cutoff| session.end_time.min(cutoff));
            let window = TimeWindow::new(session.start_time, end);
            let summary = self.aggregator.aggregate_workout_summary(window).await?;
            totals.insert(session.id.clone(), summary);
        }
        Ok(totals)
    }

    async fn day_totals(
        &self,
        inputs: &ActivityInputs<'_>,
        cutoff: Option<DateTime<Utc>>,
    ) -> Result<HashMap<NaiveDate, AggregateSummary>> {
        let mut totals = HashMap::new();
        if !self.use_platform_aggregates {
            return Ok(totals);
        }
        for date in inputs.days(self.tz) {
            let summary = self
                .aggregator
                .aggregate_activity_day_summary(date, self.tz, cutoff)
                .await?;
            totals.insert(date, summary);
        }
        Ok(totals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SleepStage, Unit};
    use crate::source::MemorySource;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    fn day() -> TimeWindow {
        TimeWindow::new(at(0), at(0) + Duration::days(1))
    }

    fn pipeline_with(records: Vec<RawRecord>) -> ResourcePipeline {
        let source = Arc::new(MemorySource::new());
        for record in records {
            source.upsert(record);
        }
        ResourcePipeline::new(source, Tz::UTC, "unknown")
    }

    #[test]
    fn test_every_resource_has_kinds() {
        for resource in Resource::ALL {
            assert!(!resource_kinds(resource).is_empty(), "{}", resource);
        }
        assert_eq!(
            resource_kinds(Resource::Steps),
            resource_kinds(Resource::Activity)
        );
    }

    #[tokio::test]
    async fn test_sub_resource_is_rejected() {
        let pipeline = pipeline_with(vec![]);
        let err = pipeline
            .normalize(Resource::Steps, &RecordBatch::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidResourceState(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_workout_uses_session_aggregates() {
        let pipeline = pipeline_with(vec![
            RawRecord::exercise(at(7), at(8), "cycling").with_id("ride"),
            RawRecord::interval(RecordKind::Distance, at(7), at(8), 20.5, Unit::Kilometers),
            RawRecord::interval(RecordKind::ActiveCaloriesBurned, at(7), at(8), 512.8, Unit::Kcal),
            // Outside the session window
            RawRecord::interval(RecordKind::Distance, at(9), at(10), 5.0, Unit::Kilometers),
        ]);

        let data = pipeline.process(Resource::Workout, day()).await.unwrap();
        let ProcessedResourceData::Summary(SummaryData::Workouts(workouts)) = data else {
            panic!("expected workouts");
        };
        assert_eq!(workouts.len(), 1);
        assert_eq!(workouts[0].id, "ride");
        assert_eq!(workouts[0].distance_meters, Some(20500.0));
        assert_eq!(workouts[0].active_calories, Some(512.0));
    }

    #[tokio::test]
    async fn test_workout_without_platform_aggregates() {
        let pipeline = pipeline_with(vec![
            RawRecord::exercise(at(7), at(8), "cycling"),
            RawRecord::interval(RecordKind::Distance, at(7), at(8), 20.0, Unit::Kilometers),
        ])
        .with_platform_aggregates(false);

        let data = pipeline.process(Resource::Workout, day()).await.unwrap();
        let ProcessedResourceData::Summary(SummaryData::Workouts(workouts)) = data else {
            panic!("expected workouts");
        };
        assert_eq!(workouts[0].distance_meters, None);
    }

    #[tokio::test]
    async fn test_activity_day_totals() {
        let pipeline = pipeline_with(vec![
            RawRecord::interval(RecordKind::Steps, at(8), at(9), 4000.0, Unit::Count),
            RawRecord::interval(RecordKind::Steps, at(17), at(18), 3500.0, Unit::Count),
            RawRecord::interval(RecordKind::TotalCaloriesBurned, at(0), at(23), 2100.0, Unit::Kcal),
            RawRecord::interval(RecordKind::ActiveCaloriesBurned, at(8), at(9), 350.0, Unit::Kcal),
        ]);

        let data = pipeline.process(Resource::Activity, day()).await.unwrap();
        let ProcessedResourceData::Summary(SummaryData::Activity(days)) = data else {
            panic!("expected activity");
        };
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].steps, Some(7500));
        assert_eq!(days[0].total_calories, Some(2100.0));
        assert_eq!(days[0].active_calories, Some(350.0));
        assert_eq!(days[0].basal_calories, Some(1750.0));
        assert_eq!(days[0].samples.steps.len(), 2);
    }

    #[tokio::test]
    async fn test_sleep_reads_stages_per_session() {
        let pipeline = pipeline_with(vec![
            RawRecord::sleep_session(at(0), at(6)).with_id("night"),
            RawRecord::sleep_stage(at(0), at(2), SleepStage::Light),
            RawRecord::sleep_stage(at(2), at(6), SleepStage::Deep),
        ]);

        let data = pipeline.process(Resource::Sleep, day()).await.unwrap();
        let ProcessedResourceData::Summary(SummaryData::Sleep(sleeps)) = data else {
            panic!("expected sleep");
        };
        assert_eq!(sleeps[0].stages.light, 120.0);
        assert_eq!(sleeps[0].stages.deep, 240.0);
    }

    #[tokio::test]
    async fn test_empty_window_results() {
        let pipeline = pipeline_with(vec![]);

        let water = pipeline.process(Resource::Water, day()).await.unwrap();
        assert!(water.is_empty());

        let body = pipeline.process(Resource::Body, day()).await.unwrap();
        assert!(!body.is_empty());
    }
}
