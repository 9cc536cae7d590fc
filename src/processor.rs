//! Record normalization
//!
//! One function per resource turns raw records (plus prefetched platform
//! aggregates where a resource uses them) into a resource-shaped result.
//! - Units normalized to canonical units
//! - Missing inputs produce partial or empty results, never errors
//! - Source device falls back to the configured device model

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::aggregator::{floor_total, reconcile_calories};
use crate::schema::{RawRecord, RecordValue, Unit};
use crate::types::{
    ActivityDay, ActivitySamples, AggregateSummary, BloodPressureSample, BodySummary,
    NormalizedSample, ProfileSummary, Sleep, SleepSegment, SleepStageMinutes, Workout,
};

/// Raw inputs of the activity resource
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityInputs<'a> {
    pub active_energy: &'a [RawRecord],
    pub basal_metabolic_rate: &'a [RawRecord],
    pub floors_climbed: &'a [RawRecord],
    pub distance: &'a [RawRecord],
    pub steps: &'a [RawRecord],
    pub vo2_max: &'a [RawRecord],
}

impl ActivityInputs<'_> {
    fn all(&self) -> impl Iterator<Item = &RawRecord> {
        self.active_energy
            .iter()
            .chain(self.basal_metabolic_rate)
            .chain(self.floors_climbed)
            .chain(self.distance)
            .chain(self.steps)
            .chain(self.vo2_max)
    }

    /// Local calendar days in `tz` touched by any input record's start time
    pub fn days(&self, tz: Tz) -> BTreeSet<NaiveDate> {
        self.all().map(|record| local_date(record, tz)).collect()
    }
}

fn local_date(record: &RawRecord, tz: Tz) -> NaiveDate {
    record.start_time.with_timezone(&tz).date_naive()
}

/// Normalizer for raw health records
#[derive(Debug, Clone)]
pub struct RecordProcessor {
    fallback_device: String,
}

impl RecordProcessor {
    /// Create a processor attributing device-less records to `fallback_device`
    pub fn new(fallback_device: impl Into<String>) -> Self {
        Self {
            fallback_device: fallback_device.into(),
        }
    }

    fn device_of(&self, record: &RawRecord) -> String {
        record
            .source_device
            .clone()
            .unwrap_or_else(|| self.fallback_device.clone())
    }

    /// Map a quantity record to a sample in canonical units.
    ///
    /// Non-quantity records are skipped.
    fn sample(&self, record: &RawRecord) -> Option<NormalizedSample> {
        let (value, unit) = record.quantity()?;
        let (value, unit) = unit.to_canonical(value);
        Some(NormalizedSample {
            timestamp: record.start_time,
            end: (record.end_time != record.start_time).then_some(record.end_time),
            value,
            unit: unit.as_str().to_string(),
            source_device: self.device_of(record),
        })
    }

    fn samples(&self, records: &[RawRecord]) -> Vec<NormalizedSample> {
        records.iter().filter_map(|record| self.sample(record)).collect()
    }

    /// Reduce height records to the most recent reading, in centimeters
    pub fn profile(&self, heights: &[RawRecord]) -> ProfileSummary {
        let height_cm = heights
            .iter()
            .filter_map(|record| Some((record, record.quantity()?)))
            .max_by_key(|(record, _)| record.point_in_time())
            .map(|(_, (value, unit))| match unit {
                Unit::Meters => value * 100.0,
                other => other.to_canonical(value).0,
            });

        ProfileSummary { height_cm }
    }

    /// Combine weight and body fat readings; latest value per field
    pub fn body(&self, weights: &[RawRecord], body_fat: &[RawRecord]) -> BodySummary {
        let body_mass = self.samples(weights);
        let body_fat = self.samples(body_fat);

        BodySummary {
            body_mass_kg: latest_value(&body_mass),
            body_fat_percentage: latest_value(&body_fat),
            body_mass,
            body_fat,
        }
    }

    /// One workout per exercise session.
    ///
    /// `totals` maps session ids to platform aggregates over the session window.
    pub fn workouts(
        &self,
        sessions: &[RawRecord],
        totals: &HashMap<String, AggregateSummary>,
    ) -> Vec<Workout> {
        sessions
            .iter()
            .filter_map(|session| {
                let RecordValue::Exercise {
                    exercise_type,
                    title,
                } = &session.value
                else {
                    return None;
                };
                let aggregate = totals.get(&session.id);

                Some(Workout {
                    id: session.id.clone(),
                    start: session.start_time,
                    end: session.end_time,
                    duration_minutes: session.duration().num_minutes(),
                    exercise_type: exercise_type.clone(),
                    title: title.clone(),
                    distance_meters: aggregate.and_then(|a| a.distance_meters),
                    active_calories: aggregate.and_then(|a| a.active_calories),
                    source_device: self.device_of(session),
                })
            })
            .collect()
    }

    /// Day-level activity summaries in `tz`.
    ///
    /// One day is produced per local date touched by an input record. Where
    /// `day_totals` carries a platform aggregate for a field, it replaces the
    /// record-derived total.
    pub fn activity(
        &self,
        tz: Tz,
        inputs: ActivityInputs<'_>,
        day_totals: &HashMap<NaiveDate, AggregateSummary>,
    ) -> Vec<ActivityDay> {
        let mut days: BTreeMap<NaiveDate, ActivitySamples> = BTreeMap::new();

        type Field = fn(&mut ActivitySamples) -> &mut Vec<NormalizedSample>;
        let mut collect = |records: &[RawRecord], pick: Field| {
            for record in records {
                if let Some(sample) = self.sample(record) {
                    pick(days.entry(local_date(record, tz)).or_default()).push(sample);
                }
            }
        };

        collect(inputs.active_energy, |s| &mut s.active_energy);
        collect(inputs.basal_metabolic_rate, |s| &mut s.basal_energy);
        collect(inputs.floors_climbed, |s| &mut s.floors_climbed);
        collect(inputs.distance, |s| &mut s.distance);
        collect(inputs.steps, |s| &mut s.steps);
        collect(inputs.vo2_max, |s| &mut s.vo2_max);

        days.into_iter()
            .map(|(date, samples)| {
                let aggregate = day_totals.get(&date).cloned().unwrap_or_default();
                build_activity_day(date, samples, &aggregate)
            })
            .collect()
    }

    /// One sleep per session, with stage minutes from the session's segments.
    ///
    /// `stages` maps session ids to their stage segment records.
    pub fn sleep(
        &self,
        sessions: &[RawRecord],
        stages: &HashMap<String, Vec<RawRecord>>,
    ) -> Vec<Sleep> {
        sessions
            .iter()
            .filter_map(|session| {
                let RecordValue::SleepSession { title } = &session.value else {
                    return None;
                };

                let mut minutes = SleepStageMinutes::default();
                let mut segments = Vec::new();
                for record in stages.get(&session.id).map(Vec::as_slice).unwrap_or(&[]) {
                    let RecordValue::SleepStage { stage } = record.value else {
                        continue;
                    };
                    let start = record.start_time.max(session.start_time);
                    let end = record.end_time.min(session.end_time);
                    if end <= start {
                        continue;
                    }
                    minutes.add(stage, (end - start).num_seconds() as f64 / 60.0);
                    segments.push(SleepSegment { start, end, stage });
                }

                Some(Sleep {
                    id: session.id.clone(),
                    start: session.start_time,
                    end: session.end_time,
                    duration_minutes: session.duration().num_minutes(),
                    title: title.clone(),
                    stages: minutes,
                    segments,
                    source_device: self.device_of(session),
                })
            })
            .collect()
    }

    /// Blood glucose samples in mmol/L
    pub fn glucose(&self, records: &[RawRecord]) -> Vec<NormalizedSample> {
        self.samples(records)
    }

    pub fn heart_rate(&self, records: &[RawRecord]) -> Vec<NormalizedSample> {
        self.samples(records)
    }

    pub fn heart_rate_variability(&self, records: &[RawRecord]) -> Vec<NormalizedSample> {
        self.samples(records)
    }

    /// Hydration samples in ml
    pub fn water(&self, records: &[RawRecord]) -> Vec<NormalizedSample> {
        self.samples(records)
    }

    /// Systolic/diastolic pairs in mmHg
    pub fn blood_pressure(&self, records: &[RawRecord]) -> Vec<BloodPressureSample> {
        records
            .iter()
            .filter_map(|record| match record.value {
                RecordValue::BloodPressure {
                    systolic,
                    diastolic,
                } => Some(BloodPressureSample {
                    timestamp: record.start_time,
                    systolic,
                    diastolic,
                    unit: Unit::MmHg.as_str().to_string(),
                    source_device: self.device_of(record),
                }),
                _ => None,
            })
            .collect()
    }
}

fn latest_value(samples: &[NormalizedSample]) -> Option<f64> {
    samples
        .iter()
        .max_by_key(|sample| sample.end.unwrap_or(sample.timestamp))
        .map(|sample| sample.value)
}

fn sum(samples: &[NormalizedSample]) -> Option<f64> {
    if samples.is_empty() {
        None
    } else {
        Some(samples.iter().map(|s| s.value).sum())
    }
}

fn build_activity_day(
    date: NaiveDate,
    samples: ActivitySamples,
    aggregate: &AggregateSummary,
) -> ActivityDay {
    let mut active_calories = aggregate
        .active_calories
        .or_else(|| sum(&samples.active_energy))
        .map(floor_total);
    let mut basal_calories = aggregate
        .basal_calories
        .or_else(|| sum(&samples.basal_energy))
        .map(floor_total);
    let total_calories = aggregate.total_calories.map(floor_total);

    reconcile_calories(total_calories, &mut active_calories, &mut basal_calories);

    ActivityDay {
        date,
        active_calories,
        basal_calories,
        total_calories,
        steps: aggregate
            .steps
            .or_else(|| sum(&samples.steps).map(|steps| floor_total(steps) as i64)),
        distance_meters: aggregate
            .distance_meters
            .or_else(|| sum(&samples.distance))
            .map(floor_total),
        floors_climbed: aggregate
            .floors_climbed
            .or_else(|| sum(&samples.floors_climbed))
            .map(floor_total),
        exercise_minutes: aggregate.exercise_minutes,
        vo2_max: latest_value(&samples.vo2_max),
        samples,
    }
}
