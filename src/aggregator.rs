//! Platform aggregation
//!
//! This module asks the record source to compute totals directly, which is
//! preferred over summing raw samples when those are fragmented, duplicated
//! across apps, or partially permitted.
//! - Metrics are intersected with granted permissions before querying
//! - Zero permitted metrics yields an empty summary without a query
//! - Totals are floored so repeated partial aggregation never over-reports

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Result, SyncError};
use crate::schema::RecordKind;
use crate::source::RecordSource;
use crate::types::{AggregateMetric, AggregateSummary, TimeWindow};

/// Metrics requested for a workout session window
const WORKOUT_METRICS: [(RecordKind, AggregateMetric); 2] = [
    (RecordKind::Distance, AggregateMetric::DistanceTotal),
    (
        RecordKind::ActiveCaloriesBurned,
        AggregateMetric::ActiveCaloriesTotal,
    ),
];

/// Metrics requested for an activity day
const ACTIVITY_DAY_METRICS: [(RecordKind, AggregateMetric); 7] = [
    (
        RecordKind::TotalCaloriesBurned,
        AggregateMetric::TotalCaloriesTotal,
    ),
    (
        RecordKind::ActiveCaloriesBurned,
        AggregateMetric::ActiveCaloriesTotal,
    ),
    (
        RecordKind::BasalMetabolicRate,
        AggregateMetric::BasalCaloriesTotal,
    ),
    (RecordKind::Steps, AggregateMetric::StepsCountTotal),
    (RecordKind::Distance, AggregateMetric::DistanceTotal),
    (RecordKind::FloorsClimbed, AggregateMetric::FloorsClimbedTotal),
    (
        RecordKind::ExerciseSession,
        AggregateMetric::ExerciseDurationTotal,
    ),
];

/// Computes summaries through the source's native aggregation
#[derive(Clone)]
pub struct Aggregator {
    source: Arc<dyn RecordSource>,
}

impl Aggregator {
    pub fn new(source: Arc<dyn RecordSource>) -> Self {
        Self { source }
    }

    /// Intersect requested metrics with the currently granted read permissions.
    ///
    /// A metric whose owning record kind is not granted is silently dropped.
    pub async fn permitted_metrics(
        &self,
        requested: &[(RecordKind, AggregateMetric)],
    ) -> Result<HashSet<AggregateMetric>> {
        let granted = self.source.granted_permissions().await?;
        Ok(requested
            .iter()
            .filter(|(kind, _)| granted.contains(kind))
            .map(|(_, metric)| *metric)
            .collect())
    }

    /// Aggregate `metrics` over `[window.start, window.end)`
    pub async fn aggregate(
        &self,
        window: TimeWindow,
        metrics: &HashSet<AggregateMetric>,
    ) -> Result<AggregateSummary> {
        if metrics.is_empty() {
            return Ok(AggregateSummary::default());
        }

        let totals = match self.source.aggregate(window, metrics).await {
            Ok(totals) => totals,
            Err(SyncError::PermissionDenied { kind }) => {
                // Revoked between the permission check and the query.
                tracing::warn!(%kind, "permission revoked during aggregation");
                return Ok(AggregateSummary::default());
            }
            Err(e) => return Err(e),
        };

        Ok(summary_from_totals(&totals))
    }

    /// Distance and active calories over an exercise session
    pub async fn aggregate_workout_summary(&self, window: TimeWindow) -> Result<AggregateSummary> {
        let metrics = self.permitted_metrics(&WORKOUT_METRICS).await?;
        self.aggregate(window, &metrics).await
    }

    /// Day totals for `date`, bounded by local midnights in `tz`.
    ///
    /// With `until`, the window ends at whichever comes first: `until` or the
    /// next local midnight.
    pub async fn aggregate_activity_day_summary(
        &self,
        date: NaiveDate,
        tz: Tz,
        until: Option<DateTime<Utc>>,
    ) -> Result<AggregateSummary> {
        let mut window = day_window(date, tz)?;
        if let Some(until) = until {
            window.end = window.end.min(until);
        }
        let metrics = self.permitted_metrics(&ACTIVITY_DAY_METRICS).await?;
        let mut summary = self.aggregate(window, &metrics).await?;

        reconcile_calories(
            summary.total_calories,
            &mut summary.active_calories,
            &mut summary.basal_calories,
        );

        tracing::debug!(%date, %tz, ?summary, "aggregated activity day");
        Ok(summary)
    }
}

fn summary_from_totals(totals: &HashMap<AggregateMetric, f64>) -> AggregateSummary {
    let get = |metric: AggregateMetric| totals.get(&metric).copied().map(floor_total);

    AggregateSummary {
        distance_meters: get(AggregateMetric::DistanceTotal),
        active_calories: get(AggregateMetric::ActiveCaloriesTotal),
        basal_calories: get(AggregateMetric::BasalCaloriesTotal),
        total_calories: get(AggregateMetric::TotalCaloriesTotal),
        steps: get(AggregateMetric::StepsCountTotal).map(|steps| steps as i64),
        floors_climbed: get(AggregateMetric::FloorsClimbedTotal),
        exercise_minutes: get(AggregateMetric::ExerciseDurationTotal).map(|mins| mins as i64),
    }
}

/// Truncate an aggregated total; never round up
pub fn floor_total(value: f64) -> f64 {
    value.floor()
}

/// Derive the missing calorie component when exactly two are known.
///
/// Only active and basal are ever derived; an absent total stays absent.
pub fn reconcile_calories(total: Option<f64>, active: &mut Option<f64>, basal: &mut Option<f64>) {
    match (total, *active, *basal) {
        (Some(total), None, Some(basal_value)) => *active = Some(total - basal_value),
        (Some(total), Some(active_value), None) => *basal = Some(total - active_value),
        _ => {}
    }
}

/// The absolute window covering local midnight to local midnight of `date` in `tz`
pub fn day_window(date: NaiveDate, tz: Tz) -> Result<TimeWindow> {
    let next = date
        .succ_opt()
        .ok_or_else(|| SyncError::InvalidResourceState(format!("no day after {}", date)))?;
    Ok(TimeWindow::new(
        local_midnight(date, tz)?,
        local_midnight(next, tz)?,
    ))
}

fn local_midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        // Midnight skipped by a DST transition: the day starts after the gap.
        .or_else(|| {
            tz.from_local_datetime(&(midnight + Duration::hours(1)))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| {
            SyncError::InvalidTimezone(format!("{} has no local midnight on {}", tz, date))
        })
}
