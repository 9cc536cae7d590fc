//! End-to-end sync attempts against an in-memory source.
//!
//! Covers: status sequencing → upload routing → token persistence, and the
//! equivalence of backfill and change-feed normalization.

mod common;

use chrono::Duration;
use chrono_tz::Tz;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

use synheart_sync::encoder::{PayloadEncoder, UploadPayload};
use synheart_sync::schema::{ChangeToken, RawRecord, RecordKind, SleepStage, Unit};
use synheart_sync::token::FileTokenStore;
use synheart_sync::{
    BackfillRequest, ChangeReconciler, ChangeTokenStore, IncrementalRequest, RecordSource,
    Resource, ResourcePipeline, StatusEvent, SyncError, SyncStatus, TimeWindow,
};

use common::{at, harness, harness_with_tokens};

fn day() -> TimeWindow {
    TimeWindow::new(at(0), at(0) + Duration::days(1))
}

fn backfill(resources: Vec<Resource>) -> BackfillRequest {
    BackfillRequest {
        account_id: "acct-42".to_string(),
        window: day(),
        resources,
    }
}

fn incremental(resources: Vec<Resource>) -> IncrementalRequest {
    IncrementalRequest {
        account_id: "acct-42".to_string(),
        resources,
        cutoff: None,
    }
}

/// A day of records touching every resource
fn full_day() -> Vec<RawRecord> {
    vec![
        RawRecord::instant(RecordKind::Height, at(7), 1.78, Unit::Meters),
        RawRecord::instant(RecordKind::Weight, at(7), 165.0, Unit::Lbs).with_device("Scale"),
        RawRecord::instant(RecordKind::BodyFat, at(7), 18.5, Unit::Percent),
        RawRecord::exercise(at(8), at(9), "running").with_id("run"),
        RawRecord::interval(RecordKind::Distance, at(8), at(9), 8.0, Unit::Kilometers),
        RawRecord::interval(RecordKind::ActiveCaloriesBurned, at(8), at(9), 540.0, Unit::Kcal),
        RawRecord::interval(RecordKind::BasalMetabolicRate, at(0), at(12), 800.0, Unit::Kcal),
        RawRecord::interval(RecordKind::Steps, at(8), at(9), 9000.0, Unit::Count),
        RawRecord::interval(RecordKind::FloorsClimbed, at(10), at(11), 4.0, Unit::Count),
        RawRecord::instant(RecordKind::Vo2Max, at(9), 47.0, Unit::MlPerKgMin),
        RawRecord::sleep_session(at(0), at(6)).with_id("night"),
        RawRecord::sleep_stage(at(0), at(3), SleepStage::Light),
        RawRecord::sleep_stage(at(3), at(6), SleepStage::Deep),
        RawRecord::instant(RecordKind::BloodGlucose, at(12), 95.0, Unit::MgPerDl),
        RawRecord::blood_pressure(at(12), 121.0, 79.0),
        RawRecord::instant(RecordKind::HeartRate, at(13), 64.0, Unit::Bpm),
        RawRecord::instant(RecordKind::HeartRateVariabilityRmssd, at(13), 42.0, Unit::Ms),
        RawRecord::interval(RecordKind::Hydration, at(14), at(15), 0.5, Unit::Liters),
    ]
}

#[tokio::test]
async fn test_water_and_body_status_sequence() {
    let h = harness();
    h.source
        .upsert(RawRecord::instant(RecordKind::Weight, at(8), 72.0, Unit::Kg));

    let report = h
        .orchestrator
        .backfill(&backfill(vec![Resource::Water, Resource::Body]))
        .await
        .unwrap();

    // Resources run in declaration order, whatever order they were requested in.
    assert_eq!(
        h.status.events(),
        vec![
            StatusEvent::new(Resource::Body, SyncStatus::Syncing),
            StatusEvent::new(Resource::Body, SyncStatus::Synced),
            StatusEvent::new(Resource::Water, SyncStatus::Syncing),
            StatusEvent::new(Resource::Water, SyncStatus::NothingToSync),
        ]
    );
    assert_eq!(h.uploader.resources(), vec![Resource::Body]);
    assert_eq!(report.outcomes.len(), 2);

    let (ctx, payload) = &h.uploader.uploads()[0];
    assert_eq!(ctx.account_id, "acct-42");
    assert_eq!(ctx.window_start, day().start);
    assert_eq!(ctx.window_end, day().end);
    assert_eq!(ctx.time_zone_id, "UTC");
    let UploadPayload::Body(body) = payload else {
        panic!("expected body payload");
    };
    assert_eq!(body.body_mass_kg, Some(72.0));
}

#[tokio::test]
async fn test_empty_source_uploads_only_profile_and_body() {
    let h = harness();
    let all: Vec<Resource> = Resource::ALL.to_vec();

    let report = h.orchestrator.backfill(&backfill(all)).await.unwrap();

    assert_eq!(h.uploader.resources(), vec![Resource::Profile, Resource::Body]);
    for outcome in &report.outcomes {
        let expected = match outcome.resource {
            Resource::Profile | Resource::Body => SyncStatus::Synced,
            _ => SyncStatus::NothingToSync,
        };
        assert_eq!(outcome.status, expected, "{}", outcome.resource);
    }
    // Aliases collapse into activity.
    assert_eq!(report.outcomes.len(), 10);
}

#[tokio::test]
async fn test_record_ending_at_window_end_is_excluded() {
    let h = harness();
    let end = day().end;
    h.source.upsert(RawRecord::instant(RecordKind::HeartRate, end, 70.0, Unit::Bpm));
    h.source.upsert(RawRecord::instant(
        RecordKind::HeartRate,
        end - Duration::milliseconds(1),
        71.0,
        Unit::Bpm,
    ));

    h.orchestrator
        .backfill(&backfill(vec![Resource::HeartRate]))
        .await
        .unwrap();

    let UploadPayload::HeartRate(samples) = &h.uploader.uploads()[0].1 else {
        panic!("expected heart rate payload");
    };
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, 71.0);
}

#[tokio::test]
async fn test_backfill_and_change_feed_agree() {
    let h = harness();
    let start = h.source.changes_token(&[]).await.unwrap();
    for record in full_day() {
        h.source.upsert(record);
    }

    let pipeline = ResourcePipeline::new(h.source.clone(), Tz::UTC, "unknown");
    let reconciler = ChangeReconciler::new(pipeline.clone());
    let changes = h.source.changes(&start).await.unwrap();

    for resource in Resource::ALL
        .into_iter()
        .filter(|resource| !resource.is_sub_resource())
    {
        let from_reads = pipeline.process(resource, day()).await.unwrap();
        let from_changes = reconciler.reconcile(resource, &changes, None).await.unwrap();
        assert!(!from_reads.is_empty(), "{} should have data", resource);
        assert_eq!(from_reads, from_changes, "{}", resource);
    }
}

#[tokio::test]
async fn test_edited_records_agree_across_paths() {
    let h = harness();
    let start = h.source.changes_token(&[]).await.unwrap();
    h.source.upsert(
        RawRecord::interval(RecordKind::Hydration, at(9), at(10), 200.0, Unit::Ml).with_id("w1"),
    );
    h.source.upsert(
        RawRecord::interval(RecordKind::Steps, at(8), at(9), 3000.0, Unit::Count).with_id("s1"),
    );
    h.source.upsert(
        RawRecord::interval(RecordKind::Hydration, at(9), at(10), 250.0, Unit::Ml).with_id("w1"),
    );
    h.source.upsert(
        RawRecord::interval(RecordKind::Steps, at(8), at(9), 3200.0, Unit::Count).with_id("s1"),
    );

    let pipeline = ResourcePipeline::new(h.source.clone(), Tz::UTC, "unknown")
        .with_platform_aggregates(false);
    let reconciler = ChangeReconciler::new(pipeline.clone());
    let changes = h.source.changes(&start).await.unwrap();

    for resource in [Resource::Water, Resource::Activity] {
        let from_reads = pipeline.process(resource, day()).await.unwrap();
        let from_changes = reconciler.reconcile(resource, &changes, None).await.unwrap();
        assert_eq!(from_reads, from_changes, "{}", resource);
    }

    let UploadPayload::Water(samples) =
        PayloadEncoder::encode(reconciler.reconcile(Resource::Water, &changes, None).await.unwrap())
    else {
        panic!("expected water payload");
    };
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, 250.0);

    let UploadPayload::Activity(days) =
        PayloadEncoder::encode(reconciler.reconcile(Resource::Steps, &changes, None).await.unwrap())
    else {
        panic!("expected activity payload");
    };
    assert_eq!(days[0].steps, Some(3200));
}

#[tokio::test]
async fn test_steps_change_syncs_activity() {
    let h = harness();
    h.tokens.save(&ChangeToken::new("mem:0")).unwrap();
    h.source.upsert(RawRecord::interval(
        RecordKind::Steps,
        at(9),
        at(10),
        1234.0,
        Unit::Count,
    ));

    let report = h
        .orchestrator
        .sync_changes(&incremental(vec![Resource::Steps]))
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].resource, Resource::Activity);
    assert_eq!(report.outcomes[0].status, SyncStatus::Synced);

    let (ctx, payload) = &h.uploader.uploads()[0];
    assert_eq!(ctx.window_start, at(9));
    assert_eq!(ctx.window_end, at(10));
    let UploadPayload::Activity(days) = payload else {
        panic!("expected activity payload");
    };
    assert_eq!(days[0].steps, Some(1234));
}

#[tokio::test]
async fn test_sub_resource_cannot_be_normalized_directly() {
    let h = harness();
    let pipeline = ResourcePipeline::new(h.source.clone(), Tz::UTC, "unknown");

    let err = pipeline
        .process(Resource::BasalEnergyBurned, day())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::InvalidResourceState(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_failed_attempt_keeps_token_until_retry() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileTokenStore::new(dir.path().join("token.json")));
    let h = harness_with_tokens(store.clone());

    h.source
        .upsert(RawRecord::instant(RecordKind::HeartRate, at(6), 58.0, Unit::Bpm));
    h.orchestrator
        .backfill(&backfill(vec![Resource::HeartRate]))
        .await
        .unwrap();
    let baseline = store.load().unwrap();
    assert_eq!(baseline, Some(ChangeToken::new("mem:1")));

    h.source
        .upsert(RawRecord::instant(RecordKind::HeartRate, at(7), 61.0, Unit::Bpm));
    h.uploader.fail(true);
    let err = h
        .orchestrator
        .sync_changes(&incremental(vec![Resource::HeartRate]))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store.load().unwrap(), baseline);
    // No synced status without a completed upload.
    assert_eq!(
        h.status.events().last(),
        Some(&StatusEvent::new(Resource::HeartRate, SyncStatus::Syncing))
    );

    h.uploader.fail(false);
    let report = h
        .orchestrator
        .sync_changes(&incremental(vec![Resource::HeartRate]))
        .await
        .unwrap();
    assert_eq!(report.token, ChangeToken::new("mem:2"));
    assert_eq!(store.load().unwrap(), Some(ChangeToken::new("mem:2")));

    let UploadPayload::HeartRate(samples) = &h.uploader.uploads()[1].1 else {
        panic!("expected heart rate payload");
    };
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, 61.0);
}

#[tokio::test]
async fn test_cutoff_holds_back_in_flight_records() {
    let h = harness();
    h.tokens.save(&ChangeToken::new("mem:0")).unwrap();
    h.source.upsert(RawRecord::interval(
        RecordKind::Hydration,
        at(10),
        at(11),
        250.0,
        Unit::Ml,
    ));
    h.source.upsert(RawRecord::interval(
        RecordKind::Hydration,
        at(11),
        at(12),
        300.0,
        Unit::Ml,
    ));

    h.orchestrator
        .sync_changes(&IncrementalRequest {
            cutoff: Some(at(12)),
            ..incremental(vec![Resource::Water])
        })
        .await
        .unwrap();

    let UploadPayload::Water(samples) = &h.uploader.uploads()[0].1 else {
        panic!("expected water payload");
    };
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].value, 250.0);
}
