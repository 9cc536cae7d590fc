//! Raw record definitions
//!
//! A raw record is one measurement as stored by the on-device health platform:
//! - Instant records (weight, glucose, VO2 max) have `start_time == end_time`
//! - Interval records (steps, hydration, sessions) span `[start_time, end_time]`
//!
//! Values are tagged so that quantity, blood pressure, sleep stage and session
//! records share one type.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Concrete record type exposed by the health platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    // Activity
    ActiveCaloriesBurned,
    BasalMetabolicRate,
    TotalCaloriesBurned,
    Steps,
    Distance,
    FloorsClimbed,
    Vo2Max,

    // Sessions
    ExerciseSession,
    SleepSession,
    SleepStage,

    // Body
    Height,
    Weight,
    BodyFat,

    // Vitals
    BloodGlucose,
    BloodPressure,
    HeartRate,
    HeartRateVariabilityRmssd,
    Hydration,
}

impl RecordKind {
    pub const ALL: [RecordKind; 18] = [
        RecordKind::ActiveCaloriesBurned,
        RecordKind::BasalMetabolicRate,
        RecordKind::TotalCaloriesBurned,
        RecordKind::Steps,
        RecordKind::Distance,
        RecordKind::FloorsClimbed,
        RecordKind::Vo2Max,
        RecordKind::ExerciseSession,
        RecordKind::SleepSession,
        RecordKind::SleepStage,
        RecordKind::Height,
        RecordKind::Weight,
        RecordKind::BodyFat,
        RecordKind::BloodGlucose,
        RecordKind::BloodPressure,
        RecordKind::HeartRate,
        RecordKind::HeartRateVariabilityRmssd,
        RecordKind::Hydration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::ActiveCaloriesBurned => "active_calories_burned",
            RecordKind::BasalMetabolicRate => "basal_metabolic_rate",
            RecordKind::TotalCaloriesBurned => "total_calories_burned",
            RecordKind::Steps => "steps",
            RecordKind::Distance => "distance",
            RecordKind::FloorsClimbed => "floors_climbed",
            RecordKind::Vo2Max => "vo2_max",
            RecordKind::ExerciseSession => "exercise_session",
            RecordKind::SleepSession => "sleep_session",
            RecordKind::SleepStage => "sleep_stage",
            RecordKind::Height => "height",
            RecordKind::Weight => "weight",
            RecordKind::BodyFat => "body_fat",
            RecordKind::BloodGlucose => "blood_glucose",
            RecordKind::BloodPressure => "blood_pressure",
            RecordKind::HeartRate => "heart_rate",
            RecordKind::HeartRateVariabilityRmssd => "heart_rate_variability_rmssd",
            RecordKind::Hydration => "hydration",
        }
    }

    /// Whether records of this kind are point-in-time readings
    pub fn is_instant(&self) -> bool {
        matches!(
            self,
            RecordKind::BasalMetabolicRate
                | RecordKind::Vo2Max
                | RecordKind::Height
                | RecordKind::Weight
                | RecordKind::BodyFat
                | RecordKind::BloodGlucose
                | RecordKind::BloodPressure
                | RecordKind::HeartRateVariabilityRmssd
        )
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown record kind: {}", s))
    }
}

/// Measurement unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    // Energy
    Kcal,
    Kj,

    // Length
    Meters,
    Kilometers,
    Miles,
    Centimeters,
    Inches,

    // Mass
    Kg,
    Lbs,

    // Volume
    Ml,
    Liters,

    // Vitals
    Bpm,
    Ms,
    MmHg,
    MmolPerL,
    MgPerDl,
    MlPerKgMin,

    // Generic
    Count,
    Percent,
    Minutes,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Kcal => "kcal",
            Unit::Kj => "kJ",
            Unit::Meters => "m",
            Unit::Kilometers => "km",
            Unit::Miles => "mi",
            Unit::Centimeters => "cm",
            Unit::Inches => "in",
            Unit::Kg => "kg",
            Unit::Lbs => "lb",
            Unit::Ml => "ml",
            Unit::Liters => "l",
            Unit::Bpm => "bpm",
            Unit::Ms => "ms",
            Unit::MmHg => "mmHg",
            Unit::MmolPerL => "mmol/L",
            Unit::MgPerDl => "mg/dL",
            Unit::MlPerKgMin => "mL/kg/min",
            Unit::Count => "count",
            Unit::Percent => "%",
            Unit::Minutes => "min",
        }
    }

    /// Convert a value into the canonical unit of its dimension.
    ///
    /// Energy → kcal, distance → m, height-scale lengths → cm, mass → kg,
    /// volume → ml, glucose → mmol/L. Canonical units pass through.
    pub fn to_canonical(self, value: f64) -> (f64, Unit) {
        match self {
            Unit::Kj => (value / 4.184, Unit::Kcal),
            Unit::Kilometers => (value * 1000.0, Unit::Meters),
            Unit::Miles => (value * 1609.344, Unit::Meters),
            Unit::Inches => (value * 2.54, Unit::Centimeters),
            Unit::Lbs => (value * 0.453_592_37, Unit::Kg),
            Unit::Liters => (value * 1000.0, Unit::Ml),
            Unit::MgPerDl => (value / 18.0182, Unit::MmolPerL),
            other => (value, other),
        }
    }
}

/// Sleep stage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SleepStage {
    Awake,
    Light,
    Deep,
    Rem,
    Unknown,
}

/// Record value, tagged by shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordValue {
    Quantity {
        value: f64,
        unit: Unit,
    },
    BloodPressure {
        systolic: f64,
        diastolic: f64,
    },
    SleepStage {
        stage: SleepStage,
    },
    Exercise {
        exercise_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    SleepSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
}

impl RecordValue {
    fn shape_name(&self) -> &'static str {
        match self {
            RecordValue::Quantity { .. } => "quantity",
            RecordValue::BloodPressure { .. } => "blood_pressure",
            RecordValue::SleepStage { .. } => "sleep_stage",
            RecordValue::Exercise { .. } => "exercise",
            RecordValue::SleepSession { .. } => "sleep_session",
        }
    }
}

/// One raw measurement read from the health platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Platform record identifier
    #[serde(default = "new_record_id")]
    pub id: String,
    /// Concrete record kind
    pub kind: RecordKind,
    /// Start of the measurement (UTC)
    pub start_time: DateTime<Utc>,
    /// End of the measurement (UTC); equals `start_time` for instant records
    pub end_time: DateTime<Utc>,
    /// Measured value
    pub value: RecordValue,
    /// Device that produced the record, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_device: Option<String>,
}

fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl RawRecord {
    /// Create a point-in-time quantity record
    pub fn instant(kind: RecordKind, time: DateTime<Utc>, value: f64, unit: Unit) -> Self {
        RawRecord {
            id: new_record_id(),
            kind,
            start_time: time,
            end_time: time,
            value: RecordValue::Quantity { value, unit },
            source_device: None,
        }
    }

    /// Create a quantity record spanning an interval
    pub fn interval(
        kind: RecordKind,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        value: f64,
        unit: Unit,
    ) -> Self {
        RawRecord {
            id: new_record_id(),
            kind,
            start_time,
            end_time,
            value: RecordValue::Quantity { value, unit },
            source_device: None,
        }
    }

    /// Create a blood pressure reading
    pub fn blood_pressure(time: DateTime<Utc>, systolic: f64, diastolic: f64) -> Self {
        RawRecord {
            id: new_record_id(),
            kind: RecordKind::BloodPressure,
            start_time: time,
            end_time: time,
            value: RecordValue::BloodPressure {
                systolic,
                diastolic,
            },
            source_device: None,
        }
    }

    /// Create an exercise session
    pub fn exercise(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exercise_type: impl Into<String>,
    ) -> Self {
        RawRecord {
            id: new_record_id(),
            kind: RecordKind::ExerciseSession,
            start_time,
            end_time,
            value: RecordValue::Exercise {
                exercise_type: exercise_type.into(),
                title: None,
            },
            source_device: None,
        }
    }

    /// Create a sleep session
    pub fn sleep_session(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        RawRecord {
            id: new_record_id(),
            kind: RecordKind::SleepSession,
            start_time,
            end_time,
            value: RecordValue::SleepSession { title: None },
            source_device: None,
        }
    }

    /// Create a sleep stage segment
    pub fn sleep_stage(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        stage: SleepStage,
    ) -> Self {
        RawRecord {
            id: new_record_id(),
            kind: RecordKind::SleepStage,
            start_time,
            end_time,
            value: RecordValue::SleepStage { stage },
            source_device: None,
        }
    }

    /// Override the record identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Attach the producing device
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.source_device = Some(device.into());
        self
    }

    /// The instant used for window membership: the end time, which equals the
    /// start time for point records.
    pub fn point_in_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }

    /// Quantity value and unit, if this is a quantity record
    pub fn quantity(&self) -> Option<(f64, Unit)> {
        match self.value {
            RecordValue::Quantity { value, unit } => Some((value, unit)),
            _ => None,
        }
    }

    /// Validate that the value shape matches the record kind
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_time < self.start_time {
            return Err(ValidationError::EndBeforeStart {
                id: self.id.clone(),
            });
        }

        let shape_ok = match (&self.kind, &self.value) {
            (RecordKind::BloodPressure, RecordValue::BloodPressure { .. }) => true,
            (RecordKind::SleepStage, RecordValue::SleepStage { .. }) => true,
            (RecordKind::ExerciseSession, RecordValue::Exercise { .. }) => true,
            (RecordKind::SleepSession, RecordValue::SleepSession { .. }) => true,
            (
                RecordKind::BloodPressure
                | RecordKind::SleepStage
                | RecordKind::ExerciseSession
                | RecordKind::SleepSession,
                _,
            ) => false,
            (_, RecordValue::Quantity { .. }) => true,
            _ => false,
        };

        if !shape_ok {
            return Err(ValidationError::ValueKindMismatch {
                kind: self.kind,
                value: self.value.shape_name().to_string(),
            });
        }

        if self.kind.is_instant() && self.start_time != self.end_time {
            return Err(ValidationError::InstantWithDuration {
                id: self.id.clone(),
                kind: self.kind,
            });
        }

        Ok(())
    }
}

/// Validation errors for raw records
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Record {id} ends before it starts")]
    EndBeforeStart { id: String },

    #[error("Value mismatch: {kind} records cannot carry a {value} value")]
    ValueKindMismatch { kind: RecordKind, value: String },

    #[error("Record {id} of instant kind {kind} spans an interval")]
    InstantWithDuration { id: String, kind: RecordKind },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_deserialize_quantity_record() {
        let json = r#"{
            "id": "rec-1",
            "kind": "steps",
            "start_time": "2024-01-15T08:00:00Z",
            "end_time": "2024-01-15T09:00:00Z",
            "value": { "type": "quantity", "value": 1200.0, "unit": "count" },
            "source_device": "Pixel Watch"
        }"#;

        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "rec-1");
        assert_eq!(record.kind, RecordKind::Steps);
        assert_eq!(record.quantity(), Some((1200.0, Unit::Count)));
        assert_eq!(record.duration(), Duration::hours(1));
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_missing_id_is_generated() {
        let json = r#"{
            "kind": "weight",
            "start_time": "2024-01-15T08:00:00Z",
            "end_time": "2024-01-15T08:00:00Z",
            "value": { "type": "quantity", "value": 72.5, "unit": "kg" }
        }"#;

        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
        assert!(record.source_device.is_none());
    }

    #[test]
    fn test_validation_rejects_shape_mismatch() {
        let mut record = RawRecord::instant(RecordKind::BloodPressure, at(8), 120.0, Unit::MmHg);
        assert!(matches!(
            record.validate(),
            Err(ValidationError::ValueKindMismatch { .. })
        ));

        record.value = RecordValue::BloodPressure {
            systolic: 120.0,
            diastolic: 80.0,
        };
        assert!(record.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_reversed_interval() {
        let record = RawRecord::interval(RecordKind::Steps, at(9), at(8), 10.0, Unit::Count);
        assert!(matches!(
            record.validate(),
            Err(ValidationError::EndBeforeStart { .. })
        ));

        let weight = RawRecord::interval(RecordKind::Weight, at(8), at(9), 70.0, Unit::Kg);
        assert!(matches!(
            weight.validate(),
            Err(ValidationError::InstantWithDuration { .. })
        ));
    }

    #[test]
    fn test_unit_canonicalization() {
        assert_eq!(Unit::Kilometers.to_canonical(1.5), (1500.0, Unit::Meters));
        assert_eq!(Unit::Liters.to_canonical(0.25), (250.0, Unit::Ml));
        assert_eq!(Unit::Kg.to_canonical(70.0), (70.0, Unit::Kg));

        let (glucose, unit) = Unit::MgPerDl.to_canonical(90.0);
        assert_eq!(unit, Unit::MmolPerL);
        assert!((glucose - 4.995).abs() < 0.001);

        let (mass, _) = Unit::Lbs.to_canonical(100.0);
        assert!((mass - 45.359).abs() < 0.001);
    }

    #[test]
    fn test_record_kind_round_trips_through_str() {
        for kind in RecordKind::ALL {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("calories".parse::<RecordKind>().is_err());
    }
}
