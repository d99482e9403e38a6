#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use trackrecords::records::{Record, RecordOp, RecordsDelta};
use trackrecords::types::{GeoPoint, Metrics, NewWorkout, Workout};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::seconds(secs)
}

pub fn day(n: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, n, 8, 0, 0).unwrap()
}

/// Point `north_m` meters north of 45N 6E, timed `secs` after the base time.
pub fn pt(north_m: f64, secs: i64) -> GeoPoint {
    GeoPoint::new(45.0 + north_m / 111_195.0, 6.0).with_time(at(secs))
}

pub fn workout(id: i64, user_id: i64, sport_id: i64, date: DateTime<Utc>, km: f64) -> Workout {
    Workout {
        id,
        user_id,
        sport_id,
        title: None,
        workout_date: date,
        duration: Duration::seconds((km * 360.0) as i64),
        moving: Some(Duration::seconds((km * 360.0) as i64)),
        pauses: Some(Duration::zero()),
        distance_km: Some(km),
        min_alt: None,
        max_alt: None,
        ascent: None,
        descent: None,
        max_speed_kmh: Some(15.0),
        ave_speed_kmh: Some(10.0),
        bounds: None,
        gpx_path: None,
        map_path: None,
    }
}

pub fn new_workout(user_id: i64, sport_id: i64, date: DateTime<Utc>, km: f64) -> NewWorkout {
    let moving = Duration::seconds((km * 360.0) as i64);
    NewWorkout {
        user_id,
        sport_id,
        title: Some(format!("{km} km")),
        workout_date: date,
        metrics: Metrics {
            distance_km: km,
            moving_distance_km: km,
            duration: Some(moving),
            moving_time: Some(moving),
            stopped_time: Some(Duration::zero()),
            max_speed_kmh: 15.0,
            average_speed_kmh: 10.0,
            ..Metrics::default()
        },
        segments: Vec::new(),
        gpx_path: None,
    }
}

/// Applies a delta to an in-memory record table, numbering new rows from 100.
pub fn apply(records: &mut Vec<Record>, delta: &RecordsDelta) {
    for op in &delta.ops {
        match op {
            RecordOp::Create(d) => {
                let id = records.iter().map(|r| r.id).max().unwrap_or(99) + 1;
                records.push(Record {
                    id,
                    user_id: d.user_id,
                    sport_id: d.sport_id,
                    workout_id: d.workout_id,
                    workout_date: d.workout_date,
                    record_type: d.record_type,
                    value: d.value,
                });
            }
            RecordOp::Update { id, data } => {
                let r = records.iter_mut().find(|r| r.id == *id).unwrap();
                r.workout_id = data.workout_id;
                r.workout_date = data.workout_date;
                r.value = data.value;
            }
            RecordOp::Delete { id, .. } => records.retain(|r| r.id != *id),
        }
    }
}
