//! Personal records: per (user, sport) bests and the reconciliation that keeps
//! the stored rows in line with the workouts.
//!
//! Values are stored as integers (fixed-point for speeds and distance, whole
//! seconds for durations). The per-type scale and decode shape live in one
//! table, [`CODECS`].

use crate::error::RecordsError;
use crate::types::Workout;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    /// Best average speed (km/h)
    AverageSpeed,
    /// Farthest distance (km)
    FarthestDistance,
    /// Longest moving time
    LongestDuration,
    /// Max speed (km/h)
    MaxSpeed,
}

impl RecordType {
    pub const ALL: [Self; 4] = [
        Self::AverageSpeed,
        Self::FarthestDistance,
        Self::LongestDuration,
        Self::MaxSpeed,
    ];

    pub fn code(self) -> &'static str {
        CODECS[self as usize].code
    }

    fn codec(self) -> &'static Codec {
        &CODECS[self as usize]
    }

    /// The workout column this record is computed from, as a real value.
    pub fn workout_value(self, w: &Workout) -> Option<RecordValue> {
        match self {
            Self::AverageSpeed => w.ave_speed_kmh.map(RecordValue::Number),
            Self::FarthestDistance => w.distance_km.map(RecordValue::Number),
            Self::LongestDuration => w.moving.map(RecordValue::Duration),
            Self::MaxSpeed => w.max_speed_kmh.map(RecordValue::Number),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == s)
            .ok_or_else(|| format!("unknown record type: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Number,
    Duration,
}

#[derive(Debug)]
struct Codec {
    code: &'static str,
    scale: f64,
    shape: Shape,
}

/// Indexed by `RecordType as usize`.
static CODECS: [Codec; 4] = [
    Codec {
        code: "AS",
        scale: 100.0,
        shape: Shape::Number,
    },
    Codec {
        code: "FD",
        scale: 1000.0,
        shape: Shape::Number,
    },
    Codec {
        code: "LD",
        scale: 1.0,
        shape: Shape::Duration,
    },
    Codec {
        code: "MS",
        scale: 100.0,
        shape: Shape::Number,
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordValue {
    Number(f64),
    Duration(Duration),
}

impl RecordValue {
    /// Real value used for comparisons; durations in seconds.
    pub fn as_real(self) -> f64 {
        match self {
            Self::Number(v) => v,
            Self::Duration(d) => d.num_milliseconds() as f64 / 1000.0,
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Duration(d) => f.write_str(&crate::utils::format_duration(*d)),
        }
    }
}

pub fn encode(record_type: RecordType, value: RecordValue) -> i64 {
    (value.as_real() * record_type.codec().scale).round() as i64
}

pub fn decode(record_type: RecordType, stored: i64) -> RecordValue {
    let codec = record_type.codec();
    match codec.shape {
        Shape::Number => RecordValue::Number(stored as f64 / codec.scale),
        Shape::Duration => RecordValue::Duration(Duration::seconds(stored)),
    }
}

/// A stored record row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: i64,
    pub user_id: i64,
    pub sport_id: i64,
    pub workout_id: i64,
    pub workout_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub value: i64,
}

impl Record {
    pub fn decoded(&self) -> RecordValue {
        decode(self.record_type, self.value)
    }
}

/// Row contents for a create or an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordData {
    pub user_id: i64,
    pub sport_id: i64,
    pub workout_id: i64,
    pub workout_date: DateTime<Utc>,
    pub record_type: RecordType,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOp {
    Create(RecordData),
    Update { id: i64, data: RecordData },
    Delete { id: i64, record_type: RecordType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordsDelta {
    pub user_id: i64,
    pub sport_id: i64,
    pub ops: Vec<RecordOp>,
}

impl RecordsDelta {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Best workout for a record type: highest value, earliest `workout_date` on ties.
///
/// Missing or zero values never qualify.
pub fn best_workout<'a>(
    record_type: RecordType,
    workouts: impl IntoIterator<Item = &'a Workout>,
) -> Option<(&'a Workout, RecordValue)> {
    workouts
        .into_iter()
        .filter_map(|w| {
            let v = record_type.workout_value(w)?;
            (v.as_real() > 0.0).then_some((w, v))
        })
        .min_by(|(wa, va), (wb, vb)| {
            vb.as_real()
                .partial_cmp(&va.as_real())
                .unwrap_or(Ordering::Equal)
                .then(wa.workout_date.cmp(&wb.workout_date))
                .then(wa.id.cmp(&wb.id))
        })
}

/// Diffs the best value of every record type against the stored rows of
/// one (user, sport).
///
/// Workouts belonging to another user or sport are ignored. Applying the
/// returned delta and calling this again with the same history yields an
/// empty delta.
pub fn reconcile_records(
    user_id: i64,
    sport_id: i64,
    workout_history: &[Workout],
    existing_records: &[Record],
) -> Result<RecordsDelta, RecordsError> {
    let mut stored: [Option<&Record>; 4] = [None; 4];
    for r in existing_records {
        if r.user_id != user_id || r.sport_id != sport_id {
            return Err(RecordsError::ForeignRecord {
                record_id: r.id,
                user_id: r.user_id,
                sport_id: r.sport_id,
            });
        }
        let slot = &mut stored[r.record_type as usize];
        if slot.is_some() {
            return Err(RecordsError::DuplicateRecord(r.record_type, user_id, sport_id));
        }
        *slot = Some(r);
    }

    let history = || {
        workout_history
            .iter()
            .filter(|w| w.user_id == user_id && w.sport_id == sport_id)
    };

    let mut ops = Vec::new();
    for record_type in RecordType::ALL {
        let best = best_workout(record_type, history());
        let current = stored[record_type as usize];

        match (best, current) {
            (Some((w, v)), current) => {
                let data = RecordData {
                    user_id,
                    sport_id,
                    workout_id: w.id,
                    workout_date: w.workout_date,
                    record_type,
                    value: encode(record_type, v),
                };
                match current {
                    None => ops.push(RecordOp::Create(data)),
                    Some(r) if !same_row(r, &data) => {
                        ops.push(RecordOp::Update { id: r.id, data });
                    }
                    Some(_) => {}
                }
            }
            (None, Some(r)) => ops.push(RecordOp::Delete {
                id: r.id,
                record_type,
            }),
            (None, None) => {}
        }
    }

    Ok(RecordsDelta {
        user_id,
        sport_id,
        ops,
    })
}

fn same_row(r: &Record, data: &RecordData) -> bool {
    r.value == data.value && r.workout_id == data.workout_id && r.workout_date == data.workout_date
}
