//! Workout totals grouped by sport or by calendar period.

use crate::types::Workout;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Weeks starting on Sunday.
    Week,
    /// Weeks starting on Monday.
    WeekMonday,
    Month,
    Year,
}

impl Period {
    fn key(self, date: DateTime<Utc>) -> String {
        let fmt = match self {
            Self::Week => "%Y-W%U",
            Self::WeekMonday => "%Y-W%W",
            Self::Month => "%Y-%m",
            Self::Year => "%Y",
        };
        date.format(fmt).to_string()
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "week" => Ok(Self::Week),
            "weekm" => Ok(Self::WeekMonday),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            other => Err(format!("Invalid time period: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub nb_workouts: u32,
    pub total_distance_km: f64,
    pub total_duration_s: i64,
}

impl Totals {
    fn add(&mut self, w: &Workout) {
        self.nb_workouts += 1;
        self.total_distance_km += w.distance_km.unwrap_or(0.0);
        self.total_duration_s += w.duration.num_seconds();
    }
}

/// Inclusive date range; either end may be open.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    fn contains(&self, date: DateTime<Utc>) -> bool {
        let day = date.date_naive();
        self.from.is_none_or(|f| day >= f) && self.to.is_none_or(|t| day <= t)
    }
}

pub fn by_sport<'a>(
    workouts: impl IntoIterator<Item = &'a Workout>,
    range: DateRange,
) -> BTreeMap<i64, Totals> {
    let mut out = BTreeMap::new();
    for w in workouts.into_iter().filter(|w| range.contains(w.workout_date)) {
        out.entry(w.sport_id).or_insert_with(Totals::default).add(w);
    }
    out
}

pub fn by_period<'a>(
    workouts: impl IntoIterator<Item = &'a Workout>,
    period: Period,
    range: DateRange,
) -> BTreeMap<String, BTreeMap<i64, Totals>> {
    let mut out: BTreeMap<String, BTreeMap<i64, Totals>> = BTreeMap::new();
    for w in workouts.into_iter().filter(|w| range.contains(w.workout_date)) {
        out.entry(period.key(w.workout_date))
            .or_default()
            .entry(w.sport_id)
            .or_default()
            .add(w);
    }
    out
}
