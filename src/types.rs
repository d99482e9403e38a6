use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
    pub time: Option<DateTime<Utc>>,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ele: None,
            time: None,
        }
    }

    #[must_use]
    pub const fn with_ele(mut self, ele: f64) -> Self {
        self.ele = Some(ele);
        self
    }

    #[must_use]
    pub const fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub idx: usize,
    pub points: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: Option<String>,
    pub segments: Vec<Segment>,
}

impl Track {
    /// Builds a track from raw point runs, numbering segments in order.
    pub fn from_segments(name: Option<String>, runs: Vec<Vec<GeoPoint>>) -> Self {
        let segments = runs
            .into_iter()
            .enumerate()
            .map(|(idx, points)| Segment { idx, points })
            .collect();
        Self { name, segments }
    }

    pub fn points(&self) -> impl Iterator<Item = &GeoPoint> {
        self.segments.iter().flat_map(|s| s.points.iter())
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(|s| s.points.len()).sum()
    }
}

/// `[min_lat, min_lon, max_lat, max_lon]`
pub type Bounds = [f64; 4];

/// Aggregates for one segment or a whole track.
///
/// Durations are `None` when the points carry no timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub distance_km: f64,
    pub moving_distance_km: f64,
    pub duration: Option<Duration>,
    pub moving_time: Option<Duration>,
    pub stopped_time: Option<Duration>,
    pub elevation_min: Option<f64>,
    pub elevation_max: Option<f64>,
    pub ascent: Option<f64>,
    pub descent: Option<f64>,
    pub max_speed_kmh: f64,
    pub average_speed_kmh: f64,
    pub bounds: Option<Bounds>,
}

pub type SegmentMetrics = Metrics;
pub type TrackMetrics = Metrics;

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSample {
    pub distance_km: f64,
    pub duration: Option<Duration>,
    pub elevation: f64,
    pub lat: f64,
    pub lon: f64,
    pub speed_kmh: f64,
    pub time: Option<DateTime<Utc>>,
}

/// A stored workout, as the records engine and the stores see it.
#[derive(Debug, Clone, PartialEq)]
pub struct Workout {
    pub id: i64,
    pub user_id: i64,
    pub sport_id: i64,
    pub title: Option<String>,
    pub workout_date: DateTime<Utc>,
    pub duration: Duration,
    pub moving: Option<Duration>,
    pub pauses: Option<Duration>,
    pub distance_km: Option<f64>,
    pub min_alt: Option<f64>,
    pub max_alt: Option<f64>,
    pub ascent: Option<f64>,
    pub descent: Option<f64>,
    pub max_speed_kmh: Option<f64>,
    pub ave_speed_kmh: Option<f64>,
    pub bounds: Option<Bounds>,
    pub gpx_path: Option<String>,
    pub map_path: Option<String>,
}

impl Workout {
    /// Whether `other` differs from `self` in a field any record depends on.
    pub fn record_fields_changed(&self, other: &Self) -> bool {
        self.sport_id != other.sport_id
            || self.workout_date != other.workout_date
            || self.distance_km != other.distance_km
            || self.moving != other.moving
            || self.max_speed_kmh != other.max_speed_kmh
            || self.ave_speed_kmh != other.ave_speed_kmh
    }
}

/// A workout not yet persisted, with one metrics row per segment.
#[derive(Debug, Clone)]
pub struct NewWorkout {
    pub user_id: i64,
    pub sport_id: i64,
    pub title: Option<String>,
    pub workout_date: DateTime<Utc>,
    pub metrics: TrackMetrics,
    pub segments: Vec<SegmentMetrics>,
    pub gpx_path: Option<String>,
}

impl NewWorkout {
    /// Flattens the computed metrics into the stored workout shape.
    pub fn into_workout(self, id: i64) -> Workout {
        let m = self.metrics;
        Workout {
            id,
            user_id: self.user_id,
            sport_id: self.sport_id,
            title: self.title,
            workout_date: self.workout_date,
            duration: m.duration.unwrap_or_else(Duration::zero),
            moving: m.moving_time,
            pauses: m.stopped_time,
            distance_km: Some(m.distance_km),
            min_alt: m.elevation_min,
            max_alt: m.elevation_max,
            ascent: m.ascent,
            descent: m.descent,
            max_speed_kmh: Some(m.max_speed_kmh),
            ave_speed_kmh: Some(m.average_speed_kmh),
            bounds: m.bounds,
            gpx_path: self.gpx_path,
            map_path: None,
        }
    }
}
