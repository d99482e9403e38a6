use crate::error::TrackError;
use crate::types::{Bounds, GeoPoint, Segment, SegmentMetrics, Track, TrackMetrics};
use chrono::Duration;
use geo::{Distance, Haversine, Point};

/// Pairs at or below this speed count as stopped.
pub const DEFAULT_STOPPED_SPEED_KMH: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtractOptions {
    pub stopped_speed_kmh: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            stopped_speed_kmh: DEFAULT_STOPPED_SPEED_KMH,
        }
    }
}

/// Everything the persistence layer stores for one track.
#[derive(Debug, Clone)]
pub struct ExtractedTrack {
    pub metrics: TrackMetrics,
    pub segments: Vec<SegmentMetrics>,
    pub gaps: Vec<Duration>,
}

/// Surface distance in meters, ignoring elevation.
pub fn distance_2d(a: &GeoPoint, b: &GeoPoint) -> f64 {
    Haversine.distance(Point::new(a.lon, a.lat), Point::new(b.lon, b.lat))
}

/// Distance in meters, including the elevation delta when both points carry one.
pub fn point_distance(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let flat = distance_2d(a, b);
    match (a.ele, b.ele) {
        (Some(ea), Some(eb)) => flat.hypot(eb - ea),
        _ => flat,
    }
}

/// Time from `a` to `b`, when both are timestamped. May be zero or negative.
pub fn time_delta(a: &GeoPoint, b: &GeoPoint) -> Option<Duration> {
    Some(b.time? - a.time?)
}

pub fn seconds(d: Duration) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

/// Speed in m/s between two points; undefined unless time moves forward.
pub fn pair_speed(a: &GeoPoint, b: &GeoPoint) -> Option<f64> {
    let secs = seconds(time_delta(a, b)?);
    (secs > 0.0).then(|| point_distance(a, b) / secs)
}

pub const fn mps_to_kmh(v: f64) -> f64 {
    v * 3.6
}

pub fn compute_segment_metrics(segment: &Segment, opts: &ExtractOptions) -> SegmentMetrics {
    let points = &segment.points;

    let mut distance_m = 0.0;
    let mut moving_distance_m = 0.0;
    let mut moving = Duration::zero();
    let mut stopped = Duration::zero();
    let mut max_speed_mps: f64 = 0.0;

    // Untimed points fold into the interval between the timed points around
    // them, so the intervals always add up to the segment duration.
    let mut anchor = points.first().and_then(|p| p.time);
    let mut interval_m = 0.0;

    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let d = point_distance(a, b);
        distance_m += d;
        interval_m += d;

        let Some(t) = b.time else {
            continue;
        };
        let Some(t0) = anchor.replace(t) else {
            // distance before the first timestamp has no time to go with
            interval_m = 0.0;
            continue;
        };
        let dt = t - t0;
        let secs = seconds(dt);
        let speed = (secs > 0.0).then(|| interval_m / secs);
        if let Some(v) = speed {
            max_speed_mps = max_speed_mps.max(v);
        }
        match speed {
            Some(v) if mps_to_kmh(v) > opts.stopped_speed_kmh => {
                moving += dt;
                moving_distance_m += interval_m;
            }
            _ => stopped += dt,
        }
        interval_m = 0.0;
    }

    let first_time = points.iter().find_map(|p| p.time);
    let last_time = points.iter().rev().find_map(|p| p.time);
    let duration = first_time.zip(last_time).map(|(t0, t1)| t1 - t0);

    let elevation = elevation_stats(points);

    SegmentMetrics {
        distance_km: distance_m / 1000.0,
        moving_distance_km: moving_distance_m / 1000.0,
        duration,
        moving_time: duration.map(|_| moving),
        stopped_time: duration.map(|_| stopped),
        elevation_min: elevation.map(|e| e.min),
        elevation_max: elevation.map(|e| e.max),
        ascent: elevation.map(|e| e.ascent),
        descent: elevation.map(|e| e.descent),
        max_speed_kmh: mps_to_kmh(max_speed_mps),
        average_speed_kmh: average_speed_kmh(moving_distance_m, moving),
        bounds: None,
    }
}

/// Time between the last point of each segment and the first point of the next.
pub fn inter_segment_gaps(track: &Track) -> Vec<Duration> {
    track
        .segments
        .windows(2)
        .map(|pair| {
            let end = pair[0].points.last().and_then(|p| p.time);
            let start = pair[1].points.first().and_then(|p| p.time);
            end.zip(start)
                .map_or_else(Duration::zero, |(end, start)| start - end)
        })
        .collect()
}

pub fn compute_track_metrics(
    track: &Track,
    gaps: &[Duration],
    opts: &ExtractOptions,
) -> Result<TrackMetrics, TrackError> {
    let segments: Vec<SegmentMetrics> = track
        .segments
        .iter()
        .map(|s| compute_segment_metrics(s, opts))
        .collect();
    combine(track, &segments, gaps)
}

/// Computes segment metrics, gaps and the track aggregate in one pass over the segments.
pub fn extract(track: &Track, opts: &ExtractOptions) -> Result<ExtractedTrack, TrackError> {
    let segments: Vec<SegmentMetrics> = track
        .segments
        .iter()
        .map(|s| compute_segment_metrics(s, opts))
        .collect();
    let gaps = inter_segment_gaps(track);
    let metrics = combine(track, &segments, &gaps)?;
    Ok(ExtractedTrack {
        metrics,
        segments,
        gaps,
    })
}

fn combine(
    track: &Track,
    segments: &[SegmentMetrics],
    gaps: &[Duration],
) -> Result<TrackMetrics, TrackError> {
    let bounds = bounds(track).ok_or(TrackError::EmptyTrack)?;

    let mut distance_km = 0.0;
    let mut moving_distance_km = 0.0;
    let mut duration: Option<Duration> = None;
    let mut moving = Duration::zero();
    let mut stopped = Duration::zero();
    let mut max_speed_kmh: f64 = 0.0;

    for s in segments {
        distance_km += s.distance_km;
        moving_distance_km += s.moving_distance_km;
        max_speed_kmh = max_speed_kmh.max(s.max_speed_kmh);
        if let Some(d) = s.duration {
            duration = Some(duration.unwrap_or_else(Duration::zero) + d);
            moving += s.moving_time.unwrap_or_else(Duration::zero);
            stopped += s.stopped_time.unwrap_or_else(Duration::zero);
        }
    }

    let gap_total = gaps.iter().fold(Duration::zero(), |acc, g| acc + *g);
    let duration = duration.map(|d| d + gap_total);
    stopped += gap_total;

    Ok(TrackMetrics {
        distance_km,
        moving_distance_km,
        duration,
        moving_time: duration.map(|_| moving),
        stopped_time: duration.map(|_| stopped),
        elevation_min: fold_opt(segments.iter().map(|s| s.elevation_min), f64::min),
        elevation_max: fold_opt(segments.iter().map(|s| s.elevation_max), f64::max),
        ascent: fold_opt(segments.iter().map(|s| s.ascent), |a, b| a + b),
        descent: fold_opt(segments.iter().map(|s| s.descent), |a, b| a + b),
        max_speed_kmh,
        average_speed_kmh: average_speed_kmh(moving_distance_km * 1000.0, moving),
        bounds: Some(bounds),
    })
}

fn average_speed_kmh(moving_distance_m: f64, moving: Duration) -> f64 {
    let secs = seconds(moving);
    if secs > 0.0 {
        mps_to_kmh(moving_distance_m / secs)
    } else {
        0.0
    }
}

fn fold_opt(values: impl Iterator<Item = Option<f64>>, f: impl Fn(f64, f64) -> f64) -> Option<f64> {
    values.flatten().reduce(f)
}

#[derive(Debug, Clone, Copy)]
struct ElevationStats {
    min: f64,
    max: f64,
    ascent: f64,
    descent: f64,
}

fn elevation_stats(points: &[GeoPoint]) -> Option<ElevationStats> {
    let mut elevations = points.iter().filter_map(|p| p.ele);
    let first = elevations.next()?;
    let mut st = ElevationStats {
        min: first,
        max: first,
        ascent: 0.0,
        descent: 0.0,
    };
    let mut prev = first;
    for ele in elevations {
        st.min = st.min.min(ele);
        st.max = st.max.max(ele);
        let delta = ele - prev;
        if delta > 0.0 {
            st.ascent += delta;
        } else {
            st.descent -= delta;
        }
        prev = ele;
    }
    Some(st)
}

fn bounds(track: &Track) -> Option<Bounds> {
    let mut points = track.points();
    let first = points.next()?;
    let init = [first.lat, first.lon, first.lat, first.lon];
    Some(points.fold(init, |[min_lat, min_lon, max_lat, max_lon], p| {
        [
            min_lat.min(p.lat),
            min_lon.min(p.lon),
            max_lat.max(p.lat),
            max_lon.max(p.lon),
        ]
    }))
}
