//! Per-point samples for plotting distance, elevation and speed.

use crate::metrics::{mps_to_kmh, pair_speed, point_distance};
use crate::types::{ChartSample, GeoPoint, Segment, Track};

/// Lazy, restartable view over a track's chart samples.
///
/// Holds only a borrow of the track; every call to [`ChartSeries::iter`]
/// starts again from the first point.
#[derive(Debug, Clone, Copy)]
pub struct ChartSeries<'a> {
    track: &'a Track,
}

pub const fn compute_chart_series(track: &Track) -> ChartSeries<'_> {
    ChartSeries { track }
}

impl<'a> ChartSeries<'a> {
    pub fn iter(&self) -> ChartIter<'a> {
        ChartIter {
            track: self.track,
            seg: 0,
            idx: 0,
            first: None,
            prev: None,
            distance_m: 0.0,
        }
    }
}

impl<'a> IntoIterator for ChartSeries<'a> {
    type Item = ChartSample;
    type IntoIter = ChartIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct ChartIter<'a> {
    track: &'a Track,
    seg: usize,
    idx: usize,
    first: Option<&'a GeoPoint>,
    prev: Option<&'a GeoPoint>,
    distance_m: f64,
}

impl Iterator for ChartIter<'_> {
    type Item = ChartSample;

    fn next(&mut self) -> Option<Self::Item> {
        let track = self.track;
        let (segment, point) = loop {
            let segment = track.segments.get(self.seg)?;
            if let Some(point) = segment.points.get(self.idx) {
                break (segment, point);
            }
            self.seg += 1;
            self.idx = 0;
        };
        let idx = self.idx;
        self.idx += 1;

        let first = *self.first.get_or_insert(point);
        if let Some(prev) = self.prev {
            self.distance_m += point_distance(prev, point);
        }
        self.prev = Some(point);

        let speed_kmh = point_speed(segment, idx).map_or(0.0, |v| round_to(mps_to_kmh(v), 2));

        Some(ChartSample {
            distance_km: round_to(self.distance_m / 1000.0, 2),
            duration: point.time.zip(first.time).map(|(t, t0)| t - t0),
            elevation: point.ele.map_or(0.0, |e| round_to(e, 1)),
            lat: point.lat,
            lon: point.lon,
            speed_kmh,
            time: point.time,
        })
    }
}

/// Speed at a point in m/s: the mean of the speeds to its neighbours within
/// the segment, or whichever one is defined.
pub fn point_speed(segment: &Segment, idx: usize) -> Option<f64> {
    let points = &segment.points;
    let point = points.get(idx)?;
    let before = idx
        .checked_sub(1)
        .and_then(|i| points.get(i))
        .and_then(|p| pair_speed(p, point));
    let after = points.get(idx + 1).and_then(|p| pair_speed(point, p));
    match (before, after) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (a, b) => a.or(b),
    }
}

fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(1.25, 1), 1.3);
        assert_eq!(round_to(-0.004, 2), -0.0);
        assert_eq!(round_to(12.3456, 2), 12.35);
    }

    #[test]
    fn speed_needs_timestamps() {
        // no time anywhere: never defined, and out-of-range indices are not an error
        let seg = Segment {
            idx: 0,
            points: vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.01)],
        };
        assert!(point_speed(&seg, 0).is_none());
        assert!(point_speed(&seg, 5).is_none());
    }
}
