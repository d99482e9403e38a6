use chrono::Duration;
use trackrecords::compute_chart_series;
use trackrecords::types::{ChartSample, GeoPoint, Track};

mod common;
use common::pt;

fn two_segment_track() -> Track {
    Track::from_segments(
        Some("chart".into()),
        vec![
            vec![pt(0.0, 0).with_ele(100.04), pt(100.0, 10), pt(300.0, 20)],
            vec![pt(300.0, 50), pt(400.0, 60)],
        ],
    )
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn one_sample_per_point_in_order() {
    let track = two_segment_track();
    let samples: Vec<ChartSample> = compute_chart_series(&track).into_iter().collect();
    assert_eq!(samples.len(), track.point_count());

    let expected: Vec<f64> = track.points().map(|p| p.lat).collect();
    let got: Vec<f64> = samples.iter().map(|s| s.lat).collect();
    assert_eq!(got, expected);
}

#[test]
fn distance_carries_across_segments() {
    let track = two_segment_track();
    let distances: Vec<f64> = compute_chart_series(&track)
        .iter()
        .map(|s| s.distance_km)
        .collect();
    let expected = [0.0, 0.1, 0.3, 0.3, 0.4];
    for (got, want) in distances.iter().zip(expected) {
        assert!(close(*got, want), "{distances:?}");
    }
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn duration_counts_from_first_point() {
    let track = two_segment_track();
    let durations: Vec<Option<Duration>> = compute_chart_series(&track)
        .iter()
        .map(|s| s.duration)
        .collect();
    assert_eq!(durations[0], Some(Duration::zero()));
    assert_eq!(durations[3], Some(Duration::seconds(50)));
    assert_eq!(durations[4], Some(Duration::seconds(60)));
}

#[test]
fn speed_is_mean_of_neighbour_speeds() {
    let track = two_segment_track();
    let speeds: Vec<f64> = compute_chart_series(&track)
        .iter()
        .map(|s| s.speed_kmh)
        .collect();
    // 10 m/s, then (10 + 20) / 2, then 20 m/s; second segment 10 m/s throughout
    let expected = [36.0, 54.0, 72.0, 36.0, 36.0];
    for (got, want) in speeds.iter().zip(expected) {
        assert!(close(*got, want), "{speeds:?}");
    }
}

#[test]
fn elevation_is_rounded_and_defaults_to_zero() {
    let track = two_segment_track();
    let samples: Vec<ChartSample> = compute_chart_series(&track).iter().collect();
    assert!(close(samples[0].elevation, 100.0));
    assert!(close(samples[1].elevation, 0.0));
}

#[test]
fn series_can_be_iterated_again() {
    let track = two_segment_track();
    let series = compute_chart_series(&track);
    let first: Vec<ChartSample> = series.iter().collect();
    let second: Vec<ChartSample> = series.iter().collect();
    assert_eq!(first, second);

    let mut it = series.iter();
    it.next();
    assert_eq!(series.iter().next(), first.first().cloned());
}

#[test]
fn untimed_points_have_no_speed_or_duration() {
    let track = Track::from_segments(
        None,
        vec![vec![GeoPoint::new(45.0, 6.0), GeoPoint::new(45.001, 6.0)]],
    );
    for s in compute_chart_series(&track) {
        assert_eq!(s.duration, None);
        assert_eq!(s.time, None);
        assert_eq!(s.speed_kmh, 0.0);
    }
}

#[test]
fn empty_segments_are_skipped() {
    let track = Track::from_segments(None, vec![Vec::new(), vec![pt(0.0, 0)], Vec::new()]);
    assert_eq!(compute_chart_series(&track).iter().count(), 1);
    assert_eq!(compute_chart_series(&Track::default()).iter().count(), 0);
}
