use crate::error::GpxError;
use crate::types::{GeoPoint, Track};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::fs;
use std::path::Path;

/// Parses the first `<trk>` of a GPX file.
pub fn parse_track(path: &Path) -> Result<Track, GpxError> {
    let xml = fs::read_to_string(path)?;
    parse_track_str(&xml)
}

pub fn parse_track_str(xml: &str) -> Result<Track, GpxError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut st = GpxState::default();

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => handle_gpx_start(&mut st, &e),
            Event::Empty(e) => {
                // <trkpt lat=".." lon=".."/> carries no children
                handle_gpx_start(&mut st, &e);
                handle_gpx_end(&mut st, e.name().as_ref());
            }
            Event::End(e) => handle_gpx_end_tag(&mut st, &e),
            Event::Text(e) => handle_gpx_text(&mut st, &e),
            _ => {}
        }
        if st.track_done {
            break;
        }
    }

    if !st.seen_trk {
        return Err(GpxError::NoTrack);
    }
    Ok(Track::from_segments(st.name, st.segments))
}

#[derive(Default)]
struct GpxState {
    seen_trk: bool,
    track_done: bool,
    in_trk: bool,
    in_trkseg: bool,
    in_trkpt: bool,
    in_time: bool,
    in_ele: bool,
    in_name: bool,

    name: Option<String>,
    segments: Vec<Vec<GeoPoint>>,

    cur_lat: Option<f64>,
    cur_lon: Option<f64>,
    cur_time: Option<DateTime<Utc>>,
    cur_ele: Option<f64>,
}

fn handle_gpx_start(st: &mut GpxState, e: &BytesStart<'_>) {
    match e.name().as_ref() {
        b"trk" => {
            st.in_trk = true;
            st.seen_trk = true;
        }
        b"name" if st.in_trk && !st.in_trkpt && !st.in_trkseg => st.in_name = true,
        b"trkseg" if st.in_trk => {
            st.in_trkseg = true;
            st.segments.push(Vec::new());
        }
        b"trkpt" if st.in_trkseg => {
            st.in_trkpt = true;
            st.in_time = false;
            st.in_ele = false;

            st.cur_time = None;
            st.cur_ele = None;

            let (lat, lon) = parse_trkpt_lat_lon(e);
            st.cur_lat = lat;
            st.cur_lon = lon;
        }
        b"time" if st.in_trkpt => st.in_time = true,
        b"ele" if st.in_trkpt => st.in_ele = true,
        _ => {}
    }
}

fn handle_gpx_end_tag(st: &mut GpxState, e: &BytesEnd<'_>) {
    handle_gpx_end(st, e.name().as_ref());
}

fn handle_gpx_end(st: &mut GpxState, name: &[u8]) {
    match name {
        b"time" => st.in_time = false,
        b"ele" => st.in_ele = false,
        b"name" => st.in_name = false,
        b"trkpt" if st.in_trkpt => {
            st.in_trkpt = false;

            let (Some(lat), Some(lon)) = (st.cur_lat, st.cur_lon) else {
                tracing::debug!("skipping trkpt without lat/lon");
                return;
            };
            if let Some(seg) = st.segments.last_mut() {
                seg.push(GeoPoint {
                    lat,
                    lon,
                    ele: st.cur_ele,
                    time: st.cur_time,
                });
            }
        }
        b"trkseg" => st.in_trkseg = false,
        // Only the first track of the file is used.
        b"trk" if st.in_trk => {
            st.in_trk = false;
            st.track_done = true;
        }
        _ => {}
    }
}

fn handle_gpx_text(st: &mut GpxState, e: &BytesText<'_>) {
    let Ok(s) = e.decode() else {
        return;
    };
    if st.in_time {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s.as_ref()) {
            st.cur_time = Some(dt.with_timezone(&Utc));
        }
    } else if st.in_ele {
        st.cur_ele = s.parse::<f64>().ok();
    } else if st.in_name {
        st.name.get_or_insert_with(String::new).push_str(&s);
    }
}

fn parse_trkpt_lat_lon(e: &BytesStart<'_>) -> (Option<f64>, Option<f64>) {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for a in e.attributes().with_checks(false).flatten() {
        let key = a.key.as_ref();
        if key == b"lat"
            && let Ok(v) = a.unescape_value()
        {
            lat = v.parse::<f64>().ok();
        } else if key == b"lon"
            && let Ok(v) = a.unescape_value()
        {
            lon = v.parse::<f64>().ok();
        }
    }

    (lat, lon)
}
