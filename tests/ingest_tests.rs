use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use trackrecords::database::SqliteStore;
use trackrecords::ingest::{ImportOptions, import_path};
use trackrecords::metrics::ExtractOptions;
use trackrecords::records::{Record, RecordType, RecordsDelta};
use trackrecords::store::Store;
use trackrecords::types::{NewWorkout, Workout};

/// A single-segment ride heading north, one point per `step_s` seconds,
/// `step_deg` degrees of latitude apart.
fn ride_gpx(name: &str, start: &str, points: usize, step_deg: f64, step_s: i64) -> String {
    let t0 = chrono::DateTime::parse_from_rfc3339(start).unwrap();
    let mut body = String::new();
    for i in 0..points {
        let lat = 45.0 + step_deg * i as f64;
        let time = (t0 + chrono::Duration::seconds(step_s * i as i64)).to_rfc3339();
        body.push_str(&format!(
            "<trkpt lat=\"{lat}\" lon=\"6.0\"><ele>{}</ele><time>{time}</time></trkpt>\n",
            1000 + i
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test">
  <trk><name>{name}</name><trkseg>
{body}  </trkseg></trk>
</gpx>"#
    )
}

fn options(upload_dir: Option<&Path>) -> ImportOptions {
    ImportOptions {
        user_id: 1,
        sport_id: 3,
        extract: ExtractOptions::default(),
        upload_dir: upload_dir.map(Path::to_path_buf),
    }
}

#[test]
fn imports_directory_and_skips_bad_tracks() {
    let src = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    fs::write(
        src.path().join("a_short.gpx"),
        ride_gpx("Short", "2024-05-01T08:00:00Z", 11, 0.001, 10),
    )
    .unwrap();
    fs::write(
        src.path().join("b_long.gpx"),
        ride_gpx("Long", "2024-05-02T08:00:00Z", 31, 0.001, 12),
    )
    .unwrap();
    fs::write(
        src.path().join("c_empty.gpx"),
        "<gpx><trk><name>empty</name><trkseg></trkseg></trk></gpx>",
    )
    .unwrap();
    fs::write(src.path().join("d_waypoints.gpx"), "<gpx><wpt lat=\"1\" lon=\"2\"/></gpx>").unwrap();

    let mut db = SqliteStore::open_in_memory().unwrap();
    let summary = import_path(&mut db, src.path(), &options(Some(uploads.path()))).unwrap();

    assert_eq!(summary.imported, 2);
    assert_eq!(summary.skipped, 2);
    // four creates for the first ride; the slower second one takes FD and LD
    assert_eq!(summary.records_changed, 6);

    let workouts = db.workouts_for(1, Some(3)).unwrap();
    assert_eq!(workouts.len(), 2);
    assert_eq!(workouts[0].title.as_deref(), Some("Short"));
    assert_eq!(workouts[0].duration, chrono::Duration::seconds(100));
    assert!(workouts.iter().all(|w| w.bounds.is_some()));

    // every stored track file lives under the upload dir
    for w in &workouts {
        let rel = w.gpx_path.as_deref().unwrap();
        assert!(rel.starts_with("workouts"));
        assert!(uploads.path().join(rel).is_file());
    }

    let records = db.records_for(1, Some(3)).unwrap();
    let fd = records
        .iter()
        .find(|r| r.record_type == RecordType::FarthestDistance)
        .unwrap();
    assert_eq!(fd.workout_id, workouts[1].id);
}

#[test]
fn imports_single_file_without_upload_dir() {
    let src = tempfile::tempdir().unwrap();
    let path = src.path().join("ride.gpx");
    fs::write(&path, ride_gpx("Solo", "2024-06-01T07:30:00Z", 5, 0.002, 30)).unwrap();

    let mut db = SqliteStore::open_in_memory().unwrap();
    let summary = import_path(&mut db, &path, &options(None)).unwrap();
    assert_eq!(summary.imported, 1);

    let w = db.workouts_for(1, None).unwrap().pop().unwrap();
    assert_eq!(w.gpx_path, None);
    assert_eq!(w.workout_date.to_rfc3339(), "2024-06-01T07:30:00+00:00");
    assert_eq!(w.ascent, Some(4.0));
}

#[test]
fn imports_tracks_from_zip() {
    let src = tempfile::tempdir().unwrap();
    let zip_path = src.path().join("tracks.zip");
    let mut zip = zip::ZipWriter::new(File::create(&zip_path).unwrap());
    let opts = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    zip.start_file("2024/one.gpx", opts).unwrap();
    zip.write_all(ride_gpx("One", "2024-05-01T08:00:00Z", 6, 0.001, 10).as_bytes())
        .unwrap();
    zip.start_file("two.gpx", opts).unwrap();
    zip.write_all(ride_gpx("Two", "2024-05-03T08:00:00Z", 6, 0.001, 10).as_bytes())
        .unwrap();
    zip.start_file("readme.txt", opts).unwrap();
    zip.write_all(b"not a track").unwrap();
    zip.finish().unwrap();

    let mut db = SqliteStore::open_in_memory().unwrap();
    let summary = import_path(&mut db, &zip_path, &options(None)).unwrap();
    assert_eq!(summary.imported, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(db.workouts_for(1, Some(3)).unwrap().len(), 2);
}

/// Store whose every write fails, as a full disk or a lost connection would.
struct FailingStore;

impl Store for FailingStore {
    fn insert_workout(&mut self, _new: &NewWorkout) -> anyhow::Result<Workout> {
        anyhow::bail!("database is read-only")
    }
    fn get_workout(&mut self, _id: i64) -> anyhow::Result<Option<Workout>> {
        Ok(None)
    }
    fn update_workout(&mut self, _workout: &Workout) -> anyhow::Result<()> {
        anyhow::bail!("database is read-only")
    }
    fn delete_workout(&mut self, _id: i64) -> anyhow::Result<()> {
        anyhow::bail!("database is read-only")
    }
    fn workouts_for(&mut self, _user_id: i64, _sport_id: Option<i64>) -> anyhow::Result<Vec<Workout>> {
        Ok(Vec::new())
    }
    fn records_for(&mut self, _user_id: i64, _sport_id: Option<i64>) -> anyhow::Result<Vec<Record>> {
        Ok(Vec::new())
    }
    fn get_record(&mut self, _id: i64) -> anyhow::Result<Option<Record>> {
        Ok(None)
    }
    fn delete_record(&mut self, _id: i64) -> anyhow::Result<()> {
        anyhow::bail!("database is read-only")
    }
    fn record_sports_for_workout(&mut self, _workout_id: i64) -> anyhow::Result<Vec<i64>> {
        Ok(Vec::new())
    }
    fn reconcile_locked(&mut self, _user_id: i64, _sport_id: i64) -> anyhow::Result<RecordsDelta> {
        anyhow::bail!("database is read-only")
    }
}

#[test]
fn failed_insert_leaves_no_upload_behind() {
    let src = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    let path = src.path().join("ride.gpx");
    fs::write(&path, ride_gpx("Lost", "2024-06-01T07:30:00Z", 5, 0.002, 30)).unwrap();

    let summary = import_path(&mut FailingStore, &path, &options(Some(uploads.path()))).unwrap();
    assert_eq!(summary.imported, 0);
    assert_eq!(summary.skipped, 1);

    let leftovers = walkdir::WalkDir::new(uploads.path())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count();
    assert_eq!(leftovers, 0);
    // the source file is untouched
    assert!(path.is_file());
}
