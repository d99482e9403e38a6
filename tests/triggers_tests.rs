use std::fs;

use trackrecords::database::SqliteStore;
use trackrecords::records::{RecordOp, RecordType};
use trackrecords::store::{FsArtifacts, Store, add_workout, edit_workout, remove_record, remove_workout};

mod common;
use common::{day, new_workout};

fn store() -> SqliteStore {
    SqliteStore::open_in_memory().unwrap()
}

fn record_workout(store: &mut SqliteStore, user: i64, sport: i64, t: RecordType) -> Option<i64> {
    store
        .records_for(user, Some(sport))
        .unwrap()
        .into_iter()
        .find(|r| r.record_type == t)
        .map(|r| r.workout_id)
}

#[test]
fn new_workout_creates_all_records() {
    let mut db = store();
    let (w, deltas) = add_workout(&mut db, &new_workout(1, 1, day(1), 12.5)).unwrap();

    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].ops.len(), 4);

    let records = db.records_for(1, Some(1)).unwrap();
    assert_eq!(records.len(), 4);
    assert!(records.iter().all(|r| r.workout_id == w.id));

    let fd = records
        .iter()
        .find(|r| r.record_type == RecordType::FarthestDistance)
        .unwrap();
    assert_eq!(fd.value, 12_500);
    assert_eq!(fd.workout_date, day(1));
}

#[test]
fn records_stay_per_user() {
    let mut db = store();
    add_workout(&mut db, &new_workout(1, 1, day(1), 5.0)).unwrap();
    add_workout(&mut db, &new_workout(2, 1, day(2), 50.0)).unwrap();

    let user1 = db.records_for(1, None).unwrap();
    assert_eq!(user1.len(), 4);
    assert_eq!(
        user1
            .iter()
            .find(|r| r.record_type == RecordType::FarthestDistance)
            .map(|r| r.value),
        Some(5000)
    );
}

#[test]
fn changing_sport_moves_records() {
    let mut db = store();
    let (w1, _) = add_workout(&mut db, &new_workout(1, 1, day(1), 10.0)).unwrap();
    let (w2, _) = add_workout(&mut db, &new_workout(1, 1, day(2), 5.0)).unwrap();
    assert_eq!(record_workout(&mut db, 1, 1, RecordType::FarthestDistance), Some(w1.id));

    let mut edited = db.get_workout(w1.id).unwrap().unwrap();
    edited.sport_id = 2;
    let deltas = edit_workout(&mut db, &edited).unwrap();
    assert_eq!(deltas.len(), 2);

    for t in RecordType::ALL {
        assert_eq!(record_workout(&mut db, 1, 1, t), Some(w2.id), "{t}");
        assert_eq!(record_workout(&mut db, 1, 2, t), Some(w1.id), "{t}");
    }
}

#[test]
fn unchanged_workout_does_not_reconcile() {
    let mut db = store();
    let (w, _) = add_workout(&mut db, &new_workout(1, 1, day(1), 10.0)).unwrap();

    let mut edited = db.get_workout(w.id).unwrap().unwrap();
    edited.title = Some("renamed".into());
    let deltas = edit_workout(&mut db, &edited).unwrap();
    assert!(deltas.is_empty());
    assert_eq!(
        db.get_workout(w.id).unwrap().unwrap().title.as_deref(),
        Some("renamed")
    );
}

#[test]
fn longer_distance_after_edit_updates_record() {
    let mut db = store();
    let (w1, _) = add_workout(&mut db, &new_workout(1, 1, day(1), 10.0)).unwrap();
    let (w2, _) = add_workout(&mut db, &new_workout(1, 1, day(2), 5.0)).unwrap();

    let mut edited = db.get_workout(w2.id).unwrap().unwrap();
    edited.distance_km = Some(20.0);
    edit_workout(&mut db, &edited).unwrap();

    assert_eq!(record_workout(&mut db, 1, 1, RecordType::FarthestDistance), Some(w2.id));
    assert_eq!(record_workout(&mut db, 1, 1, RecordType::LongestDuration), Some(w1.id));
}

#[test]
fn deleting_workout_promotes_runner_up_and_removes_files() {
    let uploads = tempfile::tempdir().unwrap();
    let rel = "workouts/1/ride.gpx";
    fs::create_dir_all(uploads.path().join("workouts/1")).unwrap();
    fs::write(uploads.path().join(rel), "<gpx/>").unwrap();

    let mut db = store();
    let mut best = new_workout(1, 1, day(1), 10.0);
    best.gpx_path = Some(rel.to_string());
    let (w1, _) = add_workout(&mut db, &best).unwrap();
    let (w2, _) = add_workout(&mut db, &new_workout(1, 1, day(2), 7.5)).unwrap();

    let mut artifacts = FsArtifacts::new(uploads.path());
    let deltas = remove_workout(&mut db, &mut artifacts, w1.id).unwrap();
    assert_eq!(deltas.len(), 1);
    assert_eq!(deltas[0].ops.len(), 4);

    assert!(db.get_workout(w1.id).unwrap().is_none());
    for t in RecordType::ALL {
        assert_eq!(record_workout(&mut db, 1, 1, t), Some(w2.id), "{t}");
    }
    assert!(!uploads.path().join(rel).exists());
}

#[test]
fn deleting_last_workout_clears_records() {
    let uploads = tempfile::tempdir().unwrap();
    let mut db = store();
    let (w, _) = add_workout(&mut db, &new_workout(1, 1, day(1), 3.0)).unwrap();

    let mut artifacts = FsArtifacts::new(uploads.path());
    let deltas = remove_workout(&mut db, &mut artifacts, w.id).unwrap();
    assert!(
        deltas[0]
            .ops
            .iter()
            .all(|op| matches!(op, RecordOp::Delete { .. }))
    );
    assert!(db.records_for(1, None).unwrap().is_empty());
}

#[test]
fn deleting_workout_without_records_touches_nothing() {
    let uploads = tempfile::tempdir().unwrap();
    let mut db = store();
    add_workout(&mut db, &new_workout(1, 1, day(1), 10.0)).unwrap();
    let (small, _) = add_workout(&mut db, &new_workout(1, 1, day(2), 1.0)).unwrap();
    let before = db.records_for(1, Some(1)).unwrap();

    let mut artifacts = FsArtifacts::new(uploads.path());
    let deltas = remove_workout(&mut db, &mut artifacts, small.id).unwrap();
    assert!(deltas.is_empty());
    assert_eq!(db.records_for(1, Some(1)).unwrap(), before);
}

#[test]
fn deleted_record_is_recreated() {
    let mut db = store();
    let (w, _) = add_workout(&mut db, &new_workout(1, 1, day(1), 8.0)).unwrap();
    let fd = db
        .records_for(1, Some(1))
        .unwrap()
        .into_iter()
        .find(|r| r.record_type == RecordType::FarthestDistance)
        .unwrap();

    let delta = remove_record(&mut db, fd.id).unwrap();
    assert_eq!(delta.ops.len(), 1);
    assert!(matches!(
        &delta.ops[0],
        RecordOp::Create(d) if d.record_type == RecordType::FarthestDistance && d.workout_id == w.id
    ));
    assert_eq!(db.records_for(1, Some(1)).unwrap().len(), 4);
}

#[test]
fn missing_rows_are_errors() {
    let uploads = tempfile::tempdir().unwrap();
    let mut db = store();
    let mut artifacts = FsArtifacts::new(uploads.path());
    assert!(remove_workout(&mut db, &mut artifacts, 42).is_err());
    assert!(remove_record(&mut db, 42).is_err());
}

#[test]
fn artifacts_outside_upload_dir_are_refused() {
    use trackrecords::store::Artifacts;

    let uploads = tempfile::tempdir().unwrap();
    let mut artifacts = FsArtifacts::new(uploads.path());
    assert!(artifacts.release("../escape.gpx").is_err());
    assert!(artifacts.release("/etc/passwd").is_err());
    // already gone is fine
    assert!(artifacts.release("workouts/1/none.gpx").is_ok());
}
