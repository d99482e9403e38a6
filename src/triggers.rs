//! Which (user, sport) pairs to reconcile after each committed mutation.
//!
//! The persistence layer calls these once its own change is committed; each
//! reconciliation runs under the store's per-pair lock.

use crate::dlog;
use crate::records::{Record, RecordsDelta};
use crate::store::{Artifacts, Store};
use crate::types::Workout;
use anyhow::Result;

pub fn after_workout_created<S: Store + ?Sized>(store: &mut S, workout: &Workout) -> Result<Vec<RecordsDelta>> {
    reconcile_all(store, workout.user_id, &[workout.sport_id])
}

/// No-op unless a record-relevant field changed. Covers both the current
/// sport and any sport the workout held records in before the edit.
pub fn after_workout_updated<S: Store + ?Sized>(
    store: &mut S,
    before: &Workout,
    after: &Workout,
) -> Result<Vec<RecordsDelta>> {
    if !before.record_fields_changed(after) {
        dlog!("workout_unchanged id={}", after.id);
        return Ok(Vec::new());
    }
    let mut sports = vec![after.sport_id];
    for sport_id in store.record_sports_for_workout(after.id)? {
        if !sports.contains(&sport_id) {
            sports.push(sport_id);
        }
    }
    reconcile_all(store, after.user_id, &sports)
}

/// Reconciles every sport whose records referenced the deleted workout, then
/// releases its map image and track file.
pub fn after_workout_deleted<S: Store + ?Sized>(
    store: &mut S,
    artifacts: &mut dyn Artifacts,
    workout: &Workout,
) -> Result<Vec<RecordsDelta>> {
    let sports = store.record_sports_for_workout(workout.id)?;
    let deltas = reconcile_all(store, workout.user_id, &sports)?;

    for path in [&workout.map_path, &workout.gpx_path].into_iter().flatten() {
        artifacts.release(path)?;
    }
    Ok(deltas)
}

/// A deleted record is re-selected from the remaining workouts.
pub fn after_record_deleted<S: Store + ?Sized>(store: &mut S, record: &Record) -> Result<RecordsDelta> {
    store.reconcile_locked(record.user_id, record.sport_id)
}

fn reconcile_all<S: Store + ?Sized>(store: &mut S, user_id: i64, sports: &[i64]) -> Result<Vec<RecordsDelta>> {
    let mut deltas = Vec::with_capacity(sports.len());
    for &sport_id in sports {
        let delta = store.reconcile_locked(user_id, sport_id)?;
        if !delta.is_empty() {
            tracing::info!(
                user_id,
                sport_id,
                changes = delta.ops.len(),
                "records updated"
            );
        }
        deltas.push(delta);
    }
    Ok(deltas)
}
