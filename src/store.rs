//! Persistence boundary: the operations the records triggers need from a
//! database, plus the helpers that pair each mutation with its trigger.

use crate::records::{Record, RecordsDelta};
use crate::triggers;
use crate::types::{NewWorkout, Workout};
use anyhow::{Context, Result, bail};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait Store {
    fn insert_workout(&mut self, new: &NewWorkout) -> Result<Workout>;
    fn get_workout(&mut self, id: i64) -> Result<Option<Workout>>;
    fn update_workout(&mut self, workout: &Workout) -> Result<()>;
    fn delete_workout(&mut self, id: i64) -> Result<()>;
    /// Oldest first.
    fn workouts_for(&mut self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Workout>>;

    fn records_for(&mut self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Record>>;
    fn get_record(&mut self, id: i64) -> Result<Option<Record>>;
    fn delete_record(&mut self, id: i64) -> Result<()>;
    /// Distinct sports of the record rows that reference `workout_id`.
    fn record_sports_for_workout(&mut self, workout_id: i64) -> Result<Vec<i64>>;

    /// Reads history and record rows for (user, sport), reconciles them and
    /// applies the delta, all under one lock scoped to that pair.
    fn reconcile_locked(&mut self, user_id: i64, sport_id: i64) -> Result<RecordsDelta>;
}

/// Files a workout owns outside the database.
pub trait Artifacts {
    fn release(&mut self, path: &str) -> Result<()>;
}

/// Artifacts stored as files under an upload directory.
pub struct FsArtifacts {
    root: PathBuf,
}

impl FsArtifacts {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Artifacts for FsArtifacts {
    fn release(&mut self, path: &str) -> Result<()> {
        let rel = Path::new(path);
        let escapes = rel
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir));
        if rel.is_absolute() || escapes {
            bail!("Refusing to remove artifact outside upload dir: {path:?}");
        }
        let full = self.root.join(rel);
        match fs::remove_file(&full) {
            Ok(()) => {
                tracing::debug!(path = %full.display(), "artifact removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %full.display(), "artifact already gone");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("removing artifact: {}", full.display())),
        }
    }
}

pub fn add_workout<S: Store + ?Sized>(store: &mut S, new: &NewWorkout) -> Result<(Workout, Vec<RecordsDelta>)> {
    let workout = store.insert_workout(new)?;
    let deltas = triggers::after_workout_created(store, &workout)?;
    Ok((workout, deltas))
}

pub fn edit_workout<S: Store + ?Sized>(store: &mut S, workout: &Workout) -> Result<Vec<RecordsDelta>> {
    let Some(before) = store.get_workout(workout.id)? else {
        bail!("Workout {} does not exist", workout.id);
    };
    store.update_workout(workout)?;
    triggers::after_workout_updated(store, &before, workout)
}

pub fn remove_workout<S: Store + ?Sized>(
    store: &mut S,
    artifacts: &mut dyn Artifacts,
    id: i64,
) -> Result<Vec<RecordsDelta>> {
    let Some(workout) = store.get_workout(id)? else {
        bail!("Workout {id} does not exist");
    };
    store.delete_workout(id)?;
    triggers::after_workout_deleted(store, artifacts, &workout)
}

pub fn remove_record<S: Store + ?Sized>(store: &mut S, id: i64) -> Result<RecordsDelta> {
    let Some(record) = store.get_record(id)? else {
        bail!("Record {id} does not exist");
    };
    store.delete_record(id)?;
    triggers::after_record_deleted(store, &record)
}
