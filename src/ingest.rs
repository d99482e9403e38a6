use crate::dlog;
use crate::gpx::parse_track;
use crate::metrics::{ExtractOptions, extract};
use crate::records::RecordsDelta;
use crate::store::{Artifacts, FsArtifacts, Store, add_workout};
use crate::types::{NewWorkout, Track, Workout};
use crate::utils::open_tracks;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub user_id: i64,
    pub sport_id: i64,
    pub extract: ExtractOptions,
    /// When set, track files are copied here and the workout keeps a
    /// path relative to it.
    pub upload_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub records_changed: usize,
}

/// Builds the workout row for a parsed track.
///
/// The workout date is the first timestamp in the track, or `fallback_date`
/// for tracks without time data.
pub fn build_workout(
    track: &Track,
    title: Option<String>,
    fallback_date: DateTime<Utc>,
    opts: &ImportOptions,
) -> Result<NewWorkout> {
    let extracted = extract(track, &opts.extract)?;
    let workout_date = track.points().find_map(|p| p.time).unwrap_or(fallback_date);

    Ok(NewWorkout {
        user_id: opts.user_id,
        sport_id: opts.sport_id,
        title: track.name.clone().or(title),
        workout_date,
        metrics: extracted.metrics,
        segments: extracted.segments,
        gpx_path: None,
    })
}

pub fn import_file<S: Store + ?Sized>(
    store: &mut S,
    path: &Path,
    opts: &ImportOptions,
) -> Result<(Workout, Vec<RecordsDelta>)> {
    let track = parse_track(path).with_context(|| format!("Parsing GPX: {}", path.display()))?;
    dlog!(
        "parsed path={} segments={} points={}",
        path.display(),
        track.segments.len(),
        track.point_count()
    );

    let stem = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
    let mut new = build_workout(&track, stem, Utc::now(), opts)
        .with_context(|| format!("Computing metrics: {}", path.display()))?;

    let Some(dir) = &opts.upload_dir else {
        return add_workout(store, &new);
    };
    let rel = store_upload(dir, path, opts.user_id)?;
    new.gpx_path = Some(rel.clone());

    add_workout(store, &new).inspect_err(|_| {
        // no workout row points at the copy
        if let Err(e) = FsArtifacts::new(dir).release(&rel) {
            tracing::warn!(path = %rel, err = %format!("{e:#}"), "could not remove upload");
        }
    })
}

/// Copies a track file under `<upload_dir>/workouts/<user_id>/` and returns
/// its path relative to `upload_dir`.
fn store_upload(upload_dir: &Path, src: &Path, user_id: i64) -> Result<String> {
    let file_name = src
        .file_name()
        .and_then(|s| s.to_str())
        .context("track file has no usable name")?;
    let rel = PathBuf::from("workouts")
        .join(user_id.to_string())
        .join(format!("{}_{file_name}", Utc::now().format("%Y%m%d%H%M%S%f")));
    let dest = upload_dir.join(&rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating dir: {}", parent.display()))?;
    }
    fs::copy(src, &dest).with_context(|| format!("copying track to {}", dest.display()))?;
    Ok(rel.to_string_lossy().into_owned())
}

/// Imports every track under `path`; unreadable or empty tracks are skipped.
pub fn import_path<S: Store + ?Sized>(
    store: &mut S,
    path: &Path,
    opts: &ImportOptions,
) -> Result<ImportSummary> {
    let source = open_tracks(path)?;
    tracing::info!(files = source.files().len(), "found track files");

    let mut summary = ImportSummary::default();
    for file in source.files() {
        match import_file(store, file, opts) {
            Ok((workout, deltas)) => {
                summary.imported += 1;
                summary.records_changed += deltas.iter().map(|d| d.ops.len()).sum::<usize>();
                dlog!("imported id={} path={}", workout.id, file.display());
            }
            Err(e) => {
                summary.skipped += 1;
                tracing::warn!(path = %file.display(), err = %format!("{e:#}"), "skipping track");
            }
        }
    }

    tracing::info!(
        imported = summary.imported,
        skipped = summary.skipped,
        records_changed = summary.records_changed,
        "import done"
    );
    Ok(summary)
}
