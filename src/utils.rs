use anyhow::{Context, Result, bail};
use chrono::Duration;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;
use zip::ZipArchive;

#[macro_export]
macro_rules! dlog {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*);
    };
}

/// Initialize colorful logging.
///
/// Default level is INFO.
/// - `-v` => DEBUG
/// - `-vv` => TRACE
/// - `-q` => WARN
/// - `-qq` => ERROR
///
/// `RUST_LOG` overrides everything (e.g. `RUST_LOG=trace`).
pub fn init_logging(verbose: u8, quiet: u8) {
    let net = i16::from(verbose) - i16::from(quiet);
    let level = match net {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        2..=i16::MAX => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,trackrecords={level}")));

    let show_src = matches!(level, "debug" | "trace");

    fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_target(true)
        .with_level(true)
        .with_file(show_src)
        .with_line_number(show_src)
        .with_writer(io::stderr)
        .compact()
        .init();
}

/// Track files to import, plus the tempdir keeping them alive if we extracted a ZIP.
pub struct TrackSource {
    files: Vec<PathBuf>,
    _tmp: Option<TempDir>,
}

impl TrackSource {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

fn is_gpx(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("gpx"))
}

fn is_zip(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("zip"))
}

/// Accepts either:
/// - a single `.gpx` file
/// - a directory, searched recursively for `.gpx` files
/// - a `.zip` archive, extracted to a temp dir and searched the same way
pub fn open_tracks(path: &Path) -> Result<TrackSource> {
    if path.is_dir() {
        tracing::info!(path = %path.display(), "scanning directory for tracks");
        return Ok(TrackSource {
            files: find_gpx_files(path)?,
            _tmp: None,
        });
    }

    if is_gpx(path) {
        return Ok(TrackSource {
            files: vec![path.to_path_buf()],
            _tmp: None,
        });
    }

    if !is_zip(path) {
        bail!(
            "Track path must be a .gpx file, a directory or a .zip file: {}",
            path.display()
        );
    }

    let tmp = extract_zip(path)?;
    let files = find_gpx_files(tmp.path())?;
    Ok(TrackSource {
        files,
        _tmp: Some(tmp),
    })
}

fn extract_zip(path: &Path) -> Result<TempDir> {
    let zip_file = File::open(path).with_context(|| format!("opening zip: {}", path.display()))?;
    let mut zip =
        ZipArchive::new(zip_file).with_context(|| format!("reading zip: {}", path.display()))?;

    let tmp = tempfile::tempdir().context("creating tempdir for track zip")?;
    tracing::info!(
        zip = %path.display(),
        tmp = %tmp.path().display(),
        entries = zip.len(),
        "extracting track zip"
    );

    for i in 0..zip.len() {
        let mut f = zip.by_index(i).context("reading zip entry")?;

        // Prevent Zip Slip / path traversal.
        let Some(rel) = f.enclosed_name() else {
            tracing::warn!(name = %f.name(), "skipping unsafe zip entry path");
            continue;
        };

        let out_path = tmp.path().join(&rel);

        if f.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("creating dir: {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating dir: {}", parent.display()))?;
        }

        let mut out = File::create(&out_path)
            .with_context(|| format!("creating file: {}", out_path.display()))?;
        io::copy(&mut f, &mut out)
            .with_context(|| format!("extracting file: {}", out_path.display()))?;
    }

    Ok(tmp)
}

/// Sorted so imports happen in a stable order.
pub fn find_gpx_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if entry.file_type().is_file() && is_gpx(entry.path()) {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds().unsigned_abs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

pub fn format_opt_duration(d: Option<Duration>) -> String {
    d.map_or_else(|| "unknown".to_string(), format_duration)
}
