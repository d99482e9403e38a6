#![deny(
    warnings,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo
)]
#![allow(clippy::multiple_crate_versions, clippy::cast_precision_loss)]

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use trackrecords::cli::{self, Cmd, StoreArgs};
use trackrecords::database::SqliteStore;
use trackrecords::ingest::{self, ImportOptions};
use trackrecords::metrics::{ExtractOptions, extract};
use trackrecords::pgstore::PgStore;
use trackrecords::stats::{self, DateRange, Period};
use trackrecords::store::{self, FsArtifacts, Store};
use trackrecords::types::Metrics;
use trackrecords::{chart, gpx, utils};

#[macro_use]
extern crate trackrecords;

fn open_store(args: &StoreArgs) -> Result<Box<dyn Store>> {
    if let Some(url) = &args.pg_url {
        dlog!("store=postgres");
        return Ok(Box::new(PgStore::connect(url)?));
    }
    dlog!("store=sqlite path={}", args.db.display());
    Ok(Box::new(SqliteStore::open(&args.db)?))
}

fn secs(d: Option<chrono::Duration>) -> Value {
    d.map_or(Value::Null, |d| json!(d.num_milliseconds() as f64 / 1000.0))
}

fn metrics_json(m: &Metrics) -> Value {
    json!({
        "distance_km": m.distance_km,
        "duration_s": secs(m.duration),
        "moving_s": secs(m.moving_time),
        "stopped_s": secs(m.stopped_time),
        "elevation_min": m.elevation_min,
        "elevation_max": m.elevation_max,
        "ascent": m.ascent,
        "descent": m.descent,
        "max_speed_kmh": m.max_speed_kmh,
        "average_speed_kmh": m.average_speed_kmh,
        "bounds": m.bounds.map(|b| b.to_vec()),
    })
}

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    utils::init_logging(cli.verbose, cli.quiet);

    match cli.cmd {
        Cmd::Metrics {
            gpx: path,
            stopped_speed,
        } => {
            let track = gpx::parse_track(&path).with_context(|| format!("Parsing GPX: {}", path.display()))?;
            let opts = ExtractOptions {
                stopped_speed_kmh: stopped_speed,
            };
            let extracted = extract(&track, &opts)?;
            let mut out = metrics_json(&extracted.metrics);
            out["name"] = json!(track.name);
            out["segments"] = extracted.segments.iter().map(metrics_json).collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Cmd::Chart { gpx: path } => {
            let track = gpx::parse_track(&path).with_context(|| format!("Parsing GPX: {}", path.display()))?;
            println!("distance_km\tduration\televation\tlat\tlon\tspeed_kmh\ttime");
            for s in chart::compute_chart_series(&track) {
                let time = s.time.map(|t| t.to_rfc3339()).unwrap_or_default();
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{time}",
                    s.distance_km,
                    utils::format_opt_duration(s.duration),
                    s.elevation,
                    s.lat,
                    s.lon,
                    s.speed_kmh
                );
            }
        }
        Cmd::Import {
            path,
            user,
            sport,
            stopped_speed,
            store: args,
        } => {
            let mut db = open_store(&args)?;
            let opts = ImportOptions {
                user_id: user,
                sport_id: sport,
                extract: ExtractOptions {
                    stopped_speed_kmh: stopped_speed,
                },
                upload_dir: Some(args.upload_dir.clone()),
            };
            let summary = ingest::import_path(db.as_mut(), &path, &opts)?;
            if summary.imported == 0 {
                anyhow::bail!("No workouts imported from {}", path.display());
            }
            println!(
                "imported={}\tskipped={}\trecords_changed={}",
                summary.imported, summary.skipped, summary.records_changed
            );
        }
        Cmd::DeleteWorkout { id, store: args } => {
            let mut db = open_store(&args)?;
            let mut artifacts = FsArtifacts::new(&args.upload_dir);
            let deltas = store::remove_workout(db.as_mut(), &mut artifacts, id)?;
            let changes: usize = deltas.iter().map(|d| d.ops.len()).sum();
            println!("deleted workout {id}\trecords_changed={changes}");
        }
        Cmd::DeleteRecord { id, store: args } => {
            let mut db = open_store(&args)?;
            let delta = store::remove_record(db.as_mut(), id)?;
            println!("deleted record {id}\trecords_changed={}", delta.ops.len());
        }
        Cmd::Records {
            user,
            sport,
            store: args,
        } => {
            let mut db = open_store(&args)?;
            for r in db.records_for(user, sport)? {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    r.id,
                    r.sport_id,
                    r.record_type,
                    r.decoded(),
                    r.workout_id,
                    r.workout_date.format("%Y-%m-%d")
                );
            }
        }
        Cmd::Stats {
            user,
            by,
            from,
            to,
            store: args,
        } => {
            let mut db = open_store(&args)?;
            let workouts = db.workouts_for(user, None)?;
            let range = DateRange { from, to };
            let totals_json = |t: &stats::Totals| {
                json!({
                    "nb_workouts": t.nb_workouts,
                    "total_distance": t.total_distance_km,
                    "total_duration": t.total_duration_s,
                })
            };
            let out: Value = if by == "sport" {
                stats::by_sport(&workouts, range)
                    .iter()
                    .map(|(sport, t)| (sport.to_string(), totals_json(t)))
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            } else {
                let period: Period = by.parse().map_err(anyhow::Error::msg)?;
                stats::by_period(&workouts, period, range)
                    .iter()
                    .map(|(key, sports)| {
                        let inner: serde_json::Map<_, _> = sports
                            .iter()
                            .map(|(sport, t)| (sport.to_string(), totals_json(t)))
                            .collect();
                        (key.clone(), Value::Object(inner))
                    })
                    .collect::<serde_json::Map<_, _>>()
                    .into()
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
