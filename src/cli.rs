use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_DB: &str = "trackrecords.db";
const DEFAULT_UPLOAD_DIR: &str = "uploads";

#[derive(Parser, Debug)]
#[command(
    name = "trackrecords",
    about = "Compute workout statistics from GPX tracks and keep personal records"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,

    /// Increase log verbosity (-v, -vv). Defaults to INFO.
    #[arg(short = 'v', long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease log verbosity (-q, -qq). Defaults to INFO.
    #[arg(short = 'q', long, action = ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// SQLite database file
    #[arg(long, default_value = DEFAULT_DB)]
    pub db: PathBuf,

    /// PostgreSQL connection URL; takes precedence over --db
    #[arg(long, env = "TRACKRECORDS_PG_URL")]
    pub pg_url: Option<String>,

    /// Directory holding uploaded track files and map images
    #[arg(long, env = "TRACKRECORDS_UPLOAD_DIR", default_value = DEFAULT_UPLOAD_DIR)]
    pub upload_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Print whole-track and per-segment metrics of a GPX file as JSON
    Metrics {
        #[arg(value_name = "GPX")]
        gpx: PathBuf,

        /// Speed (km/h) at or below which a point pair counts as stopped
        #[arg(long, default_value_t = crate::metrics::DEFAULT_STOPPED_SPEED_KMH)]
        stopped_speed: f64,
    },

    /// Print chart samples of a GPX file, one tab-separated row per point
    Chart {
        #[arg(value_name = "GPX")]
        gpx: PathBuf,
    },

    /// Import a GPX file, a directory of them or a ZIP archive
    Import {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        #[arg(long)]
        user: i64,

        #[arg(long)]
        sport: i64,

        #[arg(long, default_value_t = crate::metrics::DEFAULT_STOPPED_SPEED_KMH)]
        stopped_speed: f64,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Delete a workout and refresh the records it held
    DeleteWorkout {
        id: i64,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Delete a record; the next best workout takes its place
    DeleteRecord {
        id: i64,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// List a user's records
    Records {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        sport: Option<i64>,

        #[command(flatten)]
        store: StoreArgs,
    },

    /// Totals per sport, or per period and sport
    Stats {
        #[arg(long)]
        user: i64,

        /// sport, week, weekm, month or year
        #[arg(long, default_value = "sport")]
        by: String,

        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        from: Option<chrono::NaiveDate>,

        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        to: Option<chrono::NaiveDate>,

        #[command(flatten)]
        store: StoreArgs,
    },
}
