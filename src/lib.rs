//! Workout statistics from GPS tracks and per-sport personal records.
//!
//! [`metrics`] and [`chart`] turn a parsed [`types::Track`] into aggregates and
//! plot samples; [`records`] recomputes a user's bests for one sport and diffs
//! them against the stored rows; [`triggers`] decides which (user, sport)
//! pairs to recompute after each workout or record mutation.

pub mod chart;
pub mod cli;
pub mod database;
pub mod error;
pub mod gpx;
pub mod ingest;
pub mod metrics;
pub mod pgstore;
pub mod records;
pub mod stats;
pub mod store;
pub mod triggers;
pub mod types;
pub mod utils;

pub use error::{GpxError, RecordsError, TrackError};
pub use metrics::{compute_segment_metrics, compute_track_metrics, inter_segment_gaps};
pub use chart::compute_chart_series;
pub use records::{RecordType, RecordsDelta, reconcile_records};
