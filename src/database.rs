use crate::records::{Record, RecordOp, RecordType, RecordsDelta, reconcile_records};
use crate::store::Store;
use crate::dlog;
use crate::types::{Bounds, NewWorkout, SegmentMetrics, Workout};
use anyhow::{Context, Result};
use chrono::Duration;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::path::Path;

const WORKOUT_COLUMNS: &str = "id, user_id, sport_id, title, workout_date, duration_ms, moving_ms, pauses_ms, \
     distance_km, min_alt, max_alt, ascent, descent, max_speed, ave_speed, bounds, gpx, map";

const RECORD_COLUMNS: &str = "id, user_id, sport_id, workout_id, workout_date, record_type, value";

/// Local SQLite store for workouts and records.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let display = path.display();
        let conn = Connection::open(path).with_context(|| format!("Opening SQLite DB: {display}"))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory().context("Opening in-memory SQLite DB")?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS workouts (
          id            INTEGER PRIMARY KEY AUTOINCREMENT,
          user_id       INTEGER NOT NULL,
          sport_id      INTEGER NOT NULL,
          title         TEXT,
          workout_date  TEXT NOT NULL,
          duration_ms   INTEGER NOT NULL,
          moving_ms     INTEGER,
          pauses_ms     INTEGER,
          distance_km   REAL,
          min_alt       REAL,
          max_alt       REAL,
          ascent        REAL,
          descent       REAL,
          max_speed     REAL,
          ave_speed     REAL,
          bounds        TEXT,
          gpx           TEXT,
          map           TEXT,
          created_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS workouts_user_sport_idx ON workouts (user_id, sport_id);

        CREATE TABLE IF NOT EXISTS workout_segments (
          workout_id    INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
          segment_id    INTEGER NOT NULL,
          duration_ms   INTEGER NOT NULL,
          moving_ms     INTEGER,
          pauses_ms     INTEGER,
          distance_km   REAL,
          min_alt       REAL,
          max_alt       REAL,
          ascent        REAL,
          descent       REAL,
          max_speed     REAL,
          ave_speed     REAL,
          PRIMARY KEY (workout_id, segment_id)
        );

        CREATE TABLE IF NOT EXISTS records (
          id            INTEGER PRIMARY KEY AUTOINCREMENT,
          user_id       INTEGER NOT NULL,
          sport_id      INTEGER NOT NULL,
          workout_id    INTEGER NOT NULL,
          workout_date  TEXT NOT NULL,
          record_type   TEXT NOT NULL CHECK (record_type IN ('AS', 'FD', 'LD', 'MS')),
          value         INTEGER NOT NULL,
          UNIQUE (user_id, sport_id, record_type)
        );

        CREATE INDEX IF NOT EXISTS records_workout_idx ON records (workout_id);
        ",
    )
    .context("Ensuring SQLite schema")
}

fn ms(d: Option<Duration>) -> Option<i64> {
    d.map(|d| d.num_milliseconds())
}

fn bounds_to_sql(b: Option<Bounds>) -> Option<String> {
    b.map(|b| serde_json::Value::from(b.to_vec()).to_string())
}

fn workout_from_row(row: &Row<'_>) -> rusqlite::Result<Workout> {
    let bounds: Option<String> = row.get(15)?;
    let bounds = bounds
        .map(|s| serde_json::from_str::<Bounds>(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?;

    Ok(Workout {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sport_id: row.get(2)?,
        title: row.get(3)?,
        workout_date: row.get(4)?,
        duration: Duration::milliseconds(row.get(5)?),
        moving: row.get::<_, Option<i64>>(6)?.map(Duration::milliseconds),
        pauses: row.get::<_, Option<i64>>(7)?.map(Duration::milliseconds),
        distance_km: row.get(8)?,
        min_alt: row.get(9)?,
        max_alt: row.get(10)?,
        ascent: row.get(11)?,
        descent: row.get(12)?,
        max_speed_kmh: row.get(13)?,
        ave_speed_kmh: row.get(14)?,
        bounds,
        gpx_path: row.get(16)?,
        map_path: row.get(17)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<Record> {
    let code: String = row.get(5)?;
    let record_type = code
        .parse::<RecordType>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;
    Ok(Record {
        id: row.get(0)?,
        user_id: row.get(1)?,
        sport_id: row.get(2)?,
        workout_id: row.get(3)?,
        workout_date: row.get(4)?,
        record_type,
        value: row.get(6)?,
    })
}

fn query_workouts(conn: &Connection, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Workout>> {
    let sql = format!(
        "SELECT {WORKOUT_COLUMNS} FROM workouts
         WHERE user_id = ?1 AND (?2 IS NULL OR sport_id = ?2)
         ORDER BY workout_date, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, sport_id], workout_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Reading workouts")
}

fn query_records(conn: &Connection, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records
         WHERE user_id = ?1 AND (?2 IS NULL OR sport_id = ?2)
         ORDER BY sport_id, record_type"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, sport_id], record_from_row)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .context("Reading records")
}

fn insert_segment(conn: &Connection, workout_id: i64, idx: usize, m: &SegmentMetrics) -> Result<()> {
    let segment_id = i64::try_from(idx).context("segment index out of range")?;
    conn.execute(
        "INSERT INTO workout_segments (
           workout_id, segment_id, duration_ms, moving_ms, pauses_ms, distance_km,
           min_alt, max_alt, ascent, descent, max_speed, ave_speed
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            workout_id,
            segment_id,
            ms(m.duration).unwrap_or(0),
            ms(m.moving_time),
            ms(m.stopped_time),
            m.distance_km,
            m.elevation_min,
            m.elevation_max,
            m.ascent,
            m.descent,
            m.max_speed_kmh,
            m.average_speed_kmh,
        ],
    )
    .context("Inserting workout segment")?;
    Ok(())
}

fn apply_delta(conn: &Connection, delta: &RecordsDelta) -> Result<()> {
    for op in &delta.ops {
        match op {
            RecordOp::Create(d) => {
                conn.execute(
                    "INSERT INTO records (user_id, sport_id, workout_id, workout_date, record_type, value)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        d.user_id,
                        d.sport_id,
                        d.workout_id,
                        d.workout_date,
                        d.record_type.code(),
                        d.value
                    ],
                )
                .context("Creating record")?;
            }
            RecordOp::Update { id, data: d } => {
                conn.execute(
                    "UPDATE records SET workout_id = ?2, workout_date = ?3, value = ?4 WHERE id = ?1",
                    params![id, d.workout_id, d.workout_date, d.value],
                )
                .context("Updating record")?;
            }
            RecordOp::Delete { id, .. } => {
                conn.execute("DELETE FROM records WHERE id = ?1", [id])
                    .context("Deleting record")?;
            }
        }
    }
    Ok(())
}

impl Store for SqliteStore {
    fn insert_workout(&mut self, new: &NewWorkout) -> Result<Workout> {
        let tx = self.conn.transaction().context("Starting workout transaction")?;
        let m = &new.metrics;
        tx.execute(
            "INSERT INTO workouts (
               user_id, sport_id, title, workout_date, duration_ms, moving_ms, pauses_ms,
               distance_km, min_alt, max_alt, ascent, descent, max_speed, ave_speed, bounds, gpx
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                new.user_id,
                new.sport_id,
                new.title,
                new.workout_date,
                ms(m.duration).unwrap_or(0),
                ms(m.moving_time),
                ms(m.stopped_time),
                m.distance_km,
                m.elevation_min,
                m.elevation_max,
                m.ascent,
                m.descent,
                m.max_speed_kmh,
                m.average_speed_kmh,
                bounds_to_sql(m.bounds),
                new.gpx_path,
            ],
        )
        .context("Inserting workout")?;
        let id = tx.last_insert_rowid();

        for (idx, seg) in new.segments.iter().enumerate() {
            insert_segment(&tx, id, idx, seg)?;
        }
        tx.commit().context("Committing workout")?;
        dlog!("workout_inserted id={id} segments={}", new.segments.len());

        Ok(new.clone().into_workout(id))
    }

    fn get_workout(&mut self, id: i64) -> Result<Option<Workout>> {
        let sql = format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], workout_from_row)
            .optional()
            .context("Reading workout")
    }

    fn update_workout(&mut self, w: &Workout) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE workouts SET
                   user_id = ?2, sport_id = ?3, title = ?4, workout_date = ?5, duration_ms = ?6,
                   moving_ms = ?7, pauses_ms = ?8, distance_km = ?9, min_alt = ?10, max_alt = ?11,
                   ascent = ?12, descent = ?13, max_speed = ?14, ave_speed = ?15, bounds = ?16,
                   gpx = ?17, map = ?18
                 WHERE id = ?1",
                params![
                    w.id,
                    w.user_id,
                    w.sport_id,
                    w.title,
                    w.workout_date,
                    w.duration.num_milliseconds(),
                    ms(w.moving),
                    ms(w.pauses),
                    w.distance_km,
                    w.min_alt,
                    w.max_alt,
                    w.ascent,
                    w.descent,
                    w.max_speed_kmh,
                    w.ave_speed_kmh,
                    bounds_to_sql(w.bounds),
                    w.gpx_path,
                    w.map_path,
                ],
            )
            .context("Updating workout")?;
        if changed == 0 {
            anyhow::bail!("Workout {} does not exist", w.id);
        }
        Ok(())
    }

    fn delete_workout(&mut self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM workouts WHERE id = ?1", [id])
            .context("Deleting workout")?;
        Ok(())
    }

    fn workouts_for(&mut self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Workout>> {
        query_workouts(&self.conn, user_id, sport_id)
    }

    fn records_for(&mut self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Record>> {
        query_records(&self.conn, user_id, sport_id)
    }

    fn get_record(&mut self, id: i64) -> Result<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1");
        self.conn
            .query_row(&sql, [id], record_from_row)
            .optional()
            .context("Reading record")
    }

    fn delete_record(&mut self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM records WHERE id = ?1", [id])
            .context("Deleting record")?;
        Ok(())
    }

    fn record_sports_for_workout(&mut self, workout_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT sport_id FROM records WHERE workout_id = ?1 ORDER BY sport_id")?;
        let rows = stmt.query_map([workout_id], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<i64>>>()
            .context("Reading record sports")
    }

    fn reconcile_locked(&mut self, user_id: i64, sport_id: i64) -> Result<RecordsDelta> {
        // IMMEDIATE takes the write lock up front so two reconciliations cannot interleave.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("Starting records transaction")?;

        let history = query_workouts(&tx, user_id, Some(sport_id))?;
        let existing = query_records(&tx, user_id, Some(sport_id))?;
        let delta = reconcile_records(user_id, sport_id, &history, &existing)?;
        apply_delta(&tx, &delta)?;
        tx.commit().context("Committing records")?;

        dlog!(
            "reconciled user={user_id} sport={sport_id} workouts={} ops={}",
            history.len(),
            delta.ops.len()
        );
        Ok(delta)
    }
}

