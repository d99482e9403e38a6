//! PostgreSQL implementation of [`Store`].

use crate::dlog;
use crate::records::{Record, RecordOp, RecordType, RecordsDelta, reconcile_records};
use crate::store::Store;
use crate::types::{NewWorkout, Workout};
use anyhow::{Context, Result, bail};
use chrono::Duration;
use postgres::{Client, GenericClient, NoTls, Row};

const WORKOUT_COLUMNS: &str = "id, user_id, sport_id, title, workout_date, duration_ms, moving_ms, pauses_ms, \
     distance_km, min_alt, max_alt, ascent, descent, max_speed, ave_speed, bounds, gpx, map";

const RECORD_COLUMNS: &str = "id, user_id, sport_id, workout_id, workout_date, record_type, value";

pub struct PgStore {
    pg: Client,
}

impl PgStore {
    pub fn connect(pg_url: &str) -> Result<Self> {
        let mut pg = connect_or_create_db(pg_url)?;
        ensure_pg_schema(&mut pg)?;
        Ok(Self { pg })
    }
}

/// Connect to pg_url. If the database in the URL doesn't exist, create it and retry.
///
/// This requires privileges to CREATE DATABASE.
fn connect_or_create_db(pg_url: &str) -> Result<Client> {
    match Client::connect(pg_url, NoTls) {
        Ok(pg) => return Ok(pg),
        Err(e) if is_db_missing(&e) => {
            tracing::warn!(err = %e, "database does not exist; attempting to create it");
        }
        Err(e) => return Err(e).context("Connecting to PostgreSQL"),
    }

    let (db_name, admin_url) = admin_url_for_create_db(pg_url)?;
    let mut admin = Client::connect(&admin_url, NoTls)
        .context("Connecting to maintenance DB (postgres) to create target DB")?;

    let exists = admin
        .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&db_name])?
        .is_some();
    if exists {
        tracing::info!(db = %db_name, "database already exists");
    } else {
        tracing::info!(db = %db_name, "creating database");
        create_database(&mut admin, &db_name)?;
    }

    Client::connect(pg_url, NoTls).context("Connecting to PostgreSQL after creating database")
}

fn is_db_missing(e: &postgres::Error) -> bool {
    // 3D000 = invalid_catalog_name
    e.as_db_error().is_some_and(|d| d.code().code() == "3D000")
}

fn create_database(pg: &mut Client, db_name: &str) -> Result<()> {
    if db_name.is_empty() || !db_name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        bail!("Refusing to create database with unsafe name: {db_name:?}");
    }

    match pg.batch_execute(&format!("CREATE DATABASE \"{db_name}\"")) {
        Ok(()) => Ok(()),
        // 42P04 = duplicate_database, lost a race with another creator
        Err(e) if e.as_db_error().is_some_and(|d| d.code().code() == "42P04") => Ok(()),
        Err(e) => Err(e).context("Creating database"),
    }
}

/// Returns (dbname, admin_url) for URI-style URLs like
/// `postgres://127.0.0.1:5432/fitness?sslmode=disable`.
fn admin_url_for_create_db(pg_url: &str) -> Result<(String, String)> {
    let (base, query) = match pg_url.split_once('?') {
        Some((a, b)) => (a, Some(b)),
        None => (pg_url, None),
    };

    let slash = base
        .rfind('/')
        .context("pg_url must include a database name (e.g. .../fitness)")?;
    let db_name = &base[slash + 1..];
    if db_name.is_empty() {
        bail!("pg_url must include a database name (e.g. .../fitness)");
    }

    let mut admin = format!("{}postgres", &base[..=slash]);
    if let Some(q) = query {
        admin.push('?');
        admin.push_str(q);
    }
    Ok((db_name.to_string(), admin))
}

fn ensure_pg_schema(pg: &mut Client) -> Result<()> {
    pg.batch_execute(
        r"
        CREATE TABLE IF NOT EXISTS workouts (
          id            bigserial PRIMARY KEY,
          user_id       bigint NOT NULL,
          sport_id      bigint NOT NULL,
          title         text,
          workout_date  timestamptz NOT NULL,
          duration_ms   bigint NOT NULL,
          moving_ms     bigint,
          pauses_ms     bigint,
          distance_km   double precision,
          min_alt       double precision,
          max_alt       double precision,
          ascent        double precision,
          descent       double precision,
          max_speed     double precision,
          ave_speed     double precision,
          bounds        double precision[],
          gpx           text,
          map           text,
          created_at    timestamptz NOT NULL DEFAULT now()
        );

        CREATE INDEX IF NOT EXISTS workouts_user_sport_idx ON workouts (user_id, sport_id);

        CREATE TABLE IF NOT EXISTS workout_segments (
          workout_id    bigint NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
          segment_id    int NOT NULL,
          duration_ms   bigint NOT NULL,
          moving_ms     bigint,
          pauses_ms     bigint,
          distance_km   double precision,
          min_alt       double precision,
          max_alt       double precision,
          ascent        double precision,
          descent       double precision,
          max_speed     double precision,
          ave_speed     double precision,
          PRIMARY KEY (workout_id, segment_id)
        );

        CREATE TABLE IF NOT EXISTS records (
          id            bigserial PRIMARY KEY,
          user_id       bigint NOT NULL,
          sport_id      bigint NOT NULL,
          workout_id    bigint NOT NULL,
          workout_date  timestamptz NOT NULL,
          record_type   text NOT NULL CHECK (record_type IN ('AS', 'FD', 'LD', 'MS')),
          value         bigint NOT NULL,
          UNIQUE (user_id, sport_id, record_type)
        );

        CREATE INDEX IF NOT EXISTS records_workout_idx ON records (workout_id);
        ",
    )
    .context("Ensuring PostgreSQL schema")
}

fn ms(d: Option<Duration>) -> Option<i64> {
    d.map(|d| d.num_milliseconds())
}

fn workout_from_row(row: &Row) -> Result<Workout> {
    let bounds: Option<Vec<f64>> = row.try_get(15)?;
    let bounds = match bounds {
        Some(v) => Some(
            <[f64; 4]>::try_from(v.as_slice())
                .map_err(|_| anyhow::anyhow!("bounds must have 4 values, got {}", v.len()))?,
        ),
        None => None,
    };
    Ok(Workout {
        id: row.try_get(0)?,
        user_id: row.try_get(1)?,
        sport_id: row.try_get(2)?,
        title: row.try_get(3)?,
        workout_date: row.try_get(4)?,
        duration: Duration::milliseconds(row.try_get(5)?),
        moving: row.try_get::<_, Option<i64>>(6)?.map(Duration::milliseconds),
        pauses: row.try_get::<_, Option<i64>>(7)?.map(Duration::milliseconds),
        distance_km: row.try_get(8)?,
        min_alt: row.try_get(9)?,
        max_alt: row.try_get(10)?,
        ascent: row.try_get(11)?,
        descent: row.try_get(12)?,
        max_speed_kmh: row.try_get(13)?,
        ave_speed_kmh: row.try_get(14)?,
        bounds,
        gpx_path: row.try_get(16)?,
        map_path: row.try_get(17)?,
    })
}

fn record_from_row(row: &Row) -> Result<Record> {
    let code: String = row.try_get(5)?;
    Ok(Record {
        id: row.try_get(0)?,
        user_id: row.try_get(1)?,
        sport_id: row.try_get(2)?,
        workout_id: row.try_get(3)?,
        workout_date: row.try_get(4)?,
        record_type: code.parse::<RecordType>().map_err(anyhow::Error::msg)?,
        value: row.try_get(6)?,
    })
}

fn query_workouts<C: GenericClient>(pg: &mut C, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Workout>> {
    let sql = format!(
        "SELECT {WORKOUT_COLUMNS} FROM workouts
         WHERE user_id = $1 AND ($2::bigint IS NULL OR sport_id = $2)
         ORDER BY workout_date, id"
    );
    pg.query(sql.as_str(), &[&user_id, &sport_id])
        .context("Reading workouts")?
        .iter()
        .map(workout_from_row)
        .collect()
}

fn query_records<C: GenericClient>(pg: &mut C, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Record>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM records
         WHERE user_id = $1 AND ($2::bigint IS NULL OR sport_id = $2)
         ORDER BY sport_id, record_type"
    );
    pg.query(sql.as_str(), &[&user_id, &sport_id])
        .context("Reading records")?
        .iter()
        .map(record_from_row)
        .collect()
}

fn apply_delta<C: GenericClient>(pg: &mut C, delta: &RecordsDelta) -> Result<()> {
    for op in &delta.ops {
        match op {
            RecordOp::Create(d) => {
                pg.execute(
                    "INSERT INTO records (user_id, sport_id, workout_id, workout_date, record_type, value)
                     VALUES ($1, $2, $3, $4, $5, $6)",
                    &[
                        &d.user_id,
                        &d.sport_id,
                        &d.workout_id,
                        &d.workout_date,
                        &d.record_type.code(),
                        &d.value,
                    ],
                )
                .context("Creating record")?;
            }
            RecordOp::Update { id, data: d } => {
                pg.execute(
                    "UPDATE records SET workout_id = $2, workout_date = $3, value = $4 WHERE id = $1",
                    &[id, &d.workout_id, &d.workout_date, &d.value],
                )
                .context("Updating record")?;
            }
            RecordOp::Delete { id, .. } => {
                pg.execute("DELETE FROM records WHERE id = $1", &[id])
                    .context("Deleting record")?;
            }
        }
    }
    Ok(())
}

impl Store for PgStore {
    fn insert_workout(&mut self, new: &NewWorkout) -> Result<Workout> {
        let mut tx = self.pg.transaction().context("Starting workout transaction")?;
        let m = &new.metrics;
        let bounds = m.bounds.map(|b| b.to_vec());
        let row = tx
            .query_one(
                "INSERT INTO workouts (
                   user_id, sport_id, title, workout_date, duration_ms, moving_ms, pauses_ms,
                   distance_km, min_alt, max_alt, ascent, descent, max_speed, ave_speed, bounds, gpx
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                 RETURNING id",
                &[
                    &new.user_id,
                    &new.sport_id,
                    &new.title,
                    &new.workout_date,
                    &ms(m.duration).unwrap_or(0),
                    &ms(m.moving_time),
                    &ms(m.stopped_time),
                    &m.distance_km,
                    &m.elevation_min,
                    &m.elevation_max,
                    &m.ascent,
                    &m.descent,
                    &m.max_speed_kmh,
                    &m.average_speed_kmh,
                    &bounds,
                    &new.gpx_path,
                ],
            )
            .context("Inserting workout")?;
        let id: i64 = row.get(0);

        let stmt = tx
            .prepare(
                "INSERT INTO workout_segments (
                   workout_id, segment_id, duration_ms, moving_ms, pauses_ms, distance_km,
                   min_alt, max_alt, ascent, descent, max_speed, ave_speed
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .context("Preparing segment insert")?;
        for (idx, s) in new.segments.iter().enumerate() {
            let segment_id = i32::try_from(idx).context("segment index out of range")?;
            tx.execute(
                &stmt,
                &[
                    &id,
                    &segment_id,
                    &ms(s.duration).unwrap_or(0),
                    &ms(s.moving_time),
                    &ms(s.stopped_time),
                    &s.distance_km,
                    &s.elevation_min,
                    &s.elevation_max,
                    &s.ascent,
                    &s.descent,
                    &s.max_speed_kmh,
                    &s.average_speed_kmh,
                ],
            )
            .context("Inserting workout segment")?;
        }
        tx.commit().context("Committing workout")?;
        dlog!("workout_inserted id={id} segments={}", new.segments.len());

        Ok(new.clone().into_workout(id))
    }

    fn get_workout(&mut self, id: i64) -> Result<Option<Workout>> {
        let sql = format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE id = $1");
        self.pg
            .query_opt(sql.as_str(), &[&id])
            .context("Reading workout")?
            .as_ref()
            .map(workout_from_row)
            .transpose()
    }

    fn update_workout(&mut self, w: &Workout) -> Result<()> {
        let bounds = w.bounds.map(|b| b.to_vec());
        let changed = self
            .pg
            .execute(
                "UPDATE workouts SET
                   user_id = $2, sport_id = $3, title = $4, workout_date = $5, duration_ms = $6,
                   moving_ms = $7, pauses_ms = $8, distance_km = $9, min_alt = $10, max_alt = $11,
                   ascent = $12, descent = $13, max_speed = $14, ave_speed = $15, bounds = $16,
                   gpx = $17, map = $18
                 WHERE id = $1",
                &[
                    &w.id,
                    &w.user_id,
                    &w.sport_id,
                    &w.title,
                    &w.workout_date,
                    &w.duration.num_milliseconds(),
                    &ms(w.moving),
                    &ms(w.pauses),
                    &w.distance_km,
                    &w.min_alt,
                    &w.max_alt,
                    &w.ascent,
                    &w.descent,
                    &w.max_speed_kmh,
                    &w.ave_speed_kmh,
                    &bounds,
                    &w.gpx_path,
                    &w.map_path,
                ],
            )
            .context("Updating workout")?;
        if changed == 0 {
            bail!("Workout {} does not exist", w.id);
        }
        Ok(())
    }

    fn delete_workout(&mut self, id: i64) -> Result<()> {
        self.pg
            .execute("DELETE FROM workouts WHERE id = $1", &[&id])
            .context("Deleting workout")?;
        Ok(())
    }

    fn workouts_for(&mut self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Workout>> {
        query_workouts(&mut self.pg, user_id, sport_id)
    }

    fn records_for(&mut self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Record>> {
        query_records(&mut self.pg, user_id, sport_id)
    }

    fn get_record(&mut self, id: i64) -> Result<Option<Record>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = $1");
        self.pg
            .query_opt(sql.as_str(), &[&id])
            .context("Reading record")?
            .as_ref()
            .map(record_from_row)
            .transpose()
    }

    fn delete_record(&mut self, id: i64) -> Result<()> {
        self.pg
            .execute("DELETE FROM records WHERE id = $1", &[&id])
            .context("Deleting record")?;
        Ok(())
    }

    fn record_sports_for_workout(&mut self, workout_id: i64) -> Result<Vec<i64>> {
        Ok(self
            .pg
            .query(
                "SELECT DISTINCT sport_id FROM records WHERE workout_id = $1 ORDER BY sport_id",
                &[&workout_id],
            )
            .context("Reading record sports")?
            .iter()
            .map(|r| r.get(0))
            .collect())
    }

    fn reconcile_locked(&mut self, user_id: i64, sport_id: i64) -> Result<RecordsDelta> {
        let mut tx = self.pg.transaction().context("Starting records transaction")?;
        // Released on commit or rollback.
        tx.execute(
            "SELECT pg_advisory_xact_lock(hashtextextended('records:' || $1::bigint::text || ':' || $2::bigint::text, 0))",
            &[&user_id, &sport_id],
        )
        .context("Locking records for user/sport")?;

        let history = query_workouts(&mut tx, user_id, Some(sport_id))?;
        let existing = query_records(&mut tx, user_id, Some(sport_id))?;
        let delta = reconcile_records(user_id, sport_id, &history, &existing)?;
        apply_delta(&mut tx, &delta)?;
        tx.commit().context("Committing records")?;

        dlog!(
            "reconciled user={user_id} sport={sport_id} workouts={} ops={}",
            history.len(),
            delta.ops.len()
        );
        Ok(delta)
    }
}
