//! Job repository: the transition-validated API over the `jobs` table.
//!
//! Every mutation runs in one immediate transaction and appends a row to
//! `job_events` when the status changes, so the history of a job is exactly
//! the sequence of edges it took.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::job::{Job, JobEvent, JobStatus, StagePaths};

const JOB_COLUMNS: &str = "id, original_filename, input_path, status, chunks_dir, \
     converted_chunks_dir, output_path, error_message, created_at, updated_at";

/// Current time in the stored format. Fixed precision keeps lexical order
/// equal to chronological order.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn path_to_sql(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn opt_path_to_sql(path: &Option<PathBuf>) -> Option<String> {
    path.as_deref().map(path_to_sql)
}

fn job_from_row(row: &Row<'_>) -> Result<Job, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Job {
        id: row.get("id")?,
        original_filename: row.get("original_filename")?,
        input_path: PathBuf::from(row.get::<_, String>("input_path")?),
        status: row.get("status")?,
        chunks_dir: row.get::<_, Option<String>>("chunks_dir")?.map(PathBuf::from),
        converted_chunks_dir: row
            .get::<_, Option<String>>("converted_chunks_dir")?
            .map(PathBuf::from),
        output_path: row.get::<_, Option<String>>("output_path")?.map(PathBuf::from),
        error_message: row.get("error_message")?,
        created_at: parse_timestamp(8, &created_at)?,
        updated_at: parse_timestamp(9, &updated_at)?,
    })
}

fn event_from_row(row: &Row<'_>) -> Result<JobEvent, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    Ok(JobEvent {
        id: row.get("id")?,
        job_id: row.get("job_id")?,
        from_status: row.get("from_status")?,
        to_status: row.get("to_status")?,
        message: row.get("message")?,
        created_at: parse_timestamp(5, &created_at)?,
    })
}

fn load(conn: &Connection, id: i64) -> Result<Job, DatabaseError> {
    conn.query_row(
        &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
        params![id],
        job_from_row,
    )
    .optional()?
    .ok_or(DatabaseError::NotFound(id))
}

fn active_job_for(conn: &Connection, input_path: &str) -> Result<Option<i64>, DatabaseError> {
    let id = conn
        .query_row(
            "SELECT id FROM jobs WHERE input_path = ?1 AND status NOT IN ('ERROR', 'COMPLETED')
             ORDER BY id LIMIT 1",
            params![input_path],
            |r| r.get(0),
        )
        .optional()?;
    Ok(id)
}

fn record_event(
    conn: &Connection,
    job_id: i64,
    from: Option<JobStatus>,
    to: JobStatus,
    message: Option<&str>,
    at: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO job_events (job_id, from_status, to_status, message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![job_id, from, to, message, at],
    )?;
    Ok(())
}

fn write_status(
    conn: &Connection,
    id: i64,
    from: JobStatus,
    to: JobStatus,
    message: Option<&str>,
) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    conn.execute(
        "UPDATE jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, to, now],
    )?;
    record_event(conn, id, Some(from), to, message, &now)
}

fn merge_paths(conn: &Connection, id: i64, paths: &StagePaths) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE jobs SET
             chunks_dir = COALESCE(?2, chunks_dir),
             converted_chunks_dir = COALESCE(?3, converted_chunks_dir),
             output_path = COALESCE(?4, output_path),
             updated_at = ?5
         WHERE id = ?1",
        params![
            id,
            opt_path_to_sql(&paths.chunks_dir),
            opt_path_to_sql(&paths.converted_chunks_dir),
            opt_path_to_sql(&paths.output_path),
            now_timestamp(),
        ],
    )?;
    Ok(changed)
}

/// Registers a new job in status `NEW`.
///
/// Fails with [`DatabaseError::Duplicate`] if a job for the same input is
/// still moving through the pipeline.
pub fn create_job(
    db: &Database,
    original_filename: &str,
    input_path: &Path,
) -> Result<i64, DatabaseError> {
    let input = path_to_sql(input_path);
    db.with_tx(|tx| {
        if let Some(existing_id) = active_job_for(tx, &input)? {
            return Err(DatabaseError::Duplicate {
                input_path: input_path.to_path_buf(),
                existing_id,
            });
        }

        let now = now_timestamp();
        tx.execute(
            "INSERT INTO jobs (original_filename, input_path, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![original_filename, input, JobStatus::New, now],
        )?;
        let id = tx.last_insert_rowid();
        record_event(tx, id, None, JobStatus::New, None, &now)?;
        Ok(id)
    })
}

pub fn get_job(db: &Database, id: i64) -> Result<Job, DatabaseError> {
    db.with_conn(|conn| load(conn, id))
}

pub fn find_job(db: &Database, id: i64) -> Result<Option<Job>, DatabaseError> {
    match get_job(db, id) {
        Ok(job) => Ok(Some(job)),
        Err(DatabaseError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Jobs in `status`, oldest first.
pub fn list_jobs(db: &Database, status: JobStatus) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE status = ?1 ORDER BY created_at ASC, id ASC",
            JOB_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![status], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Most recently created jobs first.
pub fn list_recent(db: &Database, limit: u64) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs ORDER BY id DESC LIMIT ?1",
            JOB_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// All jobs ever created for `input_path`, oldest first.
pub fn find_by_input_path(db: &Database, input_path: &Path) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE input_path = ?1 ORDER BY id ASC",
            JOB_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![path_to_sql(input_path)], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1",
            params![status],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Moves a job along one edge of the state machine.
pub fn set_status(db: &Database, id: i64, new_status: JobStatus) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        let job = load(tx, id)?;
        if !job.status.can_transition_to(new_status) {
            return Err(DatabaseError::IllegalTransition {
                id,
                from: job.status,
                to: new_status,
            });
        }
        write_status(tx, id, job.status, new_status, None)
    })
}

/// Merges the provided paths into the job. Fields left `None` are kept.
pub fn set_paths(db: &Database, id: i64, paths: &StagePaths) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        if merge_paths(tx, id, paths)? == 0 {
            return Err(DatabaseError::NotFound(id));
        }
        Ok(())
    })
}

/// Puts a job into `ERROR` with `message`.
///
/// Allowed from every status except `COMPLETED`. Calling it on a job that is
/// already in `ERROR` replaces the message.
pub fn set_error(db: &Database, id: i64, message: &str) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        let job = load(tx, id)?;
        if job.status == JobStatus::Completed {
            return Err(DatabaseError::IllegalTransition {
                id,
                from: job.status,
                to: JobStatus::Error,
            });
        }

        let now = now_timestamp();
        tx.execute(
            "UPDATE jobs SET status = ?2, error_message = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, JobStatus::Error, message, now],
        )?;
        if job.status != JobStatus::Error {
            record_event(tx, id, Some(job.status), JobStatus::Error, Some(message), &now)?;
        }
        Ok(())
    })
}

/// Atomically moves a job from `from` to `to` if it is still in `from`.
///
/// Returns `false` when someone else already moved the job.
pub fn claim(
    db: &Database,
    id: i64,
    from: JobStatus,
    to: JobStatus,
) -> Result<bool, DatabaseError> {
    if !from.can_transition_to(to) {
        return Err(DatabaseError::IllegalTransition { id, from, to });
    }

    db.with_tx(|tx| {
        let now = now_timestamp();
        let changed = tx.execute(
            "UPDATE jobs SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
            params![id, from, to, now],
        )?;
        if changed == 1 {
            record_event(tx, id, Some(from), to, None, &now)?;
            return Ok(true);
        }
        // Distinguish "lost the race" from "no such job".
        load(tx, id)?;
        Ok(false)
    })
}

/// Applies a successful stage: merges `paths` and moves `from -> to` in one
/// transaction.
pub fn advance(
    db: &Database,
    id: i64,
    from: JobStatus,
    to: JobStatus,
    paths: &StagePaths,
) -> Result<(), DatabaseError> {
    db.with_tx(|tx| {
        let job = load(tx, id)?;
        if job.status != from || !from.can_transition_to(to) {
            return Err(DatabaseError::IllegalTransition {
                id,
                from: job.status,
                to,
            });
        }
        merge_paths(tx, id, paths)?;
        write_status(tx, id, from, to, None)
    })
}

/// Reverts an in-progress job to the last completed status, keeping its paths.
pub fn requeue(db: &Database, id: i64, reason: &str) -> Result<JobStatus, DatabaseError> {
    db.with_tx(|tx| {
        let job = load(tx, id)?;
        let target = job
            .status
            .requeue_target()
            .ok_or(DatabaseError::IllegalTransition {
                id,
                from: job.status,
                to: job.status,
            })?;
        write_status(tx, id, job.status, target, Some(reason))?;
        Ok(target)
    })
}

/// Resets an `ERROR` job so it re-enters at the stage that failed, and
/// clears its error message.
pub fn retry(db: &Database, id: i64) -> Result<JobStatus, DatabaseError> {
    db.with_tx(|tx| {
        let job = load(tx, id)?;
        let target = job.retry_entry();
        if job.status != JobStatus::Error {
            return Err(DatabaseError::IllegalTransition {
                id,
                from: job.status,
                to: target,
            });
        }
        if let Some(existing_id) = active_job_for(tx, &path_to_sql(&job.input_path))? {
            return Err(DatabaseError::Duplicate {
                input_path: job.input_path.clone(),
                existing_id,
            });
        }

        let now = now_timestamp();
        tx.execute(
            "UPDATE jobs SET status = ?2, error_message = NULL, updated_at = ?3 WHERE id = ?1",
            params![id, target, now],
        )?;
        record_event(tx, id, Some(JobStatus::Error), target, Some("retry"), &now)?;
        Ok(target)
    })
}

/// In-progress jobs whose last update is at or before `cutoff`.
pub fn find_stale(db: &Database, cutoff: DateTime<Utc>) -> Result<Vec<Job>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE status IN (?1, ?2, ?3) AND updated_at <= ?4
             ORDER BY updated_at ASC, id ASC",
            JOB_COLUMNS
        ))?;
        let [a, b, c] = JobStatus::IN_PROGRESS;
        let rows = stmt
            .query_map(params![a, b, c, format_timestamp(cutoff)], job_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Status history of a job, oldest first.
pub fn history(db: &Database, id: i64) -> Result<Vec<JobEvent>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, job_id, from_status, to_status, message, created_at
             FROM job_events WHERE job_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
