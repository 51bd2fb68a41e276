use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::DatabaseError;
use crate::models::*;

const SELECT_COLUMNS: &str = "SELECT id, claim_id, asset_pair_id, selfie_path, document_path,
     document_back_path, supersedes, id_recog_data, face_recog_data, face_live_data,
     error_logs, timings, status, created_at, updated_at
     FROM moderation_records";

/// Insert a Pending seed row.
pub fn insert_moderation(
    conn: &Connection,
    seed: &NewModeration,
    now: DateTime<Utc>,
) -> Result<ModerationRecord, DatabaseError> {
    let now_str = format_timestamp(now);
    conn.execute(
        "INSERT INTO moderation_records (id, claim_id, asset_pair_id, selfie_path, document_path,
         document_back_path, supersedes, error_logs, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]', ?8, ?9, ?9)",
        params![
            seed.id,
            seed.claim_id,
            seed.assets.id,
            seed.assets.selfie.to_string_lossy().into_owned(),
            seed.assets.document.to_string_lossy().into_owned(),
            seed.assets.document_back.as_ref().map(|p| p.to_string_lossy().into_owned()),
            seed.supersedes,
            ModerationStatus::Pending.as_str(),
            now_str,
        ],
    )?;

    Ok(ModerationRecord {
        id: seed.id.clone(),
        claim_id: seed.claim_id.clone(),
        assets: seed.assets.clone(),
        supersedes: seed.supersedes.clone(),
        id_recog_data: None,
        face_recog_data: None,
        face_live_data: None,
        error_logs: Vec::new(),
        timings: None,
        status: ModerationStatus::Pending,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_moderation(conn: &Connection, id: &str) -> Result<Option<ModerationRecord>, DatabaseError> {
    let row = conn
        .query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], read_row)
        .optional()?;
    row.map(moderation_from_row).transpose()
}

/// Most recent record for an asset pair that blocks a new run
/// (Pending, or Completed unless `include_completed` is false).
pub fn find_blocking_moderation(
    conn: &Connection,
    asset_pair_id: &str,
    include_completed: bool,
) -> Result<Option<ModerationRecord>, DatabaseError> {
    let sql = format!(
        "{SELECT_COLUMNS} WHERE asset_pair_id = ?1 AND (status = 'pending' OR (?2 AND status = 'completed'))
         ORDER BY created_at DESC LIMIT 1"
    );
    let row = conn
        .query_row(&sql, params![asset_pair_id, include_completed], read_row)
        .optional()?;
    row.map(moderation_from_row).transpose()
}

/// All records for a claim, newest first.
pub fn list_moderations_for_claim(
    conn: &Connection,
    claim_id: &str,
) -> Result<Vec<ModerationRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE claim_id = ?1 ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map(params![claim_id], read_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(moderation_from_row(row?)?);
    }
    Ok(records)
}

/// Every record still Pending, oldest first.
pub fn list_pending_moderations(conn: &Connection) -> Result<Vec<ModerationRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "{SELECT_COLUMNS} WHERE status = 'pending' ORDER BY created_at ASC, rowid ASC"
    ))?;
    let rows = stmt.query_map([], read_row)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(moderation_from_row(row?)?);
    }
    Ok(records)
}

/// Terminal update. Only touches rows still Pending; returns rows changed.
pub fn finalize_moderation(
    conn: &Connection,
    id: &str,
    outcome: &ModerationOutcome,
    now: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    if !outcome.status.is_terminal() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "moderation {id} cannot be finalized as {}",
            outcome.status
        )));
    }

    let id_recog = outcome.id_recog_data.as_ref().map(serde_json::to_string).transpose()?;
    let face_recog = outcome.face_recog_data.as_ref().map(serde_json::to_string).transpose()?;
    let face_live = outcome.face_live_data.as_ref().map(serde_json::to_string).transpose()?;
    let error_logs = serde_json::to_string(&outcome.error_logs)?;
    let timings = serde_json::to_string(&outcome.timings)?;

    let rows = conn.execute(
        "UPDATE moderation_records
         SET id_recog_data = ?2, face_recog_data = ?3, face_live_data = ?4,
             error_logs = ?5, timings = ?6, status = ?7, updated_at = ?8
         WHERE id = ?1 AND status = 'pending'",
        params![
            id,
            id_recog,
            face_recog,
            face_live,
            error_logs,
            timings,
            outcome.status.as_str(),
            format_timestamp(now),
        ],
    )?;
    Ok(rows)
}

/// Raw column values, decoded by `moderation_from_row`.
struct ModerationRow {
    id: String,
    claim_id: String,
    asset_pair_id: String,
    selfie_path: String,
    document_path: String,
    document_back_path: Option<String>,
    supersedes: Option<String>,
    id_recog_data: Option<String>,
    face_recog_data: Option<String>,
    face_live_data: Option<String>,
    error_logs: String,
    timings: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ModerationRow> {
    Ok(ModerationRow {
        id: row.get(0)?,
        claim_id: row.get(1)?,
        asset_pair_id: row.get(2)?,
        selfie_path: row.get(3)?,
        document_path: row.get(4)?,
        document_back_path: row.get(5)?,
        supersedes: row.get(6)?,
        id_recog_data: row.get(7)?,
        face_recog_data: row.get(8)?,
        face_live_data: row.get(9)?,
        error_logs: row.get(10)?,
        timings: row.get(11)?,
        status: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn moderation_from_row(row: ModerationRow) -> Result<ModerationRecord, DatabaseError> {
    Ok(ModerationRecord {
        id: row.id,
        claim_id: row.claim_id,
        assets: AssetPair {
            id: row.asset_pair_id,
            selfie: PathBuf::from(row.selfie_path),
            document: PathBuf::from(row.document_path),
            document_back: row.document_back_path.map(PathBuf::from),
        },
        supersedes: row.supersedes,
        id_recog_data: parse_json(row.id_recog_data)?,
        face_recog_data: parse_json(row.face_recog_data)?,
        face_live_data: parse_json(row.face_live_data)?,
        error_logs: serde_json::from_str(&row.error_logs)?,
        timings: parse_json(row.timings)?,
        status: ModerationStatus::from_str(&row.status)?,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
    })
}

fn parse_json<T: serde::de::DeserializeOwned>(value: Option<String>) -> Result<Option<T>, DatabaseError> {
    value
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(DatabaseError::from)
}

/// Fixed-width RFC 3339 so `ORDER BY created_at` sorts chronologically.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidTimestamp {
            field: field.into(),
            value: value.into(),
        })
}
