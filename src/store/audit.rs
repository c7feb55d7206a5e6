//! Progression audit log. The table's unique key is the idempotency guard;
//! `log_exists` is only a fast path in front of it.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use crate::db::{format_ts, parse_ts};
use crate::error::{EngineError, EngineResult};
use crate::models::{MaxKind, ProgressionLogEntry, TriggerType};

/// Identity of one application of a progression
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerKey<'a> {
  pub user_id: &'a str,
  pub progression_id: i64,
  pub lift_id: &'a str,
  pub trigger_type: TriggerType,
  pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry<'a> {
  pub key: TriggerKey<'a>,
  pub max_kind: MaxKind,
  pub previous_value: f64,
  pub new_value: f64,
  pub delta: f64,
  pub trigger_context: serde_json::Value,
}

pub async fn log_exists<'e, E>(executor: E, key: &TriggerKey<'_>) -> EngineResult<bool>
where
  E: Executor<'e, Database = Sqlite>,
{
  let found: Option<i64> = sqlx::query_scalar(
    r#"
    SELECT id FROM progression_log
    WHERE user_id = ? AND progression_id = ? AND lift_id = ? AND trigger_type = ? AND applied_at = ?
    "#,
  )
  .bind(key.user_id)
  .bind(key.progression_id)
  .bind(key.lift_id)
  .bind(key.trigger_type.as_str())
  .bind(format_ts(&key.applied_at))
  .fetch_optional(executor)
  .await?;

  Ok(found.is_some())
}

/// Insert an entry. `None` means the key was already recorded and nothing
/// was written.
pub async fn insert_log<'e, E>(executor: E, entry: &NewLogEntry<'_>) -> EngineResult<Option<i64>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let result = sqlx::query(
    r#"
    INSERT INTO progression_log (
      user_id, progression_id, lift_id, max_kind, previous_value, new_value,
      delta, trigger_type, trigger_context_json, applied_at
    )
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT (user_id, progression_id, lift_id, trigger_type, applied_at) DO NOTHING
    "#,
  )
  .bind(entry.key.user_id)
  .bind(entry.key.progression_id)
  .bind(entry.key.lift_id)
  .bind(entry.max_kind.as_str())
  .bind(entry.previous_value)
  .bind(entry.new_value)
  .bind(entry.delta)
  .bind(entry.key.trigger_type.as_str())
  .bind(entry.trigger_context.to_string())
  .bind(format_ts(&entry.key.applied_at))
  .execute(executor)
  .await?;

  if result.rows_affected() == 0 {
    Ok(None)
  } else {
    Ok(Some(result.last_insert_rowid()))
  }
}

fn row_to_entry(row: &SqliteRow) -> EngineResult<ProgressionLogEntry> {
  let max_kind: String = row.try_get("max_kind")?;
  let trigger_type: String = row.try_get("trigger_type")?;
  let context_json: String = row.try_get("trigger_context_json")?;
  let applied_at: String = row.try_get("applied_at")?;

  Ok(ProgressionLogEntry {
    id: row.try_get("id")?,
    user_id: row.try_get("user_id")?,
    progression_id: row.try_get("progression_id")?,
    lift_id: row.try_get("lift_id")?,
    max_kind: max_kind.parse().map_err(EngineError::Database)?,
    previous_value: row.try_get("previous_value")?,
    new_value: row.try_get("new_value")?,
    delta: row.try_get("delta")?,
    trigger_type: trigger_type.parse().map_err(EngineError::Database)?,
    trigger_context: serde_json::from_str(&context_json)
      .map_err(|e| EngineError::Database(format!("Bad trigger context: {}", e)))?,
    applied_at: parse_ts(&applied_at)?,
  })
}

/// A user's progression history, newest first, optionally for one lift
pub async fn progression_log(
  pool: &SqlitePool,
  user_id: &str,
  lift_id: Option<&str>,
) -> EngineResult<Vec<ProgressionLogEntry>> {
  let rows = sqlx::query(
    r#"
    SELECT
      id, user_id, progression_id, lift_id, max_kind, previous_value, new_value,
      delta, trigger_type, trigger_context_json, applied_at
    FROM progression_log
    WHERE user_id = ?1 AND (?2 IS NULL OR lift_id = ?2)
    ORDER BY applied_at DESC, id DESC
    "#,
  )
  .bind(user_id)
  .bind(lift_id)
  .fetch_all(pool)
  .await?;

  rows.iter().map(row_to_entry).collect()
}
