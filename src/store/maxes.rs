//! Reference max history: append-only, current = latest effective_at

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use super::MaxSource;
use crate::db::{format_ts, parse_ts};
use crate::error::{EngineError, EngineResult};
use crate::models::{MaxKey, MaxKind, MaxOrigin, ReferenceMax};

fn row_to_max(row: &SqliteRow) -> EngineResult<ReferenceMax> {
  let max_kind: String = row.try_get("max_kind")?;
  let origin: String = row.try_get("source")?;
  let effective_at: String = row.try_get("effective_at")?;

  Ok(ReferenceMax {
    id: row.try_get("id")?,
    user_id: row.try_get("user_id")?,
    lift_id: row.try_get("lift_id")?,
    max_kind: max_kind.parse().map_err(EngineError::Database)?,
    value: row.try_get("value")?,
    effective_at: parse_ts(&effective_at)?,
    origin: origin.parse().map_err(EngineError::Database)?,
  })
}

/// Most recent value for the key. Ties on effective_at go to the later insert.
pub async fn current_max<'e, E>(executor: E, key: &MaxKey) -> EngineResult<Option<ReferenceMax>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let row = sqlx::query(
    r#"
    SELECT id, user_id, lift_id, max_kind, value, effective_at, source
    FROM reference_maxes
    WHERE user_id = ? AND lift_id = ? AND max_kind = ?
    ORDER BY effective_at DESC, id DESC
    LIMIT 1
    "#,
  )
  .bind(&key.user_id)
  .bind(&key.lift_id)
  .bind(key.max_kind.as_str())
  .fetch_optional(executor)
  .await?;

  row.as_ref().map(row_to_max).transpose()
}

/// Append a new value for the key
pub async fn record_max<'e, E>(
  executor: E,
  key: &MaxKey,
  value: f64,
  effective_at: DateTime<Utc>,
  origin: MaxOrigin,
) -> EngineResult<ReferenceMax>
where
  E: Executor<'e, Database = Sqlite>,
{
  if !value.is_finite() || value <= 0.0 {
    return Err(EngineError::validation(format!(
      "reference max must be > 0, got {}",
      value
    )));
  }

  let result = sqlx::query(
    r#"
    INSERT INTO reference_maxes (user_id, lift_id, max_kind, value, effective_at, source)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    "#,
  )
  .bind(&key.user_id)
  .bind(&key.lift_id)
  .bind(key.max_kind.as_str())
  .bind(value)
  .bind(format_ts(&effective_at))
  .bind(origin.as_str())
  .execute(executor)
  .await?;

  Ok(ReferenceMax {
    id: result.last_insert_rowid(),
    user_id: key.user_id.clone(),
    lift_id: key.lift_id.clone(),
    max_kind: key.max_kind,
    value,
    effective_at,
    origin,
  })
}

/// Direct user entry (test day, coach edit). Supersedes any progression value.
pub async fn record_manual_max(
  pool: &SqlitePool,
  user_id: &str,
  lift_id: &str,
  max_kind: MaxKind,
  value: f64,
  effective_at: DateTime<Utc>,
) -> EngineResult<ReferenceMax> {
  let key = MaxKey::new(user_id, lift_id, max_kind);
  let max = record_max(pool, &key, value, effective_at, MaxOrigin::Manual).await?;
  tracing::info!(user_id, lift_id, %max_kind, value, "manual max recorded");
  Ok(max)
}

/// Full history for a key, newest first
pub async fn max_history(pool: &SqlitePool, key: &MaxKey) -> EngineResult<Vec<ReferenceMax>> {
  let rows = sqlx::query(
    r#"
    SELECT id, user_id, lift_id, max_kind, value, effective_at, source
    FROM reference_maxes
    WHERE user_id = ? AND lift_id = ? AND max_kind = ?
    ORDER BY effective_at DESC, id DESC
    "#,
  )
  .bind(&key.user_id)
  .bind(&key.lift_id)
  .bind(key.max_kind.as_str())
  .fetch_all(pool)
  .await?;

  rows.iter().map(row_to_max).collect()
}

#[async_trait]
impl MaxSource for SqlitePool {
  async fn current_max(&self, key: &MaxKey) -> EngineResult<Option<ReferenceMax>> {
    current_max(self, key).await
  }
}
