//! Lookup tables and their entries

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use super::LookupSource;
use crate::error::{EngineError, EngineResult};
use crate::models::lookup::validate_entries;
use crate::models::{LookupEntry, LookupKey, LookupKind};

/// Create a lookup table with its entries. Keys are validated and must be
/// unique within the table; nothing is written if any entry is rejected.
pub async fn create_lookup_table(
  pool: &SqlitePool,
  name: &str,
  kind: LookupKind,
  entries: &[LookupEntry],
) -> EngineResult<i64> {
  if name.trim().is_empty() {
    return Err(EngineError::validation("lookup name must not be empty"));
  }
  validate_entries(kind, entries)?;

  let mut tx = pool.begin().await?;

  let lookup_id = sqlx::query("INSERT INTO lookup_tables (name, kind) VALUES (?1, ?2)")
    .bind(name)
    .bind(kind.as_str())
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

  for entry in entries {
    let reps_json = entry.reps.as_ref().map(serde_json::to_string).transpose()?;
    sqlx::query(
      r#"
      INSERT INTO lookup_entries (lookup_id, entry_key, percentage, reps_json, intensity)
      VALUES (?1, ?2, ?3, ?4, ?5)
      "#,
    )
    .bind(lookup_id)
    .bind(entry.key.storage_key())
    .bind(entry.percentage)
    .bind(reps_json)
    .bind(&entry.intensity)
    .execute(&mut *tx)
    .await?;
  }

  tx.commit().await?;

  tracing::debug!(lookup_id, name, kind = kind.as_str(), entries = entries.len(), "lookup table created");
  Ok(lookup_id)
}

fn row_to_entry(row: &SqliteRow, key: LookupKey) -> EngineResult<LookupEntry> {
  let reps_json: Option<String> = row.try_get("reps_json")?;
  let reps = reps_json
    .map(|raw| {
      serde_json::from_str::<Vec<i32>>(&raw)
        .map_err(|e| EngineError::Database(format!("Bad reps_json {:?}: {}", raw, e)))
    })
    .transpose()?;

  Ok(LookupEntry {
    key,
    percentage: row.try_get("percentage")?,
    reps,
    intensity: row.try_get("intensity")?,
  })
}

/// Entry for `key` in table `lookup_id`, provided the table is of the key's kind
pub async fn lookup_entry<'e, E>(
  executor: E,
  lookup_id: i64,
  key: &LookupKey,
) -> EngineResult<Option<LookupEntry>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let row = sqlx::query(
    r#"
    SELECT e.percentage, e.reps_json, e.intensity
    FROM lookup_entries e
    JOIN lookup_tables t ON t.id = e.lookup_id
    WHERE e.lookup_id = ? AND t.kind = ? AND e.entry_key = ?
    "#,
  )
  .bind(lookup_id)
  .bind(key.kind().as_str())
  .bind(key.storage_key())
  .fetch_optional(executor)
  .await?;

  row.as_ref().map(|r| row_to_entry(r, key.clone())).transpose()
}

/// All entries of a table, in insertion order
pub async fn load_lookup_entries(pool: &SqlitePool, lookup_id: i64) -> EngineResult<Vec<LookupEntry>> {
  let kind: Option<String> = sqlx::query_scalar("SELECT kind FROM lookup_tables WHERE id = ?")
    .bind(lookup_id)
    .fetch_optional(pool)
    .await?;
  let kind: LookupKind = kind
    .ok_or_else(|| EngineError::NotFound(format!("lookup table {}", lookup_id)))?
    .parse()
    .map_err(EngineError::Database)?;

  let rows = sqlx::query(
    r#"
    SELECT entry_key, percentage, reps_json, intensity
    FROM lookup_entries
    WHERE lookup_id = ?
    ORDER BY id
    "#,
  )
  .bind(lookup_id)
  .fetch_all(pool)
  .await?;

  rows
    .iter()
    .map(|row| {
      let raw_key: String = row.try_get("entry_key")?;
      let key = match kind {
        LookupKind::Weekly => LookupKey::Week(parse_int_key(&raw_key)?),
        LookupKind::Daily => LookupKey::Day(raw_key),
        LookupKind::Rotation => LookupKey::Rotation(parse_int_key(&raw_key)?),
      };
      row_to_entry(row, key)
    })
    .collect()
}

fn parse_int_key(raw: &str) -> EngineResult<i32> {
  raw
    .parse()
    .map_err(|_| EngineError::Database(format!("Bad numeric lookup key: {}", raw)))
}

#[async_trait]
impl LookupSource for SqlitePool {
  async fn weekly_entry(&self, lookup_id: i64, week: i32) -> EngineResult<Option<LookupEntry>> {
    lookup_entry(self, lookup_id, &LookupKey::Week(week)).await
  }

  async fn daily_entry(&self, lookup_id: i64, day: &str) -> EngineResult<Option<LookupEntry>> {
    lookup_entry(self, lookup_id, &LookupKey::Day(day.to_string())).await
  }

  async fn rotation_entry(&self, lookup_id: i64, position: i32) -> EngineResult<Option<LookupEntry>> {
    lookup_entry(self, lookup_id, &LookupKey::Rotation(position)).await
  }
}
