use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

pub type DbPool = SqlitePool;

/// Initialize the database connection pool and run migrations
pub async fn initialize_db(config: &EngineConfig) -> EngineResult<DbPool> {
  tracing::info!(url = %config.database_url, "initializing database");

  let pool = SqlitePoolOptions::new()
    .max_connections(config.max_connections)
    .connect(&config.database_url)
    .await?;

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .map_err(|e| EngineError::Database(format!("Failed to run migrations: {}", e)))?;

  tracing::info!("database initialized");

  Ok(pool)
}

/// Timestamps are stored as fixed-width RFC 3339 text (microseconds, `Z`),
/// so text comparison orders them and equal instants compare equal.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(raw: &str) -> EngineResult<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| EngineError::Database(format!("Bad timestamp {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn test_timestamp_text_orders_chronologically() {
    let early = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
    let late = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    assert!(format_ts(&early) < format_ts(&late));
    assert_eq!(format_ts(&early).len(), format_ts(&late).len());
  }

  #[test]
  fn test_timestamp_text_roundtrips() {
    let ts = Utc.with_ymd_and_hms(2024, 3, 1, 6, 30, 0).unwrap();
    assert_eq!(parse_ts(&format_ts(&ts)).unwrap(), ts);
  }
}
