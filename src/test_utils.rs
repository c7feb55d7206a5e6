//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Database setup/teardown
//! - Seed helpers for maxes, lookups, programs and progressions
//! - Helper assertions

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::models::{LookupEntry, LookupKind, MaxKind, Progression, ReferenceMax};
use crate::progression::ProgressionParams;
use crate::store::{lookups, maxes, programs};

/// ---------------------------------------------------------------------------
/// Database Test Utilities
/// ---------------------------------------------------------------------------

/// Create an in-memory SQLite database for testing
/// Runs all migrations and returns a ready-to-use pool
///
/// Uses max_connections(1) to prevent multiple pool connections from creating
/// isolated in-memory databases, which would cause intermittent test failures
pub async fn setup_test_db() -> SqlitePool {
  let pool = sqlx::sqlite::SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("Failed to create in-memory database");

  sqlx::migrate!("./migrations")
    .run(&pool)
    .await
    .expect("Failed to run migrations");

  pool
}

/// Close a test database pool
pub async fn teardown_test_db(pool: SqlitePool) {
  pool.close().await;
}

/// ---------------------------------------------------------------------------
/// Seeds
/// ---------------------------------------------------------------------------

/// Record a manual max
pub async fn seed_max(
  pool: &SqlitePool,
  user_id: &str,
  lift_id: &str,
  max_kind: MaxKind,
  value: f64,
  effective_at: DateTime<Utc>,
) -> ReferenceMax {
  maxes::record_manual_max(pool, user_id, lift_id, max_kind, value, effective_at)
    .await
    .expect("Failed to seed reference max")
}

/// Create a lookup table, returning its id
pub async fn seed_lookup(pool: &SqlitePool, name: &str, kind: LookupKind, entries: Vec<LookupEntry>) -> i64 {
  lookups::create_lookup_table(pool, name, kind, &entries)
    .await
    .expect("Failed to seed lookup table")
}

/// Enroll a user and set the program's lifts
pub async fn seed_enrollment(pool: &SqlitePool, user_id: &str, program_id: &str, lift_ids: &[&str]) {
  programs::enroll_user(pool, user_id, program_id, datetime_days_ago(30))
    .await
    .expect("Failed to enroll user");
  programs::set_program_lifts(pool, program_id, lift_ids)
    .await
    .expect("Failed to seed program lifts");
}

/// Create a training max progression and link it to a program
pub async fn seed_linked_progression(
  pool: &SqlitePool,
  program_id: &str,
  name: &str,
  params: ProgressionParams,
  lift_id: Option<&str>,
  priority: i32,
) -> Progression {
  let progression = programs::create_progression(pool, name, params, MaxKind::TrainingMax)
    .await
    .expect("Failed to seed progression");

  programs::link_progression(
    pool,
    programs::NewProgramProgression {
      program_id: program_id.to_string(),
      progression_id: progression.id,
      lift_id: lift_id.map(str::to_string),
      priority,
      enabled: true,
      override_increment: None,
    },
  )
  .await
  .expect("Failed to link progression");

  progression
}

/// ---------------------------------------------------------------------------
/// Time Helpers
/// ---------------------------------------------------------------------------

/// Create a DateTime N days ago from now
pub fn datetime_days_ago(days: i64) -> DateTime<Utc> {
  Utc::now() - Duration::days(days)
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_setup_db_creates_schema() {
    let pool = setup_test_db().await;

    let tables: Vec<(String,)> = sqlx::query_as(
      "SELECT name FROM sqlite_master WHERE type='table' AND name IN ('reference_maxes', 'lookup_tables', 'lookup_entries', 'progressions', 'program_progressions', 'progression_log')"
    )
    .fetch_all(&pool)
    .await
    .expect("Failed to query tables");

    assert_eq!(tables.len(), 6, "Expected 6 tables, got {}", tables.len());

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_seed_enrollment_and_progression() {
    let pool = setup_test_db().await;

    seed_enrollment(&pool, "u1", "p1", &["squat", "bench"]).await;
    let progression = seed_linked_progression(&pool, "p1", "cyc", ProgressionParams::Cycle { increment: 5.0 }, None, 0).await;

    let links = programs::program_progressions(&pool, "p1", crate::models::TriggerType::AfterCycle)
      .await
      .expect("Failed to load links");
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].as_ref().unwrap().progression.id, progression.id);
    assert_eq!(programs::program_lifts(&pool, "p1").await.unwrap().len(), 2);

    teardown_test_db(pool).await;
  }
}
