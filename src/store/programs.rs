//! Progression definitions, program enrollment and program/progression links

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool};

use crate::db::{format_ts, parse_ts};
use crate::error::{EngineError, EngineResult};
use crate::models::{MaxKind, ProgramProgression, Progression, TriggerType};
use crate::progression::ProgressionParams;

/// A program link together with the progression it points at
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedProgression {
  pub link: ProgramProgression,
  pub progression: Progression,
}

/// A link whose stored progression no longer loads. Dispatch reports it as a
/// failed unit instead of abandoning the other links.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokenLink {
  pub link: ProgramProgression,
  pub progression_name: String,
  pub error: EngineError,
}

/// One row of `program_progressions`
pub type LinkRow = Result<LinkedProgression, BrokenLink>;

/// Input for `link_progression`
#[derive(Debug, Clone, PartialEq)]
pub struct NewProgramProgression {
  pub program_id: String,
  pub progression_id: i64,
  pub lift_id: Option<String>,
  pub priority: i32,
  pub enabled: bool,
  pub override_increment: Option<f64>,
}

/// ---------------------------------------------------------------------------
/// Progressions
/// ---------------------------------------------------------------------------

fn row_to_progression(row: &SqliteRow) -> EngineResult<Progression> {
  let params_json: String = row.try_get("params_json")?;
  let params = ProgressionParams::from_json(&params_json)?;
  let max_kind: String = row.try_get("max_kind")?;
  let created_at: String = row.try_get("created_at")?;
  let updated_at: String = row.try_get("updated_at")?;

  Ok(Progression {
    id: row.try_get("id")?,
    name: row.try_get("name")?,
    params,
    max_kind: max_kind.parse().map_err(EngineError::Database)?,
    created_at: parse_ts(&created_at)?,
    updated_at: parse_ts(&updated_at)?,
  })
}

pub async fn create_progression(
  pool: &SqlitePool,
  name: &str,
  params: ProgressionParams,
  max_kind: MaxKind,
) -> EngineResult<Progression> {
  if name.trim().is_empty() {
    return Err(EngineError::validation("progression name must not be empty"));
  }
  params.validate()?;

  let now = Utc::now();
  let result = sqlx::query(
    r#"
    INSERT INTO progressions
      (name, progression_type, trigger_type, max_kind, params_json, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
    "#,
  )
  .bind(name)
  .bind(params.progression_type().as_str())
  .bind(params.trigger_type().as_str())
  .bind(max_kind.as_str())
  .bind(params.to_json()?)
  .bind(format_ts(&now))
  .execute(pool)
  .await
  .map_err(|e| unique_violation_as(e, format!("progression {:?} already exists", name)))?;

  tracing::info!(name, progression_type = %params.progression_type(), "progression created");

  Ok(Progression {
    id: result.last_insert_rowid(),
    name: name.to_string(),
    params,
    max_kind,
    created_at: now,
    updated_at: now,
  })
}

/// Replace a progression's parameters (the type may change)
pub async fn update_progression(
  pool: &SqlitePool,
  progression_id: i64,
  params: ProgressionParams,
) -> EngineResult<Progression> {
  params.validate()?;

  let result = sqlx::query(
    r#"
    UPDATE progressions
    SET progression_type = ?,
        trigger_type = ?,
        params_json = ?,
        updated_at = ?
    WHERE id = ?
    "#,
  )
  .bind(params.progression_type().as_str())
  .bind(params.trigger_type().as_str())
  .bind(params.to_json()?)
  .bind(format_ts(&Utc::now()))
  .bind(progression_id)
  .execute(pool)
  .await?;

  if result.rows_affected() == 0 {
    return Err(EngineError::NotFound(format!("progression {}", progression_id)));
  }

  load_progression(pool, progression_id).await
}

pub async fn load_progression<'e, E>(executor: E, progression_id: i64) -> EngineResult<Progression>
where
  E: Executor<'e, Database = Sqlite>,
{
  let row = sqlx::query(
    r#"
    SELECT id, name, max_kind, params_json, created_at, updated_at
    FROM progressions
    WHERE id = ?
    "#,
  )
  .bind(progression_id)
  .fetch_optional(executor)
  .await?
  .ok_or_else(|| EngineError::NotFound(format!("progression {}", progression_id)))?;

  row_to_progression(&row)
}

/// ---------------------------------------------------------------------------
/// Enrollment and program lifts
/// ---------------------------------------------------------------------------

/// Enroll (or move) a user into a program
pub async fn enroll_user(
  pool: &SqlitePool,
  user_id: &str,
  program_id: &str,
  enrolled_at: DateTime<Utc>,
) -> EngineResult<()> {
  sqlx::query(
    r#"
    INSERT INTO user_programs (user_id, program_id, enrolled_at)
    VALUES (?1, ?2, ?3)
    ON CONFLICT(user_id) DO UPDATE SET
      program_id = excluded.program_id,
      enrolled_at = excluded.enrolled_at
    "#,
  )
  .bind(user_id)
  .bind(program_id)
  .bind(format_ts(&enrolled_at))
  .execute(pool)
  .await?;

  Ok(())
}

pub async fn enrolled_program<'e, E>(executor: E, user_id: &str) -> EngineResult<Option<String>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let program_id = sqlx::query_scalar("SELECT program_id FROM user_programs WHERE user_id = ?")
    .bind(user_id)
    .fetch_optional(executor)
    .await?;
  Ok(program_id)
}

/// Replace the set of lifts a program trains
pub async fn set_program_lifts(pool: &SqlitePool, program_id: &str, lift_ids: &[&str]) -> EngineResult<()> {
  let mut tx = pool.begin().await?;

  sqlx::query("DELETE FROM program_lifts WHERE program_id = ?")
    .bind(program_id)
    .execute(&mut *tx)
    .await?;

  for lift_id in lift_ids {
    sqlx::query("INSERT OR IGNORE INTO program_lifts (program_id, lift_id) VALUES (?1, ?2)")
      .bind(program_id)
      .bind(*lift_id)
      .execute(&mut *tx)
      .await?;
  }

  tx.commit().await?;
  Ok(())
}

pub async fn program_lifts<'e, E>(executor: E, program_id: &str) -> EngineResult<Vec<String>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let lifts = sqlx::query_scalar("SELECT lift_id FROM program_lifts WHERE program_id = ? ORDER BY lift_id")
    .bind(program_id)
    .fetch_all(executor)
    .await?;
  Ok(lifts)
}

/// ---------------------------------------------------------------------------
/// Program links
/// ---------------------------------------------------------------------------

pub async fn link_progression(pool: &SqlitePool, new: NewProgramProgression) -> EngineResult<ProgramProgression> {
  if new.program_id.trim().is_empty() {
    return Err(EngineError::validation("program id must not be empty"));
  }
  if let Some(inc) = new.override_increment {
    if !inc.is_finite() || inc <= 0.0 {
      return Err(EngineError::validation(format!(
        "override increment must be > 0, got {}",
        inc
      )));
    }
  }
  // Fail with NotFound rather than a foreign key error
  load_progression(pool, new.progression_id).await?;

  let scope = new.lift_id.clone().unwrap_or_else(|| "program-wide".to_string());
  let result = sqlx::query(
    r#"
    INSERT INTO program_progressions
      (program_id, progression_id, lift_id, priority, enabled, override_increment)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    "#,
  )
  .bind(&new.program_id)
  .bind(new.progression_id)
  .bind(&new.lift_id)
  .bind(new.priority)
  .bind(new.enabled)
  .bind(new.override_increment)
  .execute(pool)
  .await
  .map_err(|e| {
    unique_violation_as(
      e,
      format!(
        "progression {} already linked to {} ({})",
        new.progression_id, new.program_id, scope
      ),
    )
  })?;

  Ok(ProgramProgression {
    id: result.last_insert_rowid(),
    program_id: new.program_id,
    progression_id: new.progression_id,
    lift_id: new.lift_id,
    priority: new.priority,
    enabled: new.enabled,
    override_increment: new.override_increment,
  })
}

pub async fn set_link_enabled(pool: &SqlitePool, link_id: i64, enabled: bool) -> EngineResult<()> {
  let result = sqlx::query("UPDATE program_progressions SET enabled = ? WHERE id = ?")
    .bind(enabled)
    .bind(link_id)
    .execute(pool)
    .await?;

  if result.rows_affected() == 0 {
    return Err(EngineError::NotFound(format!("program progression {}", link_id)));
  }
  Ok(())
}

/// Enabled links of a program whose progression listens to `trigger_type`,
/// priority ascending (insertion order breaks ties). A progression whose
/// stored definition fails to load comes back as `Err(BrokenLink)` in its
/// slot; only query failures fail the call.
pub async fn program_progressions<'e, E>(
  executor: E,
  program_id: &str,
  trigger_type: TriggerType,
) -> EngineResult<Vec<LinkRow>>
where
  E: Executor<'e, Database = Sqlite>,
{
  let rows = sqlx::query(
    r#"
    SELECT
      pp.id AS link_id, pp.program_id, pp.progression_id, pp.lift_id,
      pp.priority, pp.enabled, pp.override_increment,
      p.id, p.name, p.max_kind, p.params_json, p.created_at, p.updated_at
    FROM program_progressions pp
    JOIN progressions p ON p.id = pp.progression_id
    WHERE pp.program_id = ? AND pp.enabled = 1 AND p.trigger_type = ?
    ORDER BY pp.priority ASC, pp.id ASC
    "#,
  )
  .bind(program_id)
  .bind(trigger_type.as_str())
  .fetch_all(executor)
  .await?;

  rows
    .iter()
    .map(|row| -> EngineResult<LinkRow> {
      let link = ProgramProgression {
        id: row.try_get("link_id")?,
        program_id: row.try_get("program_id")?,
        progression_id: row.try_get("progression_id")?,
        lift_id: row.try_get("lift_id")?,
        priority: row.try_get("priority")?,
        enabled: row.try_get("enabled")?,
        override_increment: row.try_get("override_increment")?,
      };

      match row_to_progression(row) {
        Ok(progression) => Ok(Ok(LinkedProgression { link, progression })),
        Err(error) => {
          let progression_name: String = row.try_get("name")?;
          tracing::warn!(
            program_id = %link.program_id,
            progression_id = link.progression_id,
            error = %error,
            "stored progression failed to load"
          );
          Ok(Err(BrokenLink {
            link,
            progression_name,
            error,
          }))
        }
      }
    })
    .collect()
}

fn unique_violation_as(e: sqlx::Error, msg: String) -> EngineError {
  let is_unique = e
    .as_database_error()
    .is_some_and(|db| db.is_unique_violation());
  if is_unique {
    EngineError::Validation(msg)
  } else {
    e.into()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::{setup_test_db, teardown_test_db};

  fn linear_session() -> ProgressionParams {
    ProgressionParams::Linear {
      increment: 5.0,
      trigger: TriggerType::AfterSession,
    }
  }

  fn link(program: &str, progression_id: i64, lift: Option<&str>, priority: i32) -> NewProgramProgression {
    NewProgramProgression {
      program_id: program.to_string(),
      progression_id,
      lift_id: lift.map(str::to_string),
      priority,
      enabled: true,
      override_increment: None,
    }
  }

  #[tokio::test]
  async fn test_create_and_update_progression() {
    let pool = setup_test_db().await;

    let created = create_progression(&pool, "lp", linear_session(), MaxKind::TrainingMax)
      .await
      .expect("Should create");
    let loaded = load_progression(&pool, created.id).await.expect("Should load");
    assert_eq!(loaded.params, linear_session());

    let updated = update_progression(&pool, created.id, ProgressionParams::Cycle { increment: 10.0 })
      .await
      .expect("Should update");
    assert_eq!(updated.trigger_type(), TriggerType::AfterCycle);

    let missing = update_progression(&pool, 999, ProgressionParams::Cycle { increment: 10.0 }).await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_invalid_params_rejected_on_create() {
    let pool = setup_test_db().await;

    let result = create_progression(
      &pool,
      "bad",
      ProgressionParams::Cycle { increment: -5.0 },
      MaxKind::TrainingMax,
    )
    .await;
    assert!(matches!(result, Err(EngineError::Validation(_))));

    let duplicate = async {
      create_progression(&pool, "lp", linear_session(), MaxKind::TrainingMax).await?;
      create_progression(&pool, "lp", linear_session(), MaxKind::TrainingMax).await
    }
    .await;
    assert!(matches!(duplicate, Err(EngineError::Validation(_))));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_program_progressions_filtered_and_ordered() {
    let pool = setup_test_db().await;

    let lp = create_progression(&pool, "lp", linear_session(), MaxKind::TrainingMax).await.unwrap();
    let cyc = create_progression(&pool, "cyc", ProgressionParams::Cycle { increment: 5.0 }, MaxKind::TrainingMax)
      .await
      .unwrap();
    let lp2 = create_progression(&pool, "lp-bench", linear_session(), MaxKind::TrainingMax).await.unwrap();

    link_progression(&pool, link("p1", lp.id, None, 20)).await.unwrap();
    link_progression(&pool, link("p1", lp2.id, Some("bench"), 10)).await.unwrap();
    link_progression(&pool, link("p1", cyc.id, None, 0)).await.unwrap();
    let disabled = link_progression(&pool, link("p1", lp.id, Some("squat"), 5)).await.unwrap();
    set_link_enabled(&pool, disabled.id, false).await.unwrap();

    let session: Vec<LinkedProgression> = program_progressions(&pool, "p1", TriggerType::AfterSession)
      .await
      .unwrap()
      .into_iter()
      .map(|l| l.unwrap())
      .collect();
    let ids: Vec<i64> = session.iter().map(|l| l.progression.id).collect();
    assert_eq!(ids, vec![lp2.id, lp.id]);
    assert_eq!(session[0].link.lift_id.as_deref(), Some("bench"));

    let cycle = program_progressions(&pool, "p1", TriggerType::AfterCycle).await.unwrap();
    assert_eq!(cycle.len(), 1);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_unloadable_progression_is_isolated() {
    let pool = setup_test_db().await;

    let good = create_progression(&pool, "cyc", ProgressionParams::Cycle { increment: 5.0 }, MaxKind::TrainingMax)
      .await
      .unwrap();
    let bad = create_progression(&pool, "cyc-bad", ProgressionParams::Cycle { increment: 5.0 }, MaxKind::TrainingMax)
      .await
      .unwrap();
    link_progression(&pool, link("p1", bad.id, None, 0)).await.unwrap();
    link_progression(&pool, link("p1", good.id, None, 1)).await.unwrap();

    // Written behind the API's back, e.g. by an older release
    sqlx::query("UPDATE progressions SET params_json = ? WHERE id = ?")
      .bind(r#"{"type":"cycle","increment":-5}"#)
      .bind(bad.id)
      .execute(&pool)
      .await
      .unwrap();

    let rows = program_progressions(&pool, "p1", TriggerType::AfterCycle).await.unwrap();
    assert_eq!(rows.len(), 2);

    let broken = rows[0].as_ref().unwrap_err();
    assert_eq!(broken.link.progression_id, bad.id);
    assert_eq!(broken.progression_name, "cyc-bad");
    assert!(matches!(broken.error, EngineError::Validation(_)));
    assert_eq!(rows[1].as_ref().unwrap().progression.id, good.id);

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_link_validation() {
    let pool = setup_test_db().await;

    let missing = link_progression(&pool, link("p1", 42, None, 0)).await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));

    let lp = create_progression(&pool, "lp", linear_session(), MaxKind::TrainingMax).await.unwrap();
    let mut bad = link("p1", lp.id, Some("squat"), 0);
    bad.override_increment = Some(0.0);
    assert!(link_progression(&pool, bad).await.is_err());

    link_progression(&pool, link("p1", lp.id, None, 0)).await.unwrap();
    let again = link_progression(&pool, link("p1", lp.id, None, 1)).await;
    assert!(matches!(again, Err(EngineError::Validation(_))));

    teardown_test_db(pool).await;
  }

  #[tokio::test]
  async fn test_enrollment_and_lifts() {
    let pool = setup_test_db().await;

    enroll_user(&pool, "u1", "p1", Utc::now()).await.unwrap();
    enroll_user(&pool, "u1", "p2", Utc::now()).await.unwrap();
    assert_eq!(enrolled_program(&pool, "u1").await.unwrap().as_deref(), Some("p2"));
    assert_eq!(enrolled_program(&pool, "u2").await.unwrap(), None);

    set_program_lifts(&pool, "p2", &["squat", "bench", "squat"]).await.unwrap();
    assert_eq!(program_lifts(&pool, "p2").await.unwrap(), vec!["bench", "squat"]);

    teardown_test_db(pool).await;
  }
}
