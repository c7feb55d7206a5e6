//! One progression for one lift, as a single transaction:
//! idempotency check, current max, strategy, audit insert, new max.

use sqlx::{SqliteConnection, SqlitePool};
use tokio::time::Instant;

use crate::error::{EngineError, EngineResult};
use crate::models::{MaxKey, MaxOrigin, TriggerEvent};
use crate::store::audit::{self, NewLogEntry, TriggerKey};
use crate::store::maxes;
use crate::store::programs::LinkedProgression;

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied {
        log_id: i64,
        previous_value: f64,
        new_value: f64,
        delta: f64,
        reason: String,
    },
    /// The trigger key was already recorded
    SkippedIdempotent,
    SkippedNotApplicable {
        reason: String,
    },
}

/// Run the progression for `lift_id`. Infrastructure failures come back as
/// `TransactionFailed` with nothing written.
pub async fn apply_progression(
    pool: &SqlitePool,
    event: &TriggerEvent,
    linked: &LinkedProgression,
    lift_id: &str,
) -> EngineResult<ApplyOutcome> {
    let mut tx = pool.begin().await.map_err(|e| rolled_back(e.into()))?;

    // Dropping `tx` on the error path rolls it back
    let outcome = apply_in(&mut tx, event, linked, lift_id)
        .await
        .map_err(rolled_back)?;

    tx.commit().await.map_err(|e| rolled_back(e.into()))?;
    Ok(outcome)
}

/// `apply_progression` bounded by `deadline`. Past the deadline the
/// in-flight transaction is dropped, which rolls it back.
pub async fn apply_with_deadline(
    pool: &SqlitePool,
    event: &TriggerEvent,
    linked: &LinkedProgression,
    lift_id: &str,
    deadline: Option<Instant>,
) -> EngineResult<ApplyOutcome> {
    let Some(deadline) = deadline else {
        return apply_progression(pool, event, linked, lift_id).await;
    };

    // An expired deadline never opens a transaction
    if Instant::now() >= deadline {
        return Err(deadline_exceeded(event, linked, lift_id));
    }

    match tokio::time::timeout_at(deadline, apply_progression(pool, event, linked, lift_id)).await {
        Ok(result) => result,
        Err(_) => Err(deadline_exceeded(event, linked, lift_id)),
    }
}

fn deadline_exceeded(event: &TriggerEvent, linked: &LinkedProgression, lift_id: &str) -> EngineError {
    tracing::warn!(
        user_id = %event.user_id,
        progression_id = linked.progression.id,
        lift_id,
        "progression deadline exceeded"
    );
    EngineError::TransactionFailed("deadline exceeded; rolled back".to_string())
}

async fn apply_in(
    conn: &mut SqliteConnection,
    event: &TriggerEvent,
    linked: &LinkedProgression,
    lift_id: &str,
) -> EngineResult<ApplyOutcome> {
    let progression = &linked.progression;
    let key = TriggerKey {
        user_id: &event.user_id,
        progression_id: progression.id,
        lift_id,
        trigger_type: event.trigger_type(),
        applied_at: event.occurred_at,
    };

    if audit::log_exists(&mut *conn, &key).await? {
        tracing::debug!(progression_id = progression.id, lift_id, "already applied");
        return Ok(ApplyOutcome::SkippedIdempotent);
    }

    let max_key = MaxKey::new(&event.user_id, lift_id, progression.max_kind);
    let current = maxes::current_max(&mut *conn, &max_key)
        .await?
        .ok_or_else(|| EngineError::max_not_found(&event.user_id, lift_id, progression.max_kind))?;

    let decision = progression
        .params
        .apply(current.value, event, lift_id, linked.link.override_increment);
    if !decision.applied {
        return Ok(ApplyOutcome::SkippedNotApplicable {
            reason: decision.reason,
        });
    }

    let entry = NewLogEntry {
        key: key.clone(),
        max_kind: progression.max_kind,
        previous_value: current.value,
        new_value: decision.new_value,
        delta: decision.delta,
        trigger_context: serde_json::to_value(&event.context)?,
    };

    // Lost a race with a concurrent dispatch of the same event
    let Some(log_id) = audit::insert_log(&mut *conn, &entry).await? else {
        return Ok(ApplyOutcome::SkippedIdempotent);
    };

    // The new row must supersede the one just read, even when that row is
    // newer than the event (late report, manual entry, out-of-order events).
    // Equal timestamps fall back to insertion order.
    let effective_at = event.occurred_at.max(current.effective_at);
    maxes::record_max(
        &mut *conn,
        &max_key,
        decision.new_value,
        effective_at,
        MaxOrigin::Progression,
    )
    .await?;

    tracing::info!(
        user_id = %event.user_id,
        progression = %progression.name,
        lift_id,
        previous = current.value,
        new = decision.new_value,
        "progression applied"
    );

    Ok(ApplyOutcome::Applied {
        log_id,
        previous_value: current.value,
        new_value: decision.new_value,
        delta: decision.delta,
        reason: decision.reason,
    })
}

fn rolled_back(e: EngineError) -> EngineError {
    match e {
        EngineError::Database(msg) => EngineError::TransactionFailed(format!("{}; rolled back", msg)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LiftPerformed, MaxKind};
    use crate::progression::ProgressionParams;
    use crate::store::audit::progression_log;
    use crate::store::programs::program_progressions;
    use crate::test_utils::{
        datetime_days_ago, seed_linked_progression, seed_max, setup_test_db, teardown_test_db,
    };
    use chrono::Utc;
    use std::time::Duration;

    fn amrap() -> ProgressionParams {
        ProgressionParams::Amrap {
            increment: 5.0,
            min_reps: 5,
            double_threshold: 10,
            deload_percent: 0.10,
        }
    }

    async fn linked(pool: &SqlitePool) -> LinkedProgression {
        seed_linked_progression(pool, "p1", "gslp", amrap(), None, 0).await;
        program_progressions(pool, "p1", crate::models::TriggerType::AfterSession)
            .await
            .unwrap()
            .remove(0)
            .unwrap()
    }

    fn session(reps: i32) -> TriggerEvent {
        TriggerEvent::after_session(
            "u1",
            Utc::now(),
            "s1",
            vec![LiftPerformed {
                lift_id: "squat".to_string(),
                amrap_reps: Some(reps),
            }],
        )
    }

    #[tokio::test]
    async fn test_amrap_deload_writes_log_and_max() {
        let pool = setup_test_db().await;
        seed_max(&pool, "u1", "squat", MaxKind::TrainingMax, 200.0, datetime_days_ago(3)).await;
        let linked = linked(&pool).await;

        let outcome = apply_progression(&pool, &session(3), &linked, "squat").await.unwrap();
        match outcome {
            ApplyOutcome::Applied {
                previous_value,
                new_value,
                delta,
                ..
            } => {
                assert_eq!(previous_value, 200.0);
                assert_eq!(new_value, 180.0);
                assert_eq!(delta, -20.0);
            }
            other => panic!("expected applied, got {:?}", other),
        }

        let key = MaxKey::new("u1", "squat", MaxKind::TrainingMax);
        let current = maxes::current_max(&pool, &key).await.unwrap().unwrap();
        assert_eq!(current.value, 180.0);
        assert_eq!(current.origin, MaxOrigin::Progression);

        teardown_test_db(pool).await;
    }

    #[tokio::test]
    async fn test_same_event_applies_once() {
        let pool = setup_test_db().await;
        seed_max(&pool, "u1", "squat", MaxKind::TrainingMax, 200.0, datetime_days_ago(3)).await;
        let linked = linked(&pool).await;
        let event = session(7);

        let first = apply_progression(&pool, &event, &linked, "squat").await.unwrap();
        assert!(matches!(first, ApplyOutcome::Applied { .. }));
        let second = apply_progression(&pool, &event, &linked, "squat").await.unwrap();
        assert_eq!(second, ApplyOutcome::SkippedIdempotent);

        assert_eq!(progression_log(&pool, "u1", None).await.unwrap().len(), 1);
        let key = MaxKey::new("u1", "squat", MaxKind::TrainingMax);
        assert_eq!(maxes::max_history(&pool, &key).await.unwrap().len(), 2);

        teardown_test_db(pool).await;
    }

    #[tokio::test]
    async fn test_late_reported_session_supersedes_newer_max() {
        let pool = setup_test_db().await;
        let entered_at = Utc::now() - chrono::Duration::hours(1);
        seed_max(&pool, "u1", "squat", MaxKind::TrainingMax, 200.0, entered_at).await;
        let linked = linked(&pool).await;

        // Session happened before the manual entry but is reported after it
        let event = TriggerEvent::after_session(
            "u1",
            Utc::now() - chrono::Duration::hours(2),
            "s1",
            vec![LiftPerformed {
                lift_id: "squat".to_string(),
                amrap_reps: Some(7),
            }],
        );
        let outcome = apply_progression(&pool, &event, &linked, "squat").await.unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { new_value, .. } if new_value == 205.0));

        let key = MaxKey::new("u1", "squat", MaxKind::TrainingMax);
        let current = maxes::current_max(&pool, &key).await.unwrap().unwrap();
        assert_eq!(current.value, 205.0);
        assert_eq!(current.origin, MaxOrigin::Progression);

        // The audit row keeps the event's own time
        let log = progression_log(&pool, "u1", None).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].applied_at.timestamp_micros(), event.occurred_at.timestamp_micros());

        teardown_test_db(pool).await;
    }

    #[tokio::test]
    async fn test_missing_max_is_typed_error() {
        let pool = setup_test_db().await;
        let linked = linked(&pool).await;

        let result = apply_progression(&pool, &session(7), &linked, "squat").await;
        assert!(matches!(result, Err(EngineError::MaxNotFound { .. })));
        assert!(progression_log(&pool, "u1", None).await.unwrap().is_empty());

        teardown_test_db(pool).await;
    }

    #[tokio::test]
    async fn test_deadline_rolls_back() {
        let pool = setup_test_db().await;
        seed_max(&pool, "u1", "squat", MaxKind::TrainingMax, 200.0, datetime_days_ago(3)).await;
        let linked = linked(&pool).await;

        // The test pool has one connection; holding it stalls the transaction
        let held = pool.acquire().await.unwrap();
        let deadline = Instant::now() + Duration::from_millis(50);
        let result = apply_with_deadline(&pool, &session(7), &linked, "squat", Some(deadline)).await;
        drop(held);

        let err = result.unwrap_err();
        assert!(matches!(err, EngineError::TransactionFailed(_)));
        assert!(err.is_retryable());

        assert!(progression_log(&pool, "u1", None).await.unwrap().is_empty());
        let key = MaxKey::new("u1", "squat", MaxKind::TrainingMax);
        assert_eq!(maxes::current_max(&pool, &key).await.unwrap().unwrap().value, 200.0);

        teardown_test_db(pool).await;
    }
}
