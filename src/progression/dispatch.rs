//! Trigger dispatch: enrolled program -> matching links -> one apply per
//! (progression, lift), each isolated from its siblings

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::time::Instant;

use super::apply::{apply_with_deadline, ApplyOutcome};
use crate::error::{EngineError, EngineResult};
use crate::models::{ProgramProgression, TriggerEvent, TriggerType};
use crate::store::programs::{self, LinkRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionStatus {
    Applied,
    SkippedIdempotent,
    SkippedNotApplicable,
    Failed,
}

impl ProgressionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressionStatus::Applied => "applied",
            ProgressionStatus::SkippedIdempotent => "skipped_idempotent",
            ProgressionStatus::SkippedNotApplicable => "skipped_not_applicable",
            ProgressionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProgressionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one progression for one lift
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionResult {
    pub progression_id: i64,
    pub progression_name: String,
    pub lift_id: String,
    pub status: ProgressionStatus,
    pub applied: bool,
    pub previous_value: Option<f64>,
    pub new_value: Option<f64>,
    pub delta: Option<f64>,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EngineError>,
}

impl ProgressionResult {
    fn new(row: &LinkRow, lift_id: &str, outcome: EngineResult<ApplyOutcome>) -> Self {
        let (progression_id, progression_name) = match row {
            Ok(linked) => (linked.progression.id, linked.progression.name.clone()),
            Err(broken) => (broken.link.progression_id, broken.progression_name.clone()),
        };
        let mut result = Self {
            progression_id,
            progression_name,
            lift_id: lift_id.to_string(),
            status: ProgressionStatus::Failed,
            applied: false,
            previous_value: None,
            new_value: None,
            delta: None,
            reason: None,
            error: None,
        };

        match outcome {
            Ok(ApplyOutcome::Applied {
                previous_value,
                new_value,
                delta,
                reason,
                ..
            }) => {
                result.status = ProgressionStatus::Applied;
                result.applied = true;
                result.previous_value = Some(previous_value);
                result.new_value = Some(new_value);
                result.delta = Some(delta);
                result.reason = Some(reason);
            }
            Ok(ApplyOutcome::SkippedIdempotent) => {
                result.status = ProgressionStatus::SkippedIdempotent;
                result.reason = Some("already applied for this trigger".to_string());
            }
            Ok(ApplyOutcome::SkippedNotApplicable { reason }) => {
                result.status = ProgressionStatus::SkippedNotApplicable;
                result.reason = Some(reason);
            }
            Err(e) => {
                result.reason = Some(e.to_string());
                result.error = Some(e);
            }
        }

        result
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub user_id: String,
    pub trigger_type: TriggerType,
    pub results: Vec<ProgressionResult>,
}

impl DispatchReport {
    fn count(&self, status: ProgressionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn applied_count(&self) -> usize {
        self.count(ProgressionStatus::Applied)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(ProgressionStatus::SkippedIdempotent) + self.count(ProgressionStatus::SkippedNotApplicable)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ProgressionStatus::Failed)
    }

    /// Results for one lift, in dispatch order
    pub fn for_lift<'a>(&'a self, lift_id: &'a str) -> impl Iterator<Item = &'a ProgressionResult> + 'a {
        self.results.iter().filter(move |r| r.lift_id == lift_id)
    }
}

/// Run every enabled progression of the user's program that listens to the
/// event's trigger type. Units run in priority order, one transaction each;
/// a failed unit is reported and the rest continue. `deadline` bounds the
/// whole dispatch.
pub async fn dispatch_trigger(
    pool: &SqlitePool,
    event: &TriggerEvent,
    deadline: Option<Duration>,
) -> EngineResult<DispatchReport> {
    let deadline = deadline.map(|limit| Instant::now() + limit);
    let trigger_type = event.trigger_type();

    let program_id = programs::enrolled_program(pool, &event.user_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("no program enrollment for user {}", event.user_id)))?;

    let links = programs::program_progressions(pool, &program_id, trigger_type).await?;
    let candidates = match trigger_type {
        TriggerType::AfterSession => session_lifts(event),
        TriggerType::AfterWeek | TriggerType::AfterCycle => programs::program_lifts(pool, &program_id).await?,
    };

    let units = plan_units(&links, &candidates);
    tracing::debug!(
        user_id = %event.user_id,
        program_id = %program_id,
        %trigger_type,
        links = links.len(),
        units = units.len(),
        "dispatching trigger"
    );

    let mut results = Vec::with_capacity(units.len());
    for (row, lift_id) in units {
        let outcome = match row {
            Ok(linked) => apply_with_deadline(pool, event, linked, &lift_id, deadline).await,
            Err(broken) => Err(broken.error.clone()),
        };
        let result = ProgressionResult::new(row, &lift_id, outcome);
        if let Some(e) = &result.error {
            tracing::warn!(
                user_id = %event.user_id,
                progression = %result.progression_name,
                lift_id = %lift_id,
                error = %e,
                "progression failed"
            );
        }
        results.push(result);
    }

    let report = DispatchReport {
        user_id: event.user_id.clone(),
        trigger_type,
        results,
    };
    tracing::info!(
        user_id = %report.user_id,
        %trigger_type,
        applied = report.applied_count(),
        skipped = report.skipped_count(),
        failed = report.failed_count(),
        "trigger dispatched"
    );
    Ok(report)
}

fn session_lifts(event: &TriggerEvent) -> Vec<String> {
    let mut seen = HashSet::new();
    event
        .performed_lifts()
        .iter()
        .filter(|l| seen.insert(l.lift_id.as_str()))
        .map(|l| l.lift_id.clone())
        .collect()
}

/// Expand links into (link, lift) units. First pass collects the lift-scoped
/// links; the second expands program-wide links over the candidate lifts
/// that have no lift-scoped link for the same progression. Link order
/// (priority) is preserved. Broken links are planned like healthy ones so
/// each of their units is reported.
fn plan_units<'a>(links: &'a [LinkRow], candidates: &[String]) -> Vec<(&'a LinkRow, String)> {
    let scoped: HashSet<(i64, &str)> = links
        .iter()
        .map(link_of)
        .filter_map(|l| l.lift_id.as_deref().map(|lift| (l.progression_id, lift)))
        .collect();

    let mut units = Vec::new();
    for row in links {
        let link = link_of(row);
        match link.lift_id.as_deref() {
            Some(lift) => {
                if candidates.iter().any(|c| c == lift) {
                    units.push((row, lift.to_string()));
                }
            }
            None => {
                for lift in candidates {
                    if !scoped.contains(&(link.progression_id, lift.as_str())) {
                        units.push((row, lift.clone()));
                    }
                }
            }
        }
    }
    units
}

fn link_of(row: &LinkRow) -> &ProgramProgression {
    match row {
        Ok(linked) => &linked.link,
        Err(broken) => &broken.link,
    }
}
