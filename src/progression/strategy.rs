//! Progression strategies: trigger event + current max -> new max
//!
//! - Linear: fixed increment after a session (if the lift was performed) or a week
//! - Cycle: fixed increment at cycle rollover
//! - Amrap: GreySkull-style bands on the reps hit in the last set
//!   (deload below `min_reps`, double increment from `double_threshold` up)

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::models::{ProgressionType, TriggerEvent, TriggerType};

fn default_session_trigger() -> TriggerType {
    TriggerType::AfterSession
}

// ---------------------------------------------------------------------------
/// Parameters, tagged by progression type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressionParams {
    Linear {
        increment: f64,
        /// after_session or after_week
        #[serde(default = "default_session_trigger")]
        trigger: TriggerType,
    },
    Cycle {
        increment: f64,
    },
    /// Fires after sessions that report AMRAP reps for the lift
    Amrap {
        increment: f64,
        min_reps: i32,
        double_threshold: i32,
        /// Fraction in (0, 1): 0.10 = drop 10%
        deload_percent: f64,
    },
}

/// What a strategy decided for one lift
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    pub applied: bool,
    pub new_value: f64,
    pub delta: f64,
    pub reason: String,
}

impl StrategyOutcome {
    fn applied(current: f64, new_value: f64, reason: String) -> Self {
        let new_value = settle(new_value);
        Self {
            applied: true,
            new_value,
            delta: settle(new_value - current),
            reason,
        }
    }

    fn not_applicable(current: f64, reason: String) -> Self {
        Self {
            applied: false,
            new_value: current,
            delta: 0.0,
            reason,
        }
    }
}

/// Trim float noise from multiplicative deloads (200 * 0.9 etc.)
fn settle(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

impl ProgressionParams {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let params: Self = serde_json::from_str(json).map_err(|e| {
            EngineError::validation(format!("Failed to parse progression params: {}", e))
        })?;
        params.validate()?;
        Ok(params)
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn progression_type(&self) -> ProgressionType {
        match self {
            ProgressionParams::Linear { .. } => ProgressionType::Linear,
            ProgressionParams::Cycle { .. } => ProgressionType::Cycle,
            ProgressionParams::Amrap { .. } => ProgressionType::Amrap,
        }
    }

    /// The one event type this progression listens to
    pub fn trigger_type(&self) -> TriggerType {
        match self {
            ProgressionParams::Linear { trigger, .. } => *trigger,
            ProgressionParams::Cycle { .. } => TriggerType::AfterCycle,
            ProgressionParams::Amrap { .. } => TriggerType::AfterSession,
        }
    }

    pub fn increment(&self) -> f64 {
        match self {
            ProgressionParams::Linear { increment, .. }
            | ProgressionParams::Cycle { increment }
            | ProgressionParams::Amrap { increment, .. } => *increment,
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        validate_increment(self.increment())?;
        match self {
            ProgressionParams::Linear { trigger, .. } => {
                if *trigger == TriggerType::AfterCycle {
                    return Err(EngineError::validation(
                        "linear progression triggers after_session or after_week; use cycle for after_cycle",
                    ));
                }
            }
            ProgressionParams::Cycle { .. } => {}
            ProgressionParams::Amrap {
                min_reps,
                double_threshold,
                deload_percent,
                ..
            } => {
                if *min_reps < 1 {
                    return Err(EngineError::validation(format!(
                        "min_reps must be >= 1, got {}",
                        min_reps
                    )));
                }
                if *double_threshold <= *min_reps {
                    return Err(EngineError::validation(format!(
                        "double_threshold ({}) must be greater than min_reps ({})",
                        double_threshold, min_reps
                    )));
                }
                if !(*deload_percent > 0.0 && *deload_percent < 1.0) {
                    return Err(EngineError::validation(format!(
                        "deload_percent must be in (0, 1), got {}",
                        deload_percent
                    )));
                }
            }
        }
        Ok(())
    }

    /// Decide the new max for `lift_id`. `override_increment` comes from a
    /// program link and replaces the configured increment.
    pub fn apply(
        &self,
        current_max: f64,
        event: &TriggerEvent,
        lift_id: &str,
        override_increment: Option<f64>,
    ) -> StrategyOutcome {
        let event_type = event.trigger_type();
        if event_type != self.trigger_type() {
            return StrategyOutcome::not_applicable(
                current_max,
                format!("listens to {}, event is {}", self.trigger_type(), event_type),
            );
        }

        let increment = override_increment.unwrap_or_else(|| self.increment());

        match self {
            ProgressionParams::Linear { .. } => {
                if event_type == TriggerType::AfterSession && !event.was_performed(lift_id) {
                    return StrategyOutcome::not_applicable(
                        current_max,
                        format!("{} not performed this session", lift_id),
                    );
                }
                StrategyOutcome::applied(
                    current_max,
                    current_max + increment,
                    format!("+{} linear", increment),
                )
            }
            ProgressionParams::Cycle { .. } => StrategyOutcome::applied(
                current_max,
                current_max + increment,
                format!("+{} at cycle rollover", increment),
            ),
            ProgressionParams::Amrap {
                min_reps,
                double_threshold,
                deload_percent,
                ..
            } => {
                let Some(reps) = event.amrap_reps(lift_id) else {
                    return StrategyOutcome::not_applicable(
                        current_max,
                        format!("no AMRAP reps reported for {}", lift_id),
                    );
                };
                match amrap_band(reps, *min_reps, *double_threshold) {
                    AmrapBand::Deload => StrategyOutcome::applied(
                        current_max,
                        current_max * (1.0 - deload_percent),
                        format!("{} reps < {}: deload {}%", reps, min_reps, deload_percent * 100.0),
                    ),
                    AmrapBand::Double => StrategyOutcome::applied(
                        current_max,
                        current_max + 2.0 * increment,
                        format!("{} reps >= {}: double increment", reps, double_threshold),
                    ),
                    AmrapBand::Standard => StrategyOutcome::applied(
                        current_max,
                        current_max + increment,
                        format!("{} reps: standard increment", reps),
                    ),
                }
            }
        }
    }
}

fn validate_increment(increment: f64) -> EngineResult<()> {
    if !increment.is_finite() || increment <= 0.0 {
        return Err(EngineError::validation(format!(
            "increment must be > 0, got {}",
            increment
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmrapBand {
    Deload,
    Standard,
    Double,
}

/// Deload is strictly below `min_reps`; `double_threshold` itself doubles
pub fn amrap_band(reps: i32, min_reps: i32, double_threshold: i32) -> AmrapBand {
    if reps < min_reps {
        AmrapBand::Deload
    } else if reps >= double_threshold {
        AmrapBand::Double
    } else {
        AmrapBand::Standard
    }
}

// ---------------------------------------------------------------------------
/// Tests
// ---------------------------------------------------------------------------
