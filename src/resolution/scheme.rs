//! Set schemes: target weight -> ordered concrete sets

use serde::{Deserialize, Serialize};

use super::rounding::RoundingPolicy;
use crate::error::{EngineError, EngineResult};

pub const DEFAULT_WORK_SET_THRESHOLD: f64 = 80.0;

fn default_work_set_threshold() -> f64 {
  DEFAULT_WORK_SET_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampStep {
  pub percentage: f64,
  pub reps: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SetScheme {
  /// `sets` identical work sets
  Fixed { sets: i32, reps: i32 },
  /// One set per step at a percentage of the target weight
  Ramp {
    steps: Vec<RampStep>,
    #[serde(default = "default_work_set_threshold")]
    work_set_threshold: f64,
  },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSet {
  /// 1-indexed
  pub set_number: u32,
  pub weight: f64,
  pub target_reps: i32,
  pub is_work_set: bool,
}

impl SetScheme {
  pub fn from_json(json: &str) -> EngineResult<Self> {
    let scheme: Self = serde_json::from_str(json)
      .map_err(|e| EngineError::validation(format!("Failed to parse set scheme: {}", e)))?;
    scheme.validate()?;
    Ok(scheme)
  }

  pub fn validate(&self) -> EngineResult<()> {
    match self {
      SetScheme::Fixed { sets, reps } => {
        if *sets < 1 {
          return Err(EngineError::validation(format!("sets must be >= 1, got {}", sets)));
        }
        if *reps < 1 {
          return Err(EngineError::validation(format!("reps must be >= 1, got {}", reps)));
        }
      }
      SetScheme::Ramp {
        steps,
        work_set_threshold,
      } => {
        if steps.is_empty() {
          return Err(EngineError::validation("ramp needs at least one step"));
        }
        for (i, step) in steps.iter().enumerate() {
          if !step.percentage.is_finite() || step.percentage <= 0.0 {
            return Err(EngineError::validation(format!(
              "ramp step {} percentage must be > 0, got {}",
              i + 1,
              step.percentage
            )));
          }
          if step.reps < 1 {
            return Err(EngineError::validation(format!(
              "ramp step {} reps must be >= 1, got {}",
              i + 1,
              step.reps
            )));
          }
        }
        if !(*work_set_threshold > 0.0 && *work_set_threshold <= 100.0) {
          return Err(EngineError::validation(format!(
            "work set threshold must be in (0, 100], got {}",
            work_set_threshold
          )));
        }
      }
    }
    Ok(())
  }

  /// Expand into sets. `rep_overrides[i]`, when present, replaces the reps
  /// of set/step `i`.
  pub fn generate(
    &self,
    target_weight: f64,
    rep_overrides: Option<&[i32]>,
    rounding: &RoundingPolicy,
  ) -> EngineResult<Vec<GeneratedSet>> {
    self.validate()?;
    if let Some(bad) = rep_overrides.and_then(|reps| reps.iter().find(|r| **r < 1)) {
      return Err(EngineError::validation(format!(
        "rep overrides must be >= 1, got {}",
        bad
      )));
    }
    let reps_at = |i: usize, default: i32| {
      rep_overrides
        .and_then(|reps| reps.get(i).copied())
        .unwrap_or(default)
    };

    match self {
      SetScheme::Fixed { sets, reps } => Ok(
        (0..*sets as usize)
          .map(|i| GeneratedSet {
            set_number: i as u32 + 1,
            weight: target_weight,
            target_reps: reps_at(i, *reps),
            is_work_set: true,
          })
          .collect(),
      ),
      SetScheme::Ramp {
        steps,
        work_set_threshold,
      } => steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
          Ok(GeneratedSet {
            set_number: i as u32 + 1,
            weight: rounding.apply(target_weight * step.percentage / 100.0)?,
            target_reps: reps_at(i, step.reps),
            is_work_set: step.percentage >= *work_set_threshold,
          })
        })
        .collect(),
    }
  }
}
