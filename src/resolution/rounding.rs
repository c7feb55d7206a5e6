//! Rounding a raw weight to a loadable increment

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Quotients this close to an integer count as exact, so float noise like
/// 34.0000000001 does not push an UP rounding to the next plate.
const STEP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingDirection {
  #[default]
  Nearest,
  Up,
  Down,
}

impl std::str::FromStr for RoundingDirection {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "nearest" => Ok(Self::Nearest),
      "up" => Ok(Self::Up),
      "down" => Ok(Self::Down),
      _ => Err(format!("Unknown rounding direction: {}", s)),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoundingPolicy {
  pub increment: f64,
  #[serde(default)]
  pub direction: RoundingDirection,
}

impl RoundingPolicy {
  pub fn nearest(increment: f64) -> Self {
    Self {
      increment,
      direction: RoundingDirection::Nearest,
    }
  }

  pub fn validate(&self) -> EngineResult<()> {
    if !self.increment.is_finite() || self.increment <= 0.0 {
      return Err(EngineError::validation(format!(
        "rounding increment must be > 0, got {}",
        self.increment
      )));
    }
    Ok(())
  }

  pub fn apply(&self, raw: f64) -> EngineResult<f64> {
    round_weight(raw, self.increment, self.direction)
  }
}

pub fn round_weight(raw: f64, increment: f64, direction: RoundingDirection) -> EngineResult<f64> {
  if !increment.is_finite() || increment <= 0.0 {
    return Err(EngineError::validation(format!(
      "rounding increment must be > 0, got {}",
      increment
    )));
  }
  if !raw.is_finite() {
    return Err(EngineError::validation(format!("cannot round weight {}", raw)));
  }

  let quotient = raw / increment;
  let nearest = quotient.round();
  let steps = if (quotient - nearest).abs() < STEP_EPSILON {
    nearest
  } else {
    match direction {
      RoundingDirection::Nearest => nearest,
      RoundingDirection::Up => quotient.ceil(),
      RoundingDirection::Down => quotient.floor(),
    }
  };

  Ok(clean(steps * increment))
}

/// Strip binary noise such as 0.30000000000000004
fn clean(value: f64) -> f64 {
  (value * 1_000_000.0).round() / 1_000_000.0
}
