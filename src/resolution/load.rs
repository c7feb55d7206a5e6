//! Load strategies: reference max + percentage -> target weight

use serde::{Deserialize, Serialize};

use super::rounding::{round_weight, RoundingDirection, RoundingPolicy};
use crate::error::{EngineError, EngineResult};
use crate::models::MaxKind;

fn default_max_kind() -> MaxKind {
  MaxKind::TrainingMax
}

/// Tagged by `type`; new variants (RPE-based, fixed weight) slot in here
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadStrategy {
  PercentOf {
    #[serde(default = "default_max_kind")]
    max_kind: MaxKind,
    percentage: f64,
    /// Falls back to the engine default when absent
    #[serde(default)]
    rounding: Option<RoundingPolicy>,
  },
}

impl LoadStrategy {
  pub fn percent_of(max_kind: MaxKind, percentage: f64) -> Self {
    LoadStrategy::PercentOf {
      max_kind,
      percentage,
      rounding: None,
    }
  }

  pub fn from_json(json: &str) -> EngineResult<Self> {
    let strategy: Self = serde_json::from_str(json)
      .map_err(|e| EngineError::validation(format!("Failed to parse load strategy: {}", e)))?;
    strategy.validate()?;
    Ok(strategy)
  }

  pub fn validate(&self) -> EngineResult<()> {
    match self {
      LoadStrategy::PercentOf {
        percentage,
        rounding,
        ..
      } => {
        validate_percentage(*percentage)?;
        if let Some(policy) = rounding {
          policy.validate()?;
        }
        Ok(())
      }
    }
  }

  /// Which max series this strategy reads
  pub fn max_kind(&self) -> MaxKind {
    match self {
      LoadStrategy::PercentOf { max_kind, .. } => *max_kind,
    }
  }

  /// The configured percentage before any lookup overlay
  pub fn base_percentage(&self) -> f64 {
    match self {
      LoadStrategy::PercentOf { percentage, .. } => *percentage,
    }
  }

  pub fn rounding(&self, default: &RoundingPolicy) -> RoundingPolicy {
    match self {
      LoadStrategy::PercentOf { rounding, .. } => rounding.unwrap_or(*default),
    }
  }

  /// Target weight at `percentage` (the overlaid value, not necessarily the configured one)
  pub fn calculate(
    &self,
    reference_max: f64,
    percentage: f64,
    default_rounding: &RoundingPolicy,
  ) -> EngineResult<f64> {
    match self {
      LoadStrategy::PercentOf { .. } => {
        let policy = self.rounding(default_rounding);
        calculate_load(reference_max, percentage, policy.increment, policy.direction)
      }
    }
  }
}

/// `round(max * pct / 100)`. Percentages above 100 are allowed for overload work.
pub fn calculate_load(
  reference_max: f64,
  percentage: f64,
  increment: f64,
  direction: RoundingDirection,
) -> EngineResult<f64> {
  if !reference_max.is_finite() || reference_max <= 0.0 {
    return Err(EngineError::validation(format!(
      "reference max must be > 0, got {}",
      reference_max
    )));
  }
  validate_percentage(percentage)?;
  round_weight(reference_max * percentage / 100.0, increment, direction)
}

fn validate_percentage(percentage: f64) -> EngineResult<()> {
  if !percentage.is_finite() || percentage <= 0.0 {
    return Err(EngineError::validation(format!(
      "percentage must be > 0, got {}",
      percentage
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_percent_of_85_of_200() {
    let weight = calculate_load(200.0, 85.0, 5.0, RoundingDirection::Nearest).unwrap();
    assert_eq!(weight, 170.0);
  }

  #[test]
  fn test_overload_percentage_allowed() {
    let weight = calculate_load(200.0, 105.0, 5.0, RoundingDirection::Nearest).unwrap();
    assert_eq!(weight, 210.0);
  }

  #[test]
  fn test_rejects_non_positive_percentage() {
    assert!(calculate_load(200.0, 0.0, 5.0, RoundingDirection::Nearest).is_err());
    assert!(LoadStrategy::percent_of(MaxKind::TrainingMax, -10.0).validate().is_err());
  }

  #[test]
  fn test_strategy_uses_own_rounding_over_default() {
    let strategy = LoadStrategy::PercentOf {
      max_kind: MaxKind::OneRepMax,
      percentage: 72.0,
      rounding: Some(RoundingPolicy {
        increment: 2.5,
        direction: RoundingDirection::Down,
      }),
    };
    // 315 * 0.72 = 226.8
    let weight = strategy.calculate(315.0, 72.0, &RoundingPolicy::nearest(5.0)).unwrap();
    assert_eq!(weight, 225.0);

    let fallback = LoadStrategy::percent_of(MaxKind::OneRepMax, 72.0);
    let weight = fallback.calculate(315.0, 72.0, &RoundingPolicy::nearest(5.0)).unwrap();
    assert_eq!(weight, 225.0);
  }

  #[test]
  fn test_factory_from_discriminator() {
    let strategy = LoadStrategy::from_json(r#"{"type":"percent_of","percentage":85}"#).unwrap();
    assert_eq!(strategy.max_kind(), MaxKind::TrainingMax);
    assert_eq!(strategy.base_percentage(), 85.0);

    let unknown = LoadStrategy::from_json(r#"{"type":"rpe","rpe":8}"#);
    assert!(matches!(unknown, Err(EngineError::Validation(_))));
  }
}
