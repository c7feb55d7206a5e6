use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MaxKind, TriggerType};
use crate::progression::ProgressionParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionType {
  Linear,
  Cycle,
  Amrap,
}

impl ProgressionType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ProgressionType::Linear => "linear",
      ProgressionType::Cycle => "cycle",
      ProgressionType::Amrap => "amrap",
    }
  }
}

impl std::fmt::Display for ProgressionType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for ProgressionType {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "linear" => Ok(Self::Linear),
      "cycle" => Ok(Self::Cycle),
      "amrap" => Ok(Self::Amrap),
      _ => Err(format!("Unknown progression type: {}", s)),
    }
  }
}

/// A named progression rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progression {
  pub id: i64,
  pub name: String,
  pub params: ProgressionParams,
  /// The max series this rule moves
  pub max_kind: MaxKind,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Progression {
  pub fn progression_type(&self) -> ProgressionType {
    self.params.progression_type()
  }

  pub fn trigger_type(&self) -> TriggerType {
    self.params.trigger_type()
  }
}

/// Wiring of a progression into a program. `lift_id == None` is the
/// program-wide default; a lift-scoped row for the same progression replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramProgression {
  pub id: i64,
  pub program_id: String,
  pub progression_id: i64,
  pub lift_id: Option<String>,
  pub priority: i32,
  pub enabled: bool,
  pub override_increment: Option<f64>,
}

impl ProgramProgression {
  pub fn is_program_wide(&self) -> bool {
    self.lift_id.is_none()
  }
}

/// Immutable audit record of one applied progression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionLogEntry {
  pub id: i64,
  pub user_id: String,
  pub progression_id: i64,
  pub lift_id: String,
  pub max_kind: MaxKind,
  pub previous_value: f64,
  pub new_value: f64,
  pub delta: f64,
  pub trigger_type: TriggerType,
  pub trigger_context: serde_json::Value,
  pub applied_at: DateTime<Utc>,
}
