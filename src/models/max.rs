use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxKind {
  OneRepMax,
  TrainingMax,
}

impl MaxKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      MaxKind::OneRepMax => "one_rep_max",
      MaxKind::TrainingMax => "training_max",
    }
  }
}

impl std::fmt::Display for MaxKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for MaxKind {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "one_rep_max" => Ok(Self::OneRepMax),
      "training_max" => Ok(Self::TrainingMax),
      _ => Err(format!("Unknown max kind: {}", s)),
    }
  }
}

/// Who wrote a reference max row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxOrigin {
  Manual,
  Progression,
}

impl MaxOrigin {
  pub fn as_str(&self) -> &'static str {
    match self {
      MaxOrigin::Manual => "manual",
      MaxOrigin::Progression => "progression",
    }
  }
}

impl std::str::FromStr for MaxOrigin {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "manual" => Ok(Self::Manual),
      "progression" => Ok(Self::Progression),
      _ => Err(format!("Unknown max origin: {}", s)),
    }
  }
}

/// Identity of one reference max series
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaxKey {
  pub user_id: String,
  pub lift_id: String,
  pub max_kind: MaxKind,
}

impl MaxKey {
  pub fn new(user_id: &str, lift_id: &str, max_kind: MaxKind) -> Self {
    Self {
      user_id: user_id.to_string(),
      lift_id: lift_id.to_string(),
      max_kind,
    }
  }
}

/// One historical value of a reference max. Rows are superseded, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMax {
  pub id: i64,
  pub user_id: String,
  pub lift_id: String,
  pub max_kind: MaxKind,
  pub value: f64,
  pub effective_at: DateTime<Utc>,
  pub origin: MaxOrigin,
}

impl ReferenceMax {
  pub fn key(&self) -> MaxKey {
    MaxKey::new(&self.user_id, &self.lift_id, self.max_kind)
  }
}
