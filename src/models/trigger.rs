use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
  AfterSession,
  AfterWeek,
  AfterCycle,
}

impl TriggerType {
  pub fn as_str(&self) -> &'static str {
    match self {
      TriggerType::AfterSession => "after_session",
      TriggerType::AfterWeek => "after_week",
      TriggerType::AfterCycle => "after_cycle",
    }
  }
}

impl std::fmt::Display for TriggerType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl std::str::FromStr for TriggerType {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "after_session" => Ok(Self::AfterSession),
      "after_week" => Ok(Self::AfterWeek),
      "after_cycle" => Ok(Self::AfterCycle),
      _ => Err(format!("Unknown trigger type: {}", s)),
    }
  }
}

/// A lift completed in a session, with the reps hit on its AMRAP set if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiftPerformed {
  pub lift_id: String,
  #[serde(default)]
  pub amrap_reps: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerContext {
  AfterSession {
    session_id: String,
    lifts: Vec<LiftPerformed>,
  },
  AfterWeek {
    previous_week: i32,
    new_week: i32,
  },
  AfterCycle {
    completed_cycle: i32,
    new_cycle: i32,
  },
}

/// Transient training event. The type is carried by the context so the two
/// can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
  pub user_id: String,
  pub occurred_at: DateTime<Utc>,
  pub context: TriggerContext,
}

impl TriggerEvent {
  pub fn after_session(user_id: &str, occurred_at: DateTime<Utc>, session_id: &str, lifts: Vec<LiftPerformed>) -> Self {
    Self {
      user_id: user_id.to_string(),
      occurred_at,
      context: TriggerContext::AfterSession {
        session_id: session_id.to_string(),
        lifts,
      },
    }
  }

  pub fn after_week(user_id: &str, occurred_at: DateTime<Utc>, previous_week: i32, new_week: i32) -> Self {
    Self {
      user_id: user_id.to_string(),
      occurred_at,
      context: TriggerContext::AfterWeek {
        previous_week,
        new_week,
      },
    }
  }

  pub fn after_cycle(user_id: &str, occurred_at: DateTime<Utc>, completed_cycle: i32, new_cycle: i32) -> Self {
    Self {
      user_id: user_id.to_string(),
      occurred_at,
      context: TriggerContext::AfterCycle {
        completed_cycle,
        new_cycle,
      },
    }
  }

  pub fn trigger_type(&self) -> TriggerType {
    match self.context {
      TriggerContext::AfterSession { .. } => TriggerType::AfterSession,
      TriggerContext::AfterWeek { .. } => TriggerType::AfterWeek,
      TriggerContext::AfterCycle { .. } => TriggerType::AfterCycle,
    }
  }

  /// Lifts performed, empty for week/cycle events
  pub fn performed_lifts(&self) -> &[LiftPerformed] {
    match &self.context {
      TriggerContext::AfterSession { lifts, .. } => lifts,
      _ => &[],
    }
  }

  pub fn was_performed(&self, lift_id: &str) -> bool {
    self.performed_lifts().iter().any(|l| l.lift_id == lift_id)
  }

  pub fn amrap_reps(&self, lift_id: &str) -> Option<i32> {
    self.performed_lifts()
      .iter()
      .find(|l| l.lift_id == lift_id)
      .and_then(|l| l.amrap_reps)
  }
}
