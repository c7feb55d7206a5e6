//! Lookup tables: week / day / rotation keyed modifier entries

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKind {
  Weekly,
  Daily,
  Rotation,
}

impl LookupKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      LookupKind::Weekly => "weekly",
      LookupKind::Daily => "daily",
      LookupKind::Rotation => "rotation",
    }
  }
}

impl std::str::FromStr for LookupKind {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "weekly" => Ok(Self::Weekly),
      "daily" => Ok(Self::Daily),
      "rotation" => Ok(Self::Rotation),
      _ => Err(format!("Unknown lookup kind: {}", s)),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LookupKey {
  Week(i32),
  Day(String),
  Rotation(i32),
}

impl LookupKey {
  pub fn kind(&self) -> LookupKind {
    match self {
      LookupKey::Week(_) => LookupKind::Weekly,
      LookupKey::Day(_) => LookupKind::Daily,
      LookupKey::Rotation(_) => LookupKind::Rotation,
    }
  }

  /// Normalized form stored in `lookup_entries.entry_key`.
  /// Day identifiers match case-insensitively, so they are lowercased.
  pub fn storage_key(&self) -> String {
    match self {
      LookupKey::Week(w) => w.to_string(),
      LookupKey::Day(d) => normalize_day(d),
      LookupKey::Rotation(p) => p.to_string(),
    }
  }
}

pub fn normalize_day(day: &str) -> String {
  day.trim().to_lowercase()
}

/// Modifier row for one key of a lookup table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
  pub key: LookupKey,
  /// Replaces the prescription's load percentage
  #[serde(default)]
  pub percentage: Option<f64>,
  /// Per-set (or per-step) rep overrides
  #[serde(default)]
  pub reps: Option<Vec<i32>>,
  #[serde(default)]
  pub intensity: Option<String>,
}

impl LookupEntry {
  pub fn validate(&self) -> EngineResult<()> {
    match &self.key {
      LookupKey::Week(w) if *w < 1 => {
        return Err(EngineError::validation(format!("week number must be >= 1, got {}", w)));
      }
      LookupKey::Rotation(p) if *p < 0 => {
        return Err(EngineError::validation(format!(
          "rotation position must be >= 0, got {}",
          p
        )));
      }
      LookupKey::Day(d) if d.trim().is_empty() => {
        return Err(EngineError::validation("day identifier must not be empty"));
      }
      _ => {}
    }

    if let Some(pct) = self.percentage {
      if !pct.is_finite() || pct <= 0.0 {
        return Err(EngineError::validation(format!(
          "lookup percentage must be > 0, got {}",
          pct
        )));
      }
    }

    if let Some(reps) = &self.reps {
      if let Some(bad) = reps.iter().find(|r| **r < 1) {
        return Err(EngineError::validation(format!(
          "rep overrides must be >= 1, got {}",
          bad
        )));
      }
    }

    Ok(())
  }
}

/// Check every entry and enforce unique keys within one table of `kind`
pub fn validate_entries(kind: LookupKind, entries: &[LookupEntry]) -> EngineResult<()> {
  let mut seen = HashSet::new();
  for entry in entries {
    if entry.key.kind() != kind {
      return Err(EngineError::validation(format!(
        "{} lookup cannot hold a {} key",
        kind.as_str(),
        entry.key.kind().as_str()
      )));
    }
    entry.validate()?;
    if !seen.insert(entry.key.storage_key()) {
      return Err(EngineError::validation(format!(
        "duplicate {} lookup key: {}",
        kind.as_str(),
        entry.key.storage_key()
      )));
    }
  }
  Ok(())
}

/// Where in the program the lifter is today. Any part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupContext {
  #[serde(default)]
  pub week: Option<i32>,
  #[serde(default)]
  pub day: Option<String>,
  #[serde(default)]
  pub rotation_position: Option<i32>,
}

impl LookupContext {
  pub fn week(week: i32) -> Self {
    Self {
      week: Some(week),
      ..Self::default()
    }
  }

  pub fn with_day(mut self, day: &str) -> Self {
    self.day = Some(day.to_string());
    self
  }

  pub fn with_rotation(mut self, position: i32) -> Self {
    self.rotation_position = Some(position);
    self
  }
}

/// Which lookup tables a prescription consults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupBindings {
  #[serde(default)]
  pub weekly: Option<i64>,
  #[serde(default)]
  pub daily: Option<i64>,
  #[serde(default)]
  pub rotation: Option<i64>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn week_entry(week: i32, pct: f64) -> LookupEntry {
    LookupEntry {
      key: LookupKey::Week(week),
      percentage: Some(pct),
      reps: None,
      intensity: None,
    }
  }

  #[test]
  fn test_duplicate_keys_rejected() {
    let entries = vec![week_entry(1, 65.0), week_entry(2, 75.0), week_entry(1, 70.0)];
    let err = validate_entries(LookupKind::Weekly, &entries).unwrap_err();
    assert!(err.to_string().contains("duplicate"));
  }

  #[test]
  fn test_day_keys_compare_case_insensitively() {
    let entries = vec![
      LookupEntry {
        key: LookupKey::Day("Light".into()),
        percentage: Some(70.0),
        reps: None,
        intensity: None,
      },
      LookupEntry {
        key: LookupKey::Day("LIGHT ".into()),
        percentage: Some(72.0),
        reps: None,
        intensity: None,
      },
    ];
    assert!(validate_entries(LookupKind::Daily, &entries).is_err());
  }

  #[test]
  fn test_key_kind_must_match_table() {
    let entries = vec![week_entry(1, 65.0)];
    assert!(validate_entries(LookupKind::Rotation, &entries).is_err());
  }

  #[test]
  fn test_invalid_entry_values() {
    assert!(week_entry(0, 65.0).validate().is_err());
    assert!(week_entry(1, 0.0).validate().is_err());

    let mut entry = week_entry(1, 65.0);
    entry.reps = Some(vec![5, 0]);
    assert!(entry.validate().is_err());
  }
}
