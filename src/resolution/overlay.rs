//! Lookup overlay: Weekly -> Daily -> Rotation modifier pipeline
//!
//! Each layer takes the current modifiers and returns them, possibly with the
//! percentage and/or reps replaced. A layer without a matching entry (or with
//! no table bound, or no context to key it) is the identity.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::models::{LookupBindings, LookupContext, LookupEntry, LookupKind};
use crate::store::LookupSource;

/// The values a prescription resolves with after overlaying
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifiers {
  pub percentage: f64,
  pub reps: Option<Vec<i32>>,
  pub intensity: Option<String>,
  /// Layers that matched, in application order
  pub applied: Vec<LookupKind>,
}

impl Modifiers {
  pub fn base(percentage: f64) -> Self {
    Self {
      percentage,
      reps: None,
      intensity: None,
      applied: Vec::new(),
    }
  }

  /// One pipeline stage
  pub fn overlay(mut self, kind: LookupKind, entry: Option<&LookupEntry>) -> Self {
    let Some(entry) = entry else {
      return self;
    };
    if let Some(pct) = entry.percentage {
      self.percentage = pct;
    }
    if let Some(reps) = &entry.reps {
      self.reps = Some(reps.clone());
    }
    if let Some(intensity) = &entry.intensity {
      self.intensity = Some(intensity.clone());
    }
    self.applied.push(kind);
    self
  }
}

/// Entries found for each layer, already matched against the context
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayLayers {
  pub weekly: Option<LookupEntry>,
  pub daily: Option<LookupEntry>,
  pub rotation: Option<LookupEntry>,
}

impl OverlayLayers {
  /// Precedence order: later layers win
  fn ordered(&self) -> [(LookupKind, Option<&LookupEntry>); 3] {
    [
      (LookupKind::Weekly, self.weekly.as_ref()),
      (LookupKind::Daily, self.daily.as_ref()),
      (LookupKind::Rotation, self.rotation.as_ref()),
    ]
  }
}

pub fn apply_overlay(base: Modifiers, layers: &OverlayLayers) -> Modifiers {
  layers
    .ordered()
    .into_iter()
    .fold(base, |current, (kind, entry)| current.overlay(kind, entry))
}

/// Fetch the entry for each bound table whose key is present in `ctx`
pub async fn fetch_layers<S>(
  source: &S,
  bindings: &LookupBindings,
  ctx: &LookupContext,
) -> EngineResult<OverlayLayers>
where
  S: LookupSource + ?Sized,
{
  let weekly = match (bindings.weekly, ctx.week) {
    (Some(id), Some(week)) => source.weekly_entry(id, week).await?,
    _ => None,
  };
  let daily = match (bindings.daily, ctx.day.as_deref()) {
    (Some(id), Some(day)) => source.daily_entry(id, day).await?,
    _ => None,
  };
  let rotation = match (bindings.rotation, ctx.rotation_position) {
    (Some(id), Some(position)) => source.rotation_entry(id, position).await?,
    _ => None,
  };

  Ok(OverlayLayers {
    weekly,
    daily,
    rotation,
  })
}
