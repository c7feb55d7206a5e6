//! Resolution orchestrator: overlay -> load -> scheme, single or batched
//!
//! A batch shares one `MaxCache` so each (user, lift, kind) is read once,
//! even when several prescriptions ask for it at the same time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::OnceCell;

use super::overlay::{apply_overlay, fetch_layers, Modifiers};
use super::rounding::RoundingPolicy;
use super::scheme::GeneratedSet;
use super::Prescription;
use crate::error::{EngineError, EngineResult};
use crate::models::{LookupContext, LookupKind, MaxKey, MaxKind, ReferenceMax};
use crate::store::{LookupSource, MaxSource};

/// Compute-once-per-key memo of current maxes. Later readers of a key
/// await the in-flight fetch instead of issuing their own. Errors are not
/// cached.
#[derive(Debug, Default)]
pub struct MaxCache {
  cells: Mutex<HashMap<MaxKey, Arc<OnceCell<Option<ReferenceMax>>>>>,
}

impl MaxCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn current_max<S>(&self, source: &S, key: &MaxKey) -> EngineResult<Option<ReferenceMax>>
  where
    S: MaxSource + ?Sized,
  {
    let cell = {
      let mut cells = self.cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      cells.entry(key.clone()).or_default().clone()
    };

    let max = cell.get_or_try_init(|| source.current_max(key)).await?;
    Ok(max.clone())
  }
}

/// One prescription to resolve in the lifter's current position
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct ResolveRequest {
  pub prescription: Prescription,
  #[serde(default)]
  pub context: LookupContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPrescription {
  pub prescription_id: String,
  pub lift_id: String,
  pub max_kind: MaxKind,
  pub reference_max: f64,
  /// Percentage after the lookup overlay
  pub effective_percentage: f64,
  pub target_weight: f64,
  pub intensity: Option<String>,
  pub applied_layers: Vec<LookupKind>,
  pub sets: Vec<GeneratedSet>,
  pub notes: Option<String>,
  pub rest_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
  Success { result: ResolvedPrescription },
  Error { error: EngineError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
  pub prescription_id: String,
  #[serde(flatten)]
  pub outcome: BatchOutcome,
}

impl BatchItem {
  pub fn is_success(&self) -> bool {
    matches!(self.outcome, BatchOutcome::Success { .. })
  }

  pub fn error(&self) -> Option<&EngineError> {
    match &self.outcome {
      BatchOutcome::Error { error } => Some(error),
      BatchOutcome::Success { .. } => None,
    }
  }
}

pub struct Resolver<'s, S: ?Sized> {
  source: &'s S,
  default_rounding: RoundingPolicy,
}

impl<'s, S> Resolver<'s, S>
where
  S: MaxSource + LookupSource + ?Sized,
{
  pub fn new(source: &'s S, default_rounding: RoundingPolicy) -> Self {
    Self {
      source,
      default_rounding,
    }
  }

  pub async fn resolve(
    &self,
    user_id: &str,
    prescription: &Prescription,
    ctx: &LookupContext,
  ) -> EngineResult<ResolvedPrescription> {
    self.resolve_with_cache(user_id, prescription, ctx, &MaxCache::new()).await
  }

  /// Resolve every request concurrently. One result per request, in
  /// request order; a failed item never affects its siblings.
  pub async fn resolve_batch(&self, user_id: &str, requests: &[ResolveRequest]) -> Vec<BatchItem> {
    tracing::debug!(user_id, items = requests.len(), "resolving batch");
    let cache = MaxCache::new();

    let items = join_all(requests.iter().map(|req| {
      let cache = &cache;
      async move {
        let outcome = match self
          .resolve_with_cache(user_id, &req.prescription, &req.context, cache)
          .await
        {
          Ok(result) => BatchOutcome::Success { result },
          Err(error) => {
            tracing::warn!(
              user_id,
              prescription_id = %req.prescription.id,
              error = %error,
              "prescription failed to resolve"
            );
            BatchOutcome::Error { error }
          }
        };
        BatchItem {
          prescription_id: req.prescription.id.clone(),
          outcome,
        }
      }
    }))
    .await;

    let failed = items.iter().filter(|item| !item.is_success()).count();
    tracing::info!(user_id, items = items.len(), failed, "batch resolved");
    items
  }

  pub async fn resolve_with_cache(
    &self,
    user_id: &str,
    prescription: &Prescription,
    ctx: &LookupContext,
    cache: &MaxCache,
  ) -> EngineResult<ResolvedPrescription> {
    prescription.validate()?;
    let load = &prescription.load;

    let key = MaxKey::new(user_id, &prescription.lift_id, load.max_kind());
    let reference_max = cache
      .current_max(self.source, &key)
      .await?
      .ok_or_else(|| EngineError::max_not_found(user_id, &prescription.lift_id, load.max_kind()))?;

    let layers = fetch_layers(self.source, &prescription.lookups, ctx).await?;
    let modifiers = apply_overlay(Modifiers::base(load.base_percentage()), &layers);

    let rounding = load.rounding(&self.default_rounding);
    let target_weight = load.calculate(reference_max.value, modifiers.percentage, &self.default_rounding)?;
    let sets = prescription
      .scheme
      .generate(target_weight, modifiers.reps.as_deref(), &rounding)?;

    Ok(ResolvedPrescription {
      prescription_id: prescription.id.clone(),
      lift_id: prescription.lift_id.clone(),
      max_kind: reference_max.max_kind,
      reference_max: reference_max.value,
      effective_percentage: modifiers.percentage,
      target_weight,
      intensity: modifiers.intensity,
      applied_layers: modifiers.applied,
      sets,
      notes: prescription.notes.clone(),
      rest_seconds: prescription.rest_seconds,
    })
  }
}
