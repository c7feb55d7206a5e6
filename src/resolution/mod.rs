//! Prescription resolution: abstract prescription + reference max -> concrete sets

pub mod load;
pub mod overlay;
pub mod resolver;
pub mod rounding;
pub mod scheme;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::models::LookupBindings;

pub use load::{calculate_load, LoadStrategy};
pub use overlay::{apply_overlay, fetch_layers, Modifiers, OverlayLayers};
pub use resolver::{BatchItem, BatchOutcome, MaxCache, ResolveRequest, ResolvedPrescription, Resolver};
pub use rounding::{round_weight, RoundingDirection, RoundingPolicy};
pub use scheme::{GeneratedSet, RampStep, SetScheme, DEFAULT_WORK_SET_THRESHOLD};

/// What to lift, at what load and in which shape. Read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
  pub id: String,
  pub lift_id: String,
  pub load: LoadStrategy,
  pub scheme: SetScheme,
  #[serde(default)]
  pub lookups: LookupBindings,
  #[serde(default)]
  pub notes: Option<String>,
  #[serde(default)]
  pub rest_seconds: Option<u32>,
}

impl Prescription {
  pub fn validate(&self) -> EngineResult<()> {
    if self.lift_id.trim().is_empty() {
      return Err(crate::error::EngineError::validation(format!(
        "prescription {} has no lift",
        self.id
      )));
    }
    self.load.validate()?;
    self.scheme.validate()
  }
}
