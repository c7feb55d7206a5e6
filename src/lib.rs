//! Strength training core: prescription resolution and progression application
//!
//! Resolution turns an abstract prescription ("5x5 at 85% of training max,
//! adjusted by this week's lookup") into concrete sets. Progression moves the
//! reference maxes resolution reads from, once per training event, with an
//! audit trail.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod progression;
pub mod resolution;
pub mod store;

#[cfg(test)]
mod test_utils;

use std::time::Duration;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use models::{LookupContext, MaxKind, TriggerEvent, TriggerType};
pub use progression::{DispatchReport, ProgressionResult, ProgressionStatus};
pub use resolution::{BatchItem, BatchOutcome, Prescription, ResolveRequest, ResolvedPrescription};

use db::DbPool;
use resolution::Resolver;

/// Entry point for hosts (HTTP layer, jobs). Cheap to clone.
#[derive(Debug, Clone)]
pub struct Engine {
  pool: DbPool,
  config: EngineConfig,
}

impl Engine {
  /// Install logging per `log_filter`, open the configured database and
  /// apply migrations
  pub async fn connect(config: EngineConfig) -> EngineResult<Self> {
    logging::init_tracing(&config.log_filter)?;
    config.default_rounding.validate()?;
    let pool = db::initialize_db(&config).await?;
    Ok(Self { pool, config })
  }

  /// Wrap an existing pool. Migrations are the caller's responsibility.
  pub fn new(pool: DbPool, config: EngineConfig) -> Self {
    Self { pool, config }
  }

  pub fn pool(&self) -> &DbPool {
    &self.pool
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  fn resolver(&self) -> Resolver<'_, DbPool> {
    Resolver::new(&self.pool, self.config.default_rounding)
  }

  pub async fn resolve_prescription(
    &self,
    user_id: &str,
    prescription: &Prescription,
    ctx: &LookupContext,
  ) -> EngineResult<ResolvedPrescription> {
    self.resolver().resolve(user_id, prescription, ctx).await
  }

  /// One item per request, in request order; failures are per item
  pub async fn resolve_batch(&self, user_id: &str, requests: &[ResolveRequest]) -> Vec<BatchItem> {
    self.resolver().resolve_batch(user_id, requests).await
  }

  /// Dispatch with the configured default deadline, if any
  pub async fn dispatch_trigger(&self, event: &TriggerEvent) -> EngineResult<DispatchReport> {
    progression::dispatch_trigger(&self.pool, event, self.config.apply_timeout).await
  }

  pub async fn dispatch_trigger_with_deadline(
    &self,
    event: &TriggerEvent,
    deadline: Duration,
  ) -> EngineResult<DispatchReport> {
    progression::dispatch_trigger(&self.pool, event, Some(deadline)).await
  }
}
