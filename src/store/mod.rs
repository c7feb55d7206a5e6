//! SQLite-backed stores and the read seams the resolver consumes

pub mod audit;
pub mod lookups;
pub mod maxes;
pub mod programs;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::models::{LookupEntry, MaxKey, ReferenceMax};

/// Current reference max for a key, `None` if nothing was ever recorded
#[async_trait]
pub trait MaxSource: Send + Sync {
  async fn current_max(&self, key: &MaxKey) -> EngineResult<Option<ReferenceMax>>;
}

/// Entry lookups per table. A missing entry is `Ok(None)`, not an error.
#[async_trait]
pub trait LookupSource: Send + Sync {
  async fn weekly_entry(&self, lookup_id: i64, week: i32) -> EngineResult<Option<LookupEntry>>;

  /// Matched case-insensitively
  async fn daily_entry(&self, lookup_id: i64, day: &str) -> EngineResult<Option<LookupEntry>>;

  async fn rotation_entry(&self, lookup_id: i64, position: i32) -> EngineResult<Option<LookupEntry>>;
}
