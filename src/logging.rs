use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{EngineError, EngineResult};

/// Install a stderr fmt subscriber filtered by `filter` (EnvFilter syntax).
/// A subscriber installed earlier by the host process wins; that is not an error.
pub fn init_tracing(filter: &str) -> EngineResult<()> {
  if filter.trim().is_empty() {
    return Err(EngineError::validation("log filter cannot be empty"));
  }

  let env_filter = EnvFilter::try_new(filter)
    .map_err(|e| EngineError::validation(format!("invalid log filter {:?}: {}", filter, e)))?;

  let installed = tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
    .try_init()
    .is_ok();

  if installed {
    tracing::debug!(filter, "tracing initialized");
  }

  Ok(())
}
