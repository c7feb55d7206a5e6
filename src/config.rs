//! Engine configuration, read from the environment (and `.env` if present)

use std::env;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::resolution::{RoundingDirection, RoundingPolicy};

/// ---------------------------------------------------------------------------
/// Defaults
/// ---------------------------------------------------------------------------

const DEFAULT_DATABASE_URL: &str = "sqlite://strength.db?mode=rwc";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ROUNDING_INCREMENT: f64 = 5.0;
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  pub database_url: String,
  pub max_connections: u32,
  /// Used when a PercentOf descriptor carries no rounding of its own
  pub default_rounding: RoundingPolicy,
  /// Default deadline for one trigger dispatch
  pub apply_timeout: Option<Duration>,
  pub log_filter: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      database_url: DEFAULT_DATABASE_URL.to_string(),
      max_connections: DEFAULT_MAX_CONNECTIONS,
      default_rounding: RoundingPolicy {
        increment: DEFAULT_ROUNDING_INCREMENT,
        direction: RoundingDirection::Nearest,
      },
      apply_timeout: None,
      log_filter: DEFAULT_LOG_FILTER.to_string(),
    }
  }
}

impl EngineConfig {
  pub fn from_env() -> EngineResult<Self> {
    dotenvy::dotenv().ok();

    let defaults = Self::default();

    let database_url = env::var("STRENGTH_DATABASE_URL").unwrap_or(defaults.database_url);

    let max_connections = match env::var("STRENGTH_DB_MAX_CONNECTIONS") {
      Ok(raw) => parse_var::<u32>("STRENGTH_DB_MAX_CONNECTIONS", &raw)?,
      Err(_) => defaults.max_connections,
    };
    if max_connections == 0 {
      return Err(EngineError::validation("STRENGTH_DB_MAX_CONNECTIONS must be >= 1"));
    }

    let increment = match env::var("STRENGTH_DEFAULT_ROUNDING_INCREMENT") {
      Ok(raw) => parse_var::<f64>("STRENGTH_DEFAULT_ROUNDING_INCREMENT", &raw)?,
      Err(_) => DEFAULT_ROUNDING_INCREMENT,
    };

    let direction = match env::var("STRENGTH_DEFAULT_ROUNDING_DIRECTION") {
      Ok(raw) => raw.parse::<RoundingDirection>().map_err(|e| {
        EngineError::validation(format!("STRENGTH_DEFAULT_ROUNDING_DIRECTION: {}", e))
      })?,
      Err(_) => RoundingDirection::Nearest,
    };

    let default_rounding = RoundingPolicy { increment, direction };
    default_rounding
      .validate()
      .map_err(|e| EngineError::validation(format!("STRENGTH_DEFAULT_ROUNDING_INCREMENT: {}", e)))?;

    let apply_timeout = match env::var("STRENGTH_APPLY_TIMEOUT_MS") {
      Ok(raw) => Some(Duration::from_millis(parse_var::<u64>(
        "STRENGTH_APPLY_TIMEOUT_MS",
        &raw,
      )?)),
      Err(_) => None,
    };

    let log_filter = env::var("STRENGTH_LOG").unwrap_or(defaults.log_filter);

    Ok(Self {
      database_url,
      max_connections,
      default_rounding,
      apply_timeout,
      log_filter,
    })
  }
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> EngineResult<T> {
  raw
    .trim()
    .parse::<T>()
    .map_err(|_| EngineError::validation(format!("{} has an invalid value: {}", name, raw)))
}
