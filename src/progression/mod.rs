//! Progression application: strategies, the transactional apply step and
//! trigger dispatch

pub mod apply;
pub mod dispatch;
pub mod strategy;

pub use apply::{apply_progression, apply_with_deadline, ApplyOutcome};
pub use dispatch::{dispatch_trigger, DispatchReport, ProgressionResult, ProgressionStatus};
pub use strategy::{amrap_band, AmrapBand, ProgressionParams, StrategyOutcome};
