pub mod lookup;
pub mod max;
pub mod progression;
pub mod trigger;

pub use lookup::{LookupBindings, LookupContext, LookupEntry, LookupKey, LookupKind};
pub use max::{MaxKey, MaxKind, MaxOrigin, ReferenceMax};
pub use progression::{ProgramProgression, Progression, ProgressionLogEntry, ProgressionType};
pub use trigger::{LiftPerformed, TriggerContext, TriggerEvent, TriggerType};
