//! Automation rule engine for campus workflows
//!
//! Evaluates conditional rules against host events and schedule ticks and
//! executes side-effecting actions (email, notifications, record mutations,
//! calculations, reports, AI calls) through pluggable collaborators.

pub mod error;
pub mod model;
pub mod coerce;
pub mod template;
pub mod evaluator;
pub mod validation;
pub mod handlers;
pub mod executor;
pub mod scheduler;
pub mod defaults;
pub mod persistence;
pub mod engine;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{AutomationEngine, AutomationEvent, EngineConfig};
pub use error::AutomationError;
pub use handlers::ActionHandlers;
pub use model::*;
