//! Forgeshift Apply - idempotent, plan-driven destination reconstruction
//!
//! An action plan is an ordered list of typed actions; the registry
//! maps each type tag to a concrete executor. Every action supports
//! execute, simulate (dry-run), and optionally rollback; the base
//! retry helper adds idempotency replay and async exponential backoff.

pub mod action;
pub mod actions;
pub mod context;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod result;

pub use action::{execute_with_retry, Action, ActionSpec, RetryOptions};
pub use context::{ApplyContext, Credentials};
pub use orchestrator::{ApplyOptions, ApplyOrchestrator, ApplyReport};
pub use plan::ActionPlan;
pub use registry::ActionRegistry;
pub use result::{ActionResult, SimulationOutcome};
