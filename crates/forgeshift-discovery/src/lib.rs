//! Forgeshift Discovery - read-only inventory and effort estimation
//!
//! A rule-based planner/executor walks a source forge's group tree
//! under strict API budgets, gathers a small fixed set of facts per
//! project, optionally enriches the riskiest projects in parallel
//! (deep mode), and emits a schema-validated inventory document.

pub mod analyzer;
pub mod ci_parser;
pub mod config;
pub mod enrichment;
pub mod estimator;
pub mod executor;
pub mod inventory;
pub mod orchestrator;
pub mod planner;
pub mod readiness;
pub mod schema;
pub mod scoring;
pub mod state;
pub mod tools;

pub use config::{DiscoveryConfig, ScanMode};
pub use inventory::Inventory;
pub use orchestrator::DiscoveryOrchestrator;
pub use state::{AgentState, GroupState, ProjectState};
