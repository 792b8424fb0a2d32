//! Forgeshift SOW - statement-of-work synthesis over an inventory
//!
//! Aggregates metrics from the selected projects of a discovery
//! inventory, then generates a Markdown SOW section by section through
//! an optional chat provider, chunking the per-project tables so each
//! call stays inside a fixed character budget. Without a provider, a
//! deterministic template produces the same document shape.

pub mod generator;
pub mod metrics;

pub use generator::{generate_sow, SowOptions, SowOutput};
pub use metrics::{aggregate_metrics, SowMetrics};
