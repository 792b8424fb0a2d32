//! Forgeshift Transform - deterministic source-to-destination converters
//!
//! Pure functions with structured diagnostics: every transformer
//! returns a `TransformOutcome` carrying data, errors, warnings, and
//! metadata, and is reproducible for identical input.

pub mod cicd;
pub mod content;
pub mod gaps;
pub mod protections;
pub mod result;
pub mod submodules;
pub mod users;
pub mod webhooks;

pub use result::{Diagnostic, TransformOutcome};
