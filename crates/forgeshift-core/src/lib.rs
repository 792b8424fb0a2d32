//! Forgeshift Core - shared types, error taxonomy, and small utilities

pub mod error;
pub mod redact;
pub mod types;
pub mod util;

pub use error::{Error, Result};
pub use redact::redact_secrets;
pub use types::*;
