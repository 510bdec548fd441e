//! Shared execution context for a single run.
//!
//! This module provides:
//! - The mutable [`Context`] threaded through one run
//! - Per-invocation [`DelegatedParameters`] for sub-flow bindings
//! - Path-addressed accessors (`assign_to`/`push_to`) over the named roots

mod delegated;
mod paths;
mod state;

pub use delegated::{DelegatedParameters, IterationState};
pub use paths::{assign_to, parse_path, push_to, AssignDirective};
pub use state::{Context, ContextRoot, EntityRecord, SummaryRecord};
