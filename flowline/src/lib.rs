//! # Flowline
//!
//! A declarative pipeline-execution engine for flow automation.
//!
//! Flowline runs YAML pipeline documents through a fixed action lifecycle
//! with support for:
//!
//! - **Action handlers**: Extensible registry of action kinds, each driven
//!   through resolve, render, validate, gate, execute and record phases
//! - **Path-addressed context**: Mutable `ctx`/`secrets` roots with `$.path`
//!   accessors and structural deep merge
//! - **Execution snapshots**: An audit tree of every invocation, available to
//!   reporters whether a run succeeds or fails
//! - **Templates**: Two delimiter profiles, resolved at flow start and per
//!   invocation
//! - **Plugins**: Versioned handler/reporter bundles with dependency
//!   resolution
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use flowline::prelude::*;
//! use std::sync::Arc;
//!
//! let orchestrator = FlowOrchestrator::new();
//! let document = FlowDocument::from_yaml(source)?;
//! let context = Arc::new(Context::new());
//!
//! let result = orchestrator.execute_flow(&document, context, ".").await;
//! println!("success: {}", result.success);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod context;
pub mod errors;
pub mod flow;
pub mod handlers;
pub mod merge;
pub mod plugins;
pub mod reporting;
pub mod snapshot;
pub mod tempfiles;
pub mod template;
pub mod testing;

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::context::{
        assign_to, push_to, AssignDirective, Context, ContextRoot, DelegatedParameters,
        EntityRecord, IterationState, SummaryRecord,
    };
    pub use crate::errors::FlowError;
    pub use crate::flow::{ActionStep, FlowDocument, FlowOrchestrator, FlowRunResult};
    pub use crate::handlers::{
        ActionHandler, ActionHandlerRegistry, ActionMetadata, Invocation,
    };
    pub use crate::merge::{merge, merge_plain, MergeModifiers};
    pub use crate::plugins::{register_plugins, Plugin, PluginDependencyResolver};
    pub use crate::reporting::{Reporter, ReporterSet};
    pub use crate::snapshot::ExecutionSnapshot;
    pub use crate::template::{DelimiterConfig, DelimiterProfile, TemplateRenderer};
}
