//! Export pipeline and domain logic for Wisdom.
//!
//! This crate ties together the schema registry, paged discovery, field
//! resolution, category augmentation and image fetching into the end-to-end
//! [`pipeline::run_export`] workflow.

pub mod augment;
pub mod discovery;
pub mod images;
pub mod pipeline;
pub mod registry;
pub mod resolver;
pub mod stage;

pub use pipeline::{ExportContext, ExportResult, ProgressReporter, SilentProgress, run_export};
pub use registry::SchemaRegistry;
pub use stage::{StageOptions, run_stage};
