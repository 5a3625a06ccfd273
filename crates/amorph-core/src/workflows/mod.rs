//! # Workflows Module
//!
//! The public, user-facing API. A workflow ties the engine layer's stages into one
//! complete procedure with a single entry point, uniform progress reporting, and a
//! per-stage record trail that survives both success and failure.

pub mod mpmorph;

pub use mpmorph::{
    MpMorphResult, PipelineError, QuenchOutput, TaskRecord, TaskStatus, run,
};
