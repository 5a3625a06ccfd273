//! Tabular persistence for workflow artifacts.
//!
//! The equilibrium-volume search appends its accumulated energy-volume samples to
//! a CSV file after every round so that a crashed or interrupted run leaves an
//! inspectable record behind.

pub mod samples;

pub use samples::{EvSample, SampleIoError, read_samples, write_samples};
