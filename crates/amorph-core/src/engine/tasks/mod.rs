//! Single-shot operations the workflow stages are assembled from.
//!
//! Each task drives one engine call (or a short fixed sequence of calls) and returns
//! a plain value; sequencing, re-bracketing and record keeping live in
//! [`crate::engine::search`] and [`crate::workflows`]. Every task receives its own
//! working directory and creates it on entry.

pub mod production;
pub mod quench;
pub mod trial;
