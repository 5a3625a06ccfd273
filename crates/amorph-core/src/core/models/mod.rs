//! Data structures representing periodic atomic structures.
//!
//! The structure model is deliberately opaque to the rest of the crate: the workflow
//! layers treat a [`structure::Structure`] as a value type with a volume and a
//! documented isotropic scaling operation, and never inspect individual sites.

pub mod structure;
