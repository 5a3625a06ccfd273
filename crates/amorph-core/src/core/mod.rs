//! # Core Module
//!
//! Stateless building blocks for the simulation workflows: atomic structure
//! representation, equation-of-state mathematics, and tabular sample I/O.
//!
//! ## Architecture
//!
//! - **Structure Representation** ([`models`]) - Immutable atomic structures with a
//!   lattice, per-site species/coordinates/velocities, and isotropic volume scaling
//! - **Equation of State** ([`eos`]) - Closed-form E(V) models and deterministic
//!   fitting routines yielding equilibrium volume and bulk modulus
//! - **Sample I/O** ([`io`]) - CSV persistence for accumulated energy-volume samples
//!
//! Nothing in this layer holds workflow state or talks to a simulation engine; every
//! routine is a pure function over value types, which keeps the numerically sensitive
//! parts independently testable.

pub mod eos;
pub mod io;
pub mod models;
