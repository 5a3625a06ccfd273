//! Equation-of-state models and fitting.
//!
//! An equation of state (EOS) is an analytic energy-volume curve fit to sampled
//! `(V, E)` points to estimate the equilibrium volume `V0`, the bulk modulus `B0`,
//! and its pressure derivative `B1`. This module provides the closed forms
//! ([`models`]) and deterministic fitting routines ([`fit`]); both are pure functions
//! with no workflow state.

pub mod fit;
pub mod models;

pub use fit::{EosError, EosFitResult, FitFailure, fit};
pub use models::{EosModel, EosParams};
