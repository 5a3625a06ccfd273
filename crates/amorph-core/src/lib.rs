//! # Amorph Core Library
//!
//! A workflow engine for amorphous-materials simulation pipelines. It composes external
//! molecular-dynamics and relaxation engines into multi-stage workflows, centred on a
//! self-correcting equilibrium-volume search that samples scaled volumes, fits
//! equation-of-state curves, and re-brackets until the fitted minimum is contained by
//! the sampled data.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless value types (`Structure`, lattice
//!   scaling), pure numerical routines (equation-of-state closed forms and fitting),
//!   and tabular I/O utilities.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer orchestrates the simulation
//!   workflow. It defines the `MdEngine` capability interface over external simulation
//!   backends, the trial/production/quench tasks, and the equilibrium-volume search
//!   state machine with its bounded re-bracketing loop.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing layer. It ties
//!   the `engine` and `core` together to execute the complete MPMorph-style procedure
//!   (equilibration, production, optional quench) and emits per-stage task records.

pub mod core;
pub mod engine;
pub mod workflows;
