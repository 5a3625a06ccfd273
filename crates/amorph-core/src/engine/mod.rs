//! # Engine Module
//!
//! The stateful orchestration layer. It drives external simulation backends through
//! the [`runner::MdEngine`] interface and composes them into the workflow stages.
//!
//! ## Architecture
//!
//! - **Engine Interface** ([`runner`]) - The capability trait a molecular-dynamics
//!   backend must implement, and the summary type every stage consumes
//! - **Configuration** ([`config`]) - Validated parameter sets for search, production
//!   and quench stages, with TOML loading and builder construction
//! - **Search State** ([`state`]) - Volume brackets, accumulated samples, and the
//!   recursion bookkeeping of the equilibrium-volume search
//! - **Tasks** ([`tasks`]) - Single-shot operations (volume trial, production run,
//!   quench) that stages are assembled from
//! - **Search** ([`search`]) - The bounded sample-fit-rebracket state machine
//! - **Progress** ([`progress`]) - Callback-based progress reporting for frontends
//! - **Error Handling** ([`error`]) - Structured error types carrying the diagnostics
//!   accumulated before a failure

pub mod config;
pub mod error;
pub mod progress;
pub mod runner;
pub mod search;
pub mod state;
pub mod tasks;
