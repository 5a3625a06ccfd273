use super::runner::EngineFailure;
use super::state::{BracketError, SearchDiagnostics};
use crate::core::eos::fit::{EosError, FitFailure};
use crate::core::io::samples::SampleIoError;
use crate::core::models::structure::StructureError;
use thiserror::Error;

/// A single volume trial that could not produce a usable sample.
#[derive(Debug, Error)]
pub enum TrialError {
    #[error("structure scaling failed: {0}")]
    Contract(#[from] StructureError),

    #[error("engine run failed: {0}")]
    Engine(#[from] EngineFailure),
}

/// Terminal failures of the equilibrium-volume search.
///
/// The three workflow-level variants carry [`SearchDiagnostics`] so that every
/// sample collected before the failure remains available to the caller; the
/// remaining variants are contract violations surfaced from the layers below.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("volume trial at scale factor {scale_factor:.4} failed in round {round}")]
    Trial {
        scale_factor: f64,
        round: usize,
        #[source]
        source: TrialError,
        diagnostics: SearchDiagnostics,
    },

    #[error("every EOS model failed to fit the sampled energy-volume data")]
    EosNonConvergence {
        failures: Vec<(String, FitFailure)>,
        diagnostics: SearchDiagnostics,
    },

    #[error(
        "fitted minimum {v0:.3} Å³ still escaped the sampled bracket after {rounds} rounds"
    )]
    BracketNonConvergence {
        v0: f64,
        rounds: usize,
        diagnostics: SearchDiagnostics,
    },

    #[error("EOS fit contract violation: {0}")]
    Eos(#[from] EosError),

    #[error("structure contract violation: {0}")]
    Structure(#[from] StructureError),

    #[error("bracket construction failed: {0}")]
    Bracket(#[from] BracketError),

    #[error("failed to persist sample table: {0}")]
    Report(#[from] SampleIoError),
}

impl SearchError {
    /// The samples accumulated before the failure, when the error carries any.
    pub fn diagnostics(&self) -> Option<&SearchDiagnostics> {
        match self {
            Self::Trial { diagnostics, .. }
            | Self::EosNonConvergence { diagnostics, .. }
            | Self::BracketNonConvergence { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}
