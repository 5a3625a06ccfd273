use super::config::MdParams;
use crate::core::models::structure::Structure;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// A backend call that did not produce a usable trajectory.
#[derive(Debug, Error)]
pub enum EngineFailure {
    #[error("engine '{engine}' failed: {message}")]
    Execution { engine: String, message: String },

    #[error("I/O error in engine working directory: {0}")]
    Io(#[from] std::io::Error),
}

/// What a stage consumes from a finished backend call: the final structure, its
/// potential energy (eV), the final stress tensor (eV/Å³), and the number of steps
/// the backend actually ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub structure: Structure,
    pub energy: f64,
    pub stress: Matrix3<f64>,
    pub n_steps: u64,
}

impl TrajectorySummary {
    pub fn volume(&self) -> f64 {
        self.structure.volume()
    }

    /// Hydrostatic pressure as one third of the stress trace, in eV/Å³.
    pub fn pressure(&self) -> f64 {
        self.stress.trace() / 3.0
    }
}

/// Capability interface over an external simulation backend.
///
/// The workflow layers are backend-agnostic: everything they need from a simulator
/// is molecular dynamics under a thermostat schedule, a geometry relaxation, and a
/// single-point energy evaluation. Implementations receive a dedicated working
/// directory per call and must not write outside it.
pub trait MdEngine {
    fn name(&self) -> &str;

    /// Runs molecular dynamics on `structure` with the given thermostat parameters.
    fn run_md(
        &self,
        structure: &Structure,
        params: &MdParams,
        workdir: &Path,
    ) -> Result<TrajectorySummary, EngineFailure>;

    /// Relaxes the geometry (and cell) to a local energy minimum.
    fn relax(&self, structure: &Structure, workdir: &Path)
    -> Result<TrajectorySummary, EngineFailure>;

    /// Evaluates the energy of `structure` without moving any atoms.
    fn static_energy(
        &self,
        structure: &Structure,
        workdir: &Path,
    ) -> Result<TrajectorySummary, EngineFailure>;
}
