use crate::core::models::structure::Structure;
use crate::engine::config::MdParams;
use crate::engine::error::TrialError;
use crate::engine::runner::{EngineFailure, MdEngine};
use crate::engine::state::VolumeEnergyPoint;
use std::path::Path;
use tracing::{debug, instrument};

/// Runs one volume trial: scale the reference structure, equilibrate it with MD, and
/// report the resulting energy-volume sample.
///
/// The returned point records the volume the engine finished at, which for an NPT
/// backend may differ from the scaled input volume.
#[instrument(skip_all, name = "volume_trial_task", fields(scale_factor = scale_factor))]
pub fn run(
    engine: &dyn MdEngine,
    reference: &Structure,
    scale_factor: f64,
    md: &MdParams,
    workdir: &Path,
) -> Result<VolumeEnergyPoint, TrialError> {
    let scaled = reference.scaled_by(scale_factor)?;
    std::fs::create_dir_all(workdir).map_err(EngineFailure::from)?;

    debug!(
        scale_factor,
        volume = scaled.volume(),
        "Running trial MD at scaled volume."
    );
    let summary = engine.run_md(&scaled, md, workdir)?;

    Ok(VolumeEnergyPoint {
        scale_factor,
        volume: summary.volume(),
        energy: summary.energy,
        stress: summary.stress,
        structure: summary.structure,
    })
}
