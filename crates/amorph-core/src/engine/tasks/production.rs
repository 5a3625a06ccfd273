use crate::core::models::structure::Structure;
use crate::engine::config::{MdParams, ProductionConfig};
use crate::engine::runner::{EngineFailure, MdEngine, TrajectorySummary};
use std::path::Path;
use tracing::{info, instrument};

/// Runs the production MD stage on the equilibrated structure.
///
/// Production inherits the search stage's thermostat parameters with the configured
/// overrides applied, so by default it continues at the search temperature for its
/// own (typically much longer) step count.
#[instrument(skip_all, name = "production_md_task")]
pub fn run(
    engine: &dyn MdEngine,
    structure: &Structure,
    config: &ProductionConfig,
    base_md: &MdParams,
    workdir: &Path,
) -> Result<TrajectorySummary, EngineFailure> {
    let params = config.md.resolved(base_md, config.n_steps);
    std::fs::create_dir_all(workdir)?;

    info!(
        n_steps = params.n_steps,
        start_temperature = params.start_temperature,
        end_temperature = params.end_temperature,
        "Starting production MD."
    );
    let summary = engine.run_md(structure, &params, workdir)?;
    info!(
        energy = summary.energy,
        volume = summary.volume(),
        "Production MD complete."
    );
    Ok(summary)
}
