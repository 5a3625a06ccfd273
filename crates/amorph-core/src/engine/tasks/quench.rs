use crate::core::models::structure::Structure;
use crate::engine::config::{MdParams, SlowQuenchConfig};
use crate::engine::runner::{EngineFailure, MdEngine, TrajectorySummary};
use std::path::Path;
use thiserror::Error;
use tracing::{info, instrument};

/// Result of a fast quench: the relaxed geometry and the static evaluation of it.
#[derive(Debug, Clone, PartialEq)]
pub struct FastQuenchOutput {
    pub relax: TrajectorySummary,
    pub static_eval: TrajectorySummary,
}

#[derive(Debug, Error)]
#[error("fast quench failed during the {stage} step")]
pub struct FastQuenchFailure {
    pub stage: &'static str,
    #[source]
    pub source: EngineFailure,
    /// Present when relaxation succeeded and only the static evaluation failed.
    pub relax: Option<TrajectorySummary>,
}

#[derive(Debug, Error)]
#[error("slow quench failed during the {stage_temperature} K stage")]
pub struct SlowQuenchFailure {
    pub stage_temperature: f64,
    #[source]
    pub source: EngineFailure,
    /// Stages that finished before the failure, in descent order.
    pub completed: Vec<(f64, TrajectorySummary)>,
}

/// Quenches instantaneously to 0 K: a geometry relaxation followed by a static
/// energy evaluation of the relaxed structure.
#[instrument(skip_all, name = "fast_quench_task")]
pub fn run_fast(
    engine: &dyn MdEngine,
    structure: &Structure,
    workdir: &Path,
) -> Result<FastQuenchOutput, FastQuenchFailure> {
    let io_failure = |stage, source: std::io::Error| FastQuenchFailure {
        stage,
        source: source.into(),
        relax: None,
    };

    let relax_dir = workdir.join("relax");
    std::fs::create_dir_all(&relax_dir).map_err(|e| io_failure("relax", e))?;
    let relax = engine
        .relax(structure, &relax_dir)
        .map_err(|source| FastQuenchFailure {
            stage: "relax",
            source,
            relax: None,
        })?;
    info!(
        energy = relax.energy,
        volume = relax.volume(),
        "Relaxation complete."
    );

    let static_dir = workdir.join("static");
    std::fs::create_dir_all(&static_dir).map_err(|e| io_failure("static", e))?;
    let static_eval = engine
        .static_energy(&relax.structure, &static_dir)
        .map_err(|source| FastQuenchFailure {
            stage: "static",
            source,
            relax: Some(relax.clone()),
        })?;

    Ok(FastQuenchOutput { relax, static_eval })
}

/// Quenches through a staged temperature descent, holding each stage temperature
/// with a constant-temperature MD run and feeding each stage's final structure into
/// the next.
#[instrument(skip_all, name = "slow_quench_task")]
pub fn run_slow(
    engine: &dyn MdEngine,
    structure: &Structure,
    config: &SlowQuenchConfig,
    default_start: f64,
    workdir: &Path,
) -> Result<Vec<(f64, TrajectorySummary)>, SlowQuenchFailure> {
    let start = config.start_temperature.unwrap_or(default_start);
    let temperatures = stage_temperatures(start, config.end_temperature, config.n_stages);

    let mut completed: Vec<(f64, TrajectorySummary)> = Vec::with_capacity(temperatures.len());
    for (index, &temperature) in temperatures.iter().enumerate() {
        let stage_dir = workdir.join(format!("stage_{index}"));
        let current = completed
            .last()
            .map_or(structure, |(_, summary)| &summary.structure);
        let stage_failure = |source: EngineFailure, completed: &[(f64, TrajectorySummary)]| {
            SlowQuenchFailure {
                stage_temperature: temperature,
                source,
                completed: completed.to_vec(),
            }
        };

        if let Err(e) = std::fs::create_dir_all(&stage_dir) {
            return Err(stage_failure(e.into(), &completed));
        }
        let params = MdParams::hold(temperature, config.steps_per_stage);
        info!(
            stage = index,
            temperature, "Holding quench stage temperature."
        );
        match engine.run_md(current, &params, &stage_dir) {
            Ok(summary) => completed.push((temperature, summary)),
            Err(source) => return Err(stage_failure(source, &completed)),
        }
    }
    Ok(completed)
}

/// Linearly spaced stage temperatures from `start` down to `end`, inclusive at both
/// ends. A single stage holds `end` directly.
pub fn stage_temperatures(start: f64, end: f64, n_stages: usize) -> Vec<f64> {
    if n_stages <= 1 {
        return vec![end];
    }
    (0..n_stages)
        .map(|i| start - (start - end) * i as f64 / (n_stages - 1) as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eos::models::{EosModel, EosParams};
    use crate::core::models::structure::{Lattice, Site};
    use crate::engine::runner::testing::{AnalyticEngine, FailingEngine, Failpoint, RecordingEngine};
    use nalgebra::Point3;

    fn structure() -> Structure {
        Structure::new(
            Lattice::cubic(5.43),
            vec![Site::new("Si", Point3::origin())],
        )
        .unwrap()
    }

    fn analytic() -> AnalyticEngine {
        AnalyticEngine::new(
            EosModel::BirchMurnaghan,
            EosParams {
                e0: -42.5,
                b0: 0.55,
                b1: 4.2,
                v0: 155.0,
            },
        )
    }

    fn slow_config() -> SlowQuenchConfig {
        SlowQuenchConfig {
            start_temperature: None,
            end_temperature: 300.0,
            n_stages: 4,
            steps_per_stage: 1000,
        }
    }

    #[test]
    fn stage_temperatures_are_an_inclusive_descent() {
        let temps = stage_temperatures(3000.0, 300.0, 4);
        assert_eq!(temps, vec![3000.0, 2100.0, 1200.0, 300.0]);
    }

    #[test]
    fn single_stage_holds_the_end_temperature() {
        assert_eq!(stage_temperatures(3000.0, 300.0, 1), vec![300.0]);
    }

    #[test]
    fn slow_quench_holds_each_stage_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine::new(analytic());
        let stages = run_slow(&engine, &structure(), &slow_config(), 3000.0, dir.path()).unwrap();

        assert_eq!(stages.len(), 4);
        let calls = engine.calls();
        let held: Vec<f64> = calls.iter().map(|c| c.start_temperature).collect();
        assert_eq!(held, vec![3000.0, 2100.0, 1200.0, 300.0]);
        assert!(calls.iter().all(|c| c.kind == "md" && c.n_steps == 1000));
        assert!(dir.path().join("stage_3").is_dir());
    }

    #[test]
    fn explicit_start_temperature_overrides_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine::new(analytic());
        let config = SlowQuenchConfig {
            start_temperature: Some(2000.0),
            ..slow_config()
        };
        run_slow(&engine, &structure(), &config, 3000.0, dir.path()).unwrap();
        assert_eq!(engine.calls()[0].start_temperature, 2000.0);
    }

    #[test]
    fn slow_quench_failure_reports_completed_stages() {
        let dir = tempfile::tempdir().unwrap();
        // Injected failure hits every MD call, so the first stage already fails.
        let engine = FailingEngine {
            inner: analytic(),
            failpoint: Failpoint::Md,
        };
        let error =
            run_slow(&engine, &structure(), &slow_config(), 3000.0, dir.path()).unwrap_err();
        assert_eq!(error.stage_temperature, 3000.0);
        assert!(error.completed.is_empty());
    }

    #[test]
    fn fast_quench_relaxes_then_evaluates_statically() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_fast(&analytic(), &structure(), dir.path()).unwrap();
        assert!((output.relax.volume() - 155.0).abs() < 1e-9);
        assert_eq!(output.static_eval.structure, output.relax.structure);
        assert!((output.static_eval.energy - -42.5).abs() < 1e-9);
        assert!(dir.path().join("relax").is_dir());
        assert!(dir.path().join("static").is_dir());
    }

    #[test]
    fn fast_quench_static_failure_keeps_the_relaxed_structure() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FailingEngine {
            inner: analytic(),
            failpoint: Failpoint::Static,
        };
        let error = run_fast(&engine, &structure(), dir.path()).unwrap_err();
        assert_eq!(error.stage, "static");
        let relax = error.relax.expect("relaxation had succeeded");
        assert!((relax.volume() - 155.0).abs() < 1e-9);
    }
}
