//! The complete amorphization pipeline: equilibrium-volume search, production MD,
//! and an optional quench.

use crate::core::models::structure::Structure;
use crate::engine::config::{MpMorphConfig, QuenchConfig};
use crate::engine::error::SearchError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::runner::{EngineFailure, MdEngine, TrajectorySummary};
use crate::engine::search::{self, SearchOutcome};
use crate::engine::tasks::quench::{
    FastQuenchFailure, FastQuenchOutput, SlowQuenchFailure, run_fast, run_slow,
};
use crate::engine::tasks::production;
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// One line of the pipeline's audit trail: what a stage received, what it produced,
/// and whether it finished. Failed stages record the input passed through unchanged
/// and a NaN energy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub stage: String,
    pub input_structure: Structure,
    pub output_structure: Structure,
    pub energy: f64,
    pub volume: f64,
    pub stress: Option<Matrix3<f64>>,
    pub n_steps: u64,
    pub status: TaskStatus,
}

impl TaskRecord {
    fn completed(stage: impl Into<String>, input: &Structure, summary: &TrajectorySummary) -> Self {
        Self {
            stage: stage.into(),
            input_structure: input.clone(),
            output_structure: summary.structure.clone(),
            energy: summary.energy,
            volume: summary.volume(),
            stress: Some(summary.stress),
            n_steps: summary.n_steps,
            status: TaskStatus::Completed,
        }
    }

    fn failed(stage: impl Into<String>, input: &Structure) -> Self {
        Self {
            stage: stage.into(),
            input_structure: input.clone(),
            output_structure: input.clone(),
            energy: f64::NAN,
            volume: input.volume(),
            stress: None,
            n_steps: 0,
            status: TaskStatus::Failed,
        }
    }
}

/// Output of whichever quench flavour was configured.
#[derive(Debug, Clone, PartialEq)]
pub enum QuenchOutput {
    Fast(FastQuenchOutput),
    Slow(Vec<(f64, TrajectorySummary)>),
}

/// Everything a finished pipeline produced.
#[derive(Debug, Clone)]
pub struct MpMorphResult {
    pub equilibrium: SearchOutcome,
    pub production: TrajectorySummary,
    pub quench: Option<QuenchOutput>,
    pub records: Vec<TaskRecord>,
}

impl MpMorphResult {
    /// The structure the pipeline ends on: the quenched structure when a quench ran,
    /// otherwise the production structure.
    pub fn final_structure(&self) -> &Structure {
        match &self.quench {
            Some(QuenchOutput::Fast(fast)) => &fast.static_eval.structure,
            Some(QuenchOutput::Slow(stages)) => stages
                .last()
                .map(|(_, summary)| &summary.structure)
                .unwrap_or(&self.production.structure),
            None => &self.production.structure,
        }
    }
}

/// A stage failure. Every variant carries the records accumulated up to and
/// including the failed stage, so a caller can still inspect the partial run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("equilibrium-volume search failed: {source}")]
    Search {
        #[source]
        source: SearchError,
        records: Vec<TaskRecord>,
    },

    #[error("production MD failed: {source}")]
    Production {
        #[source]
        source: EngineFailure,
        records: Vec<TaskRecord>,
    },

    #[error("fast quench failed: {source}")]
    FastQuench {
        #[source]
        source: FastQuenchFailure,
        records: Vec<TaskRecord>,
    },

    #[error("slow quench failed: {source}")]
    SlowQuench {
        #[source]
        source: SlowQuenchFailure,
        records: Vec<TaskRecord>,
    },
}

impl PipelineError {
    pub fn records(&self) -> &[TaskRecord] {
        match self {
            Self::Search { records, .. }
            | Self::Production { records, .. }
            | Self::FastQuench { records, .. }
            | Self::SlowQuench { records, .. } => records,
        }
    }
}

/// Runs the full pipeline on `structure` with the given backend.
///
/// Stage order is fixed: the equilibrium-volume search feeds its scaled structure to
/// production MD, whose final structure feeds the optional quench.
#[instrument(skip_all, name = "mpmorph_workflow")]
pub fn run(
    structure: &Structure,
    config: &MpMorphConfig,
    engine: &dyn MdEngine,
    reporter: &ProgressReporter,
) -> Result<MpMorphResult, PipelineError> {
    let mut records = Vec::new();

    reporter.report(Progress::StageStart {
        name: "volume_search",
    });
    let equilibrium = match search::run(
        engine,
        structure,
        &config.search,
        &config.workdir.join("search"),
        reporter,
    ) {
        Ok(outcome) => outcome,
        Err(source) => {
            records.push(TaskRecord::failed("volume_search", structure));
            return Err(PipelineError::Search { source, records });
        }
    };
    records.push(TaskRecord {
        stage: "volume_search".to_string(),
        input_structure: structure.clone(),
        output_structure: equilibrium.structure.clone(),
        energy: equilibrium.fit.e0,
        volume: equilibrium.fit.v0,
        stress: None,
        n_steps: config.search.md.n_steps * equilibrium.points.len() as u64,
        status: TaskStatus::Completed,
    });
    reporter.report(Progress::StageFinish);
    info!(
        v0 = equilibrium.fit.v0,
        rounds = equilibrium.rounds,
        "Equilibrium volume located."
    );

    reporter.report(Progress::StageStart { name: "production" });
    let production_md = config.production.md.resolved(&config.search.md, config.production.n_steps);
    let production = match production::run(
        engine,
        &equilibrium.structure,
        &config.production,
        &config.search.md,
        &config.workdir.join("production"),
    ) {
        Ok(summary) => summary,
        Err(source) => {
            records.push(TaskRecord::failed("production", &equilibrium.structure));
            return Err(PipelineError::Production { source, records });
        }
    };
    records.push(TaskRecord::completed(
        "production",
        &equilibrium.structure,
        &production,
    ));
    reporter.report(Progress::StageFinish);

    let quench = match &config.quench {
        None => None,
        Some(QuenchConfig::Fast) => {
            reporter.report(Progress::StageStart {
                name: "fast_quench",
            });
            let quench_dir = config.workdir.join("quench");
            match run_fast(engine, &production.structure, &quench_dir) {
                Ok(output) => {
                    records.push(TaskRecord::completed(
                        "quench_relax",
                        &production.structure,
                        &output.relax,
                    ));
                    records.push(TaskRecord::completed(
                        "quench_static",
                        &output.relax.structure,
                        &output.static_eval,
                    ));
                    reporter.report(Progress::StageFinish);
                    Some(QuenchOutput::Fast(output))
                }
                Err(source) => {
                    if let Some(relax) = &source.relax {
                        records.push(TaskRecord::completed(
                            "quench_relax",
                            &production.structure,
                            relax,
                        ));
                    }
                    let failed_stage = format!("quench_{}", source.stage);
                    let failed_input = source
                        .relax
                        .as_ref()
                        .map_or(&production.structure, |relax| &relax.structure);
                    records.push(TaskRecord::failed(failed_stage, failed_input));
                    return Err(PipelineError::FastQuench { source, records });
                }
            }
        }
        Some(QuenchConfig::Slow(slow)) => {
            reporter.report(Progress::StageStart {
                name: "slow_quench",
            });
            let quench_dir = config.workdir.join("quench");
            match run_slow(
                engine,
                &production.structure,
                slow,
                production_md.end_temperature,
                &quench_dir,
            ) {
                Ok(stages) => {
                    let mut previous = &production.structure;
                    for (index, (_, summary)) in stages.iter().enumerate() {
                        records.push(TaskRecord::completed(
                            format!("quench_stage_{index}"),
                            previous,
                            summary,
                        ));
                        previous = &summary.structure;
                    }
                    reporter.report(Progress::StageFinish);
                    Some(QuenchOutput::Slow(stages))
                }
                Err(source) => {
                    let mut previous = &production.structure;
                    for (index, (_, summary)) in source.completed.iter().enumerate() {
                        records.push(TaskRecord::completed(
                            format!("quench_stage_{index}"),
                            previous,
                            summary,
                        ));
                        previous = &summary.structure;
                    }
                    records.push(TaskRecord::failed(
                        format!("quench_stage_{}", source.completed.len()),
                        previous,
                    ));
                    return Err(PipelineError::SlowQuench { source, records });
                }
            }
        }
    };

    Ok(MpMorphResult {
        equilibrium,
        production,
        quench,
        records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::eos::models::{EosModel, EosParams};
    use crate::core::models::structure::{Lattice, Site};
    use crate::engine::config::{MpMorphConfigBuilder, QuenchConfig, SlowQuenchConfig};
    use crate::engine::runner::testing::{
        AnalyticEngine, FailingEngine, Failpoint, RecordingEngine,
    };
    use nalgebra::Point3;
    use std::path::PathBuf;

    /// Cubic cell with a volume of exactly 100 Å³.
    fn input_structure() -> Structure {
        Structure::new(
            Lattice::cubic(100.0f64.cbrt()),
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
                v0: 105.0,
            },
        )
    }

    fn base_config(workdir: PathBuf) -> MpMorphConfigBuilder {
        MpMorphConfigBuilder::new()
            .temperature(3000.0)
            .search_n_steps(100)
            .production_n_steps(5000)
            .workdir(workdir)
    }

    #[test]
    fn pipeline_with_fast_quench_runs_all_stages() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path().to_path_buf())
            .quench(QuenchConfig::Fast)
            .build()
            .unwrap();
        let result = run(
            &input_structure(),
            &config,
            &analytic(),
            &ProgressReporter::new(),
        )
        .unwrap();

        assert!((result.equilibrium.fit.v0 - 105.09592138492008).abs() < 1e-6);
        assert!((result.production.volume() - result.equilibrium.fit.v0).abs() < 1e-9);

        let stages: Vec<&str> = result.records.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec!["volume_search", "production", "quench_relax", "quench_static"]
        );
        assert!(
            result
                .records
                .iter()
                .all(|r| r.status == TaskStatus::Completed)
        );
        // The fast quench relaxes onto the curve minimum.
        assert!((result.final_structure().volume() - 105.0).abs() < 1e-9);
    }

    #[test]
    fn pipeline_without_quench_ends_on_the_production_structure() {
        let dir = tempfile::tempdir().unwrap();
        let config = base_config(dir.path().to_path_buf()).build().unwrap();
        let result = run(
            &input_structure(),
            &config,
            &analytic(),
            &ProgressReporter::new(),
        )
        .unwrap();

        assert!(result.quench.is_none());
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.final_structure(), &result.production.structure);
    }

    #[test]
    fn slow_quench_descends_through_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RecordingEngine::new(analytic());
        let config = base_config(dir.path().to_path_buf())
            .quench(QuenchConfig::Slow(SlowQuenchConfig {
                start_temperature: None,
                end_temperature: 300.0,
                n_stages: 4,
                steps_per_stage: 1000,
            }))
            .build()
            .unwrap();
        let result = run(
            &input_structure(),
            &config,
            &engine,
            &ProgressReporter::new(),
        )
        .unwrap();

        let quench_records: Vec<&TaskRecord> = result
            .records
            .iter()
            .filter(|r| r.stage.starts_with("quench_stage_"))
            .collect();
        assert_eq!(quench_records.len(), 4);

        // 3 search trials, 1 production run, 4 quench holds.
        let calls = engine.calls();
        assert_eq!(calls.len(), 8);
        assert_eq!(calls[3].n_steps, 5000);
        let quench_temps: Vec<f64> = calls[4..].iter().map(|c| c.start_temperature).collect();
        assert_eq!(quench_temps, vec![3000.0, 2100.0, 1200.0, 300.0]);
    }

    #[test]
    fn search_failure_leaves_a_failed_record() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FailingEngine {
            inner: analytic(),
            failpoint: Failpoint::Md,
        };
        let config = base_config(dir.path().to_path_buf()).build().unwrap();
        let error = run(
            &input_structure(),
            &config,
            &engine,
            &ProgressReporter::new(),
        )
        .unwrap_err();

        let records = error.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage, "volume_search");
        assert_eq!(records[0].status, TaskStatus::Failed);
        assert!(records[0].energy.is_nan());
        assert!(matches!(error, PipelineError::Search { .. }));
    }

    #[test]
    fn static_failure_preserves_the_relax_record() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FailingEngine {
            inner: analytic(),
            failpoint: Failpoint::Static,
        };
        let config = base_config(dir.path().to_path_buf())
            .quench(QuenchConfig::Fast)
            .build()
            .unwrap();
        let error = run(
            &input_structure(),
            &config,
            &engine,
            &ProgressReporter::new(),
        )
        .unwrap_err();

        let records = error.records();
        let stages: Vec<&str> = records.iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(
            stages,
            vec!["volume_search", "production", "quench_relax", "quench_static"]
        );
        assert_eq!(records[2].status, TaskStatus::Completed);
        assert_eq!(records[3].status, TaskStatus::Failed);
        assert!(matches!(error, PipelineError::FastQuench { .. }));
    }

    #[test]
    fn relax_failure_fails_the_quench_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FailingEngine {
            inner: analytic(),
            failpoint: Failpoint::Relax,
        };
        let config = base_config(dir.path().to_path_buf())
            .quench(QuenchConfig::Fast)
            .build()
            .unwrap();
        let error = run(
            &input_structure(),
            &config,
            &engine,
            &ProgressReporter::new(),
        )
        .unwrap_err();

        let records = error.records();
        assert_eq!(records.last().unwrap().stage, "quench_relax");
        assert_eq!(records.last().unwrap().status, TaskStatus::Failed);
    }
}
